use std::time::Duration;

use tracing::Span;

use crate::context::TelemetryLabels;
use crate::metrics::{record_counter, record_histogram};

pub const PLATFORM: &str = "wecom";
const INGRESS_COUNTER: &str = "wecom_messages_ingressed";
const REJECTED_COUNTER: &str = "wecom_callbacks_rejected";
const DROPPED_COUNTER: &str = "wecom_callbacks_dropped";
const LATENCY_HISTOGRAM: &str = "wecom_callback_duration_seconds";
const INGRESS_SPAN_NAME: &str = "ingress.handle";

fn with_platform(labels: &TelemetryLabels) -> TelemetryLabels {
    let mut labels = labels.clone();
    labels.platform.get_or_insert_with(|| PLATFORM.to_string());
    labels
}

/// Counts a callback that reached the message sink.
pub fn record_ingress(labels: &TelemetryLabels) {
    record_counter(INGRESS_COUNTER, 1, &with_platform(labels));
}

/// Counts a callback refused before dispatch; `reason` is a short class such
/// as `authentication` or `decryption`.
pub fn record_rejected(labels: &TelemetryLabels, reason: &str) {
    let labels = with_platform(labels).with_extra("reason", reason);
    record_counter(REJECTED_COUNTER, 1, &labels);
}

pub fn record_dropped(labels: &TelemetryLabels) {
    record_counter(DROPPED_COUNTER, 1, &with_platform(labels));
}

/// Wall time from request arrival to the acknowledgement, whatever the outcome.
pub fn record_callback_latency(labels: &TelemetryLabels, elapsed: Duration) {
    record_histogram(LATENCY_HISTOGRAM, elapsed.as_secs_f64(), &with_platform(labels));
}

/// `chat_id` and `msg_id` start empty; fill them with
/// [`with_common_fields`](crate::with_common_fields) once the message is known.
pub fn start_ingress_span(labels: &TelemetryLabels, request_id: &str) -> Span {
    let labels = with_platform(labels);
    tracing::info_span!(
        INGRESS_SPAN_NAME,
        tenant = %labels.tenant,
        platform = %labels.platform.unwrap_or_default(),
        request_id = %request_id,
        chat_id = tracing::field::Empty,
        msg_id = tracing::field::Empty
    )
}
