//! Tracing and metric helpers shared by the WeCom services.
//!
//! Logs are structured JSON by default; set `LOG_FORMAT=text` for human
//! readable output and `RUST_LOG` to adjust the filter.

use anyhow::Result;

mod config;
mod context;
mod ingress;
mod metrics;
mod tracing_init;

pub use config::TelemetryConfig;
pub use context::TelemetryLabels;
pub use ingress::{
    PLATFORM, record_callback_latency, record_dropped, record_ingress, record_rejected,
    start_ingress_span,
};
pub use metrics::{record_counter, record_histogram};
pub use tracing_init::{init_telemetry, with_common_fields};

/// Installs the subscriber configured from the environment.
pub fn install(service_name: &str) -> Result<()> {
    init_telemetry(&TelemetryConfig::from_env(service_name))
}
