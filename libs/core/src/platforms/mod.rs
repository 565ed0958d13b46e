pub mod wecom;
