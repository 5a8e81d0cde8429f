//! Monitor Layer
//!
//! Turns raw backend signals (metrics endpoint, pod logs) into normalized
//! readings, classified log entries, and at most one anomaly alert per
//! detection cycle.

pub mod anomaly;
pub mod logs;
pub mod metrics;
pub mod runbook;

pub use anomaly::{AnomalyDetector, DetectionReport};
pub use logs::LogCollector;
pub use metrics::MetricsCollector;
pub use runbook::RunbookLibrary;
