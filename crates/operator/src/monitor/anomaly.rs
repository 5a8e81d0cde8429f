//! Anomaly detector.
//!
//! Ordered threshold rules over one metrics reading plus a log window.
//! First match wins: memory and CPU are cheap signals checked before the
//! log-scan-based error-rate rule, and the ordering is part of the contract.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use super::logs::LogCollector;
use super::metrics::MetricsCollector;
use crate::metrics::ANOMALIES_DETECTED_TOTAL;
use crate::model::{
    AnomalyAlert, AnomalyContext, AnomalyType, LogEntry, LogLevel, MetricsReading, Severity,
    Threshold,
};
use crate::{Error, Result};

const MEMORY_PERCENT_THRESHOLD: f64 = 80.0;
const MEMORY_PERCENT_CRITICAL: f64 = 90.0;
const CPU_PERCENT_THRESHOLD: f64 = 90.0;
const CPU_PERCENT_CRITICAL: f64 = 95.0;
const ERROR_RATE_THRESHOLD: f64 = 5.0;
const ERROR_RATE_CRITICAL: f64 = 20.0;
const LOG_WINDOW_LINES: usize = 100;
const CONTEXT_ERROR_SAMPLES: usize = 5;

/// Outcome of one detection cycle: at most one alert, plus which checks ran.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DetectionReport {
    pub anomaly: Option<AnomalyAlert>,
    pub checks_performed: Vec<String>,
    pub observed_at: chrono::DateTime<Utc>,
}

pub struct AnomalyDetector {
    metrics: Arc<MetricsCollector>,
    logs: Arc<LogCollector>,
}

impl AnomalyDetector {
    pub fn new(metrics: Arc<MetricsCollector>, logs: Arc<LogCollector>) -> Self {
        Self { metrics, logs }
    }

    pub async fn detect(&self, target_id: &str) -> Result<DetectionReport> {
        let mut checks_performed = Vec::new();
        let observed_at = Utc::now();

        let snapshot = self
            .metrics
            .collect(target_id)
            .await
            .map_err(|e| Error::MetricsUnavailable(e.to_string()))?;
        checks_performed.push("metrics".to_string());

        let reading = snapshot.reading.clone();
        let target_name = snapshot.target_name.clone();

        if let Some(alert) = classify_metrics(&reading, target_id, &target_name) {
            warn!(
                target_id,
                anomaly = alert.anomaly_type.as_str(),
                severity = ?alert.severity,
                "Anomaly detected"
            );
            ANOMALIES_DETECTED_TOTAL.inc();
            return Ok(DetectionReport {
                anomaly: Some(alert),
                checks_performed,
                observed_at,
            });
        }

        // Error-rate check runs only when neither resource rule fired.
        let error_logs = self
            .logs
            .fetch(target_id, LOG_WINDOW_LINES, Some(LogLevel::Error))
            .await;
        let all_logs = self.logs.fetch(target_id, LOG_WINDOW_LINES, None).await;
        checks_performed.push("error-logs".to_string());

        if let (Ok(error_logs), Ok(all_logs)) = (error_logs, all_logs) {
            if all_logs.is_empty() {
                info!(target_id, "Skipped error-rate check due to empty log window");
            } else if let Some(alert) =
                classify_error_rate(&error_logs, all_logs.len(), &reading, target_id, &target_name)
            {
                warn!(
                    target_id,
                    anomaly = alert.anomaly_type.as_str(),
                    severity = ?alert.severity,
                    "Anomaly detected"
                );
                ANOMALIES_DETECTED_TOTAL.inc();
                return Ok(DetectionReport {
                    anomaly: Some(alert),
                    checks_performed,
                    observed_at,
                });
            }
        }

        info!(
            target_id,
            memory = reading.memory_percent,
            cpu = reading.cpu_percent,
            "No anomalies detected"
        );

        Ok(DetectionReport {
            anomaly: None,
            checks_performed,
            observed_at,
        })
    }
}

/// Resource rules, in order: memory first, then CPU.
fn classify_metrics(
    reading: &MetricsReading,
    target_id: &str,
    target_name: &str,
) -> Option<AnomalyAlert> {
    if reading.memory_percent > MEMORY_PERCENT_THRESHOLD {
        let severity = if reading.memory_percent > MEMORY_PERCENT_CRITICAL {
            Severity::Critical
        } else {
            Severity::High
        };
        return Some(AnomalyAlert {
            anomaly_type: AnomalyType::MemorySpike,
            severity,
            target_id: target_id.to_string(),
            target_name: target_name.to_string(),
            metrics: reading.clone(),
            threshold: Threshold {
                metric: "memory".to_string(),
                operator: ">".to_string(),
                value: MEMORY_PERCENT_THRESHOLD,
                duration_seconds: 120,
            },
            message: format!(
                "Memory usage at {:.2}% exceeds threshold of {}%",
                reading.memory_percent, MEMORY_PERCENT_THRESHOLD
            ),
            observed_at: reading.observed_at,
            context: None,
        });
    }

    if reading.cpu_percent > CPU_PERCENT_THRESHOLD {
        let severity = if reading.cpu_percent > CPU_PERCENT_CRITICAL {
            Severity::Critical
        } else {
            Severity::High
        };
        return Some(AnomalyAlert {
            anomaly_type: AnomalyType::CpuOverload,
            severity,
            target_id: target_id.to_string(),
            target_name: target_name.to_string(),
            metrics: reading.clone(),
            threshold: Threshold {
                metric: "cpu".to_string(),
                operator: ">".to_string(),
                value: CPU_PERCENT_THRESHOLD,
                duration_seconds: 120,
            },
            message: format!(
                "CPU usage at {:.2}% exceeds threshold of {}%",
                reading.cpu_percent, CPU_PERCENT_THRESHOLD
            ),
            observed_at: reading.observed_at,
            context: None,
        });
    }

    None
}

/// Error-rate rule over the fetched log window. An empty window yields no
/// signal rather than a spurious one.
fn classify_error_rate(
    error_logs: &[LogEntry],
    total_count: usize,
    reading: &MetricsReading,
    target_id: &str,
    target_name: &str,
) -> Option<AnomalyAlert> {
    if total_count == 0 {
        return None;
    }

    let error_count = error_logs.len();
    let error_rate = (error_count as f64 / total_count as f64) * 100.0;
    if error_rate <= ERROR_RATE_THRESHOLD {
        return None;
    }

    let severity = if error_rate > ERROR_RATE_CRITICAL {
        Severity::Critical
    } else {
        Severity::High
    };

    Some(AnomalyAlert {
        anomaly_type: AnomalyType::HighErrorRate,
        severity,
        target_id: target_id.to_string(),
        target_name: target_name.to_string(),
        metrics: reading.clone(),
        threshold: Threshold {
            metric: "errorRate".to_string(),
            operator: ">".to_string(),
            value: ERROR_RATE_THRESHOLD,
            duration_seconds: 60,
        },
        message: format!(
            "Error rate at {error_rate:.2}% exceeds threshold of {ERROR_RATE_THRESHOLD}%"
        ),
        observed_at: reading.observed_at,
        context: Some(AnomalyContext {
            error_count,
            total_logs: total_count,
            recent_errors: error_logs
                .iter()
                .take(CONTEXT_ERROR_SAMPLES)
                .map(|e| e.message.clone())
                .collect(),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(memory: f64, cpu: f64) -> MetricsReading {
        MetricsReading {
            cpu_percent: cpu,
            memory_percent: memory,
            memory_usage_bytes: 0,
            memory_limit_bytes: 512 * 1024 * 1024,
            network_bytes_per_sec: 0.0,
            observed_at: Utc::now(),
        }
    }

    fn error_entry(message: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::Error,
            message: message.to_string(),
            source_id: "pod-a".to_string(),
            source_name: "pod-a".to_string(),
        }
    }

    #[test]
    fn memory_rule_checked_before_cpu() {
        // Both over threshold; memory wins because it is evaluated first.
        let alert = classify_metrics(&reading(95.0, 99.0), "t", "t").unwrap();
        assert_eq!(alert.anomaly_type, AnomalyType::MemorySpike);
        assert_eq!(alert.severity, Severity::Critical);
    }

    #[test]
    fn memory_between_80_and_90_is_high() {
        let alert = classify_metrics(&reading(85.0, 10.0), "t", "t").unwrap();
        assert_eq!(alert.anomaly_type, AnomalyType::MemorySpike);
        assert_eq!(alert.severity, Severity::High);
    }

    #[test]
    fn memory_at_threshold_does_not_fire() {
        assert!(classify_metrics(&reading(80.0, 10.0), "t", "t").is_none());
    }

    #[test]
    fn cpu_rule_fires_when_memory_is_quiet() {
        let alert = classify_metrics(&reading(50.0, 92.0), "t", "t").unwrap();
        assert_eq!(alert.anomaly_type, AnomalyType::CpuOverload);
        assert_eq!(alert.severity, Severity::High);

        let alert = classify_metrics(&reading(50.0, 96.0), "t", "t").unwrap();
        assert_eq!(alert.severity, Severity::Critical);
    }

    #[test]
    fn quiet_metrics_yield_nothing() {
        assert!(classify_metrics(&reading(40.0, 30.0), "t", "t").is_none());
    }

    #[test]
    fn empty_log_window_skips_error_rate_check() {
        let errors = vec![error_entry("boom")];
        assert!(classify_error_rate(&errors, 0, &reading(10.0, 10.0), "t", "t").is_none());
    }

    #[test]
    fn error_rate_over_five_percent_is_high() {
        let errors: Vec<_> = (0..10).map(|i| error_entry(&format!("err {i}"))).collect();
        let alert = classify_error_rate(&errors, 100, &reading(10.0, 10.0), "t", "t").unwrap();
        assert_eq!(alert.anomaly_type, AnomalyType::HighErrorRate);
        assert_eq!(alert.severity, Severity::High);

        let context = alert.context.unwrap();
        assert_eq!(context.error_count, 10);
        assert_eq!(context.total_logs, 100);
        assert_eq!(context.recent_errors.len(), 5);
        assert_eq!(context.recent_errors[0], "err 0");
    }

    #[test]
    fn error_rate_over_twenty_percent_is_critical() {
        let errors: Vec<_> = (0..25).map(|i| error_entry(&format!("err {i}"))).collect();
        let alert = classify_error_rate(&errors, 100, &reading(10.0, 10.0), "t", "t").unwrap();
        assert_eq!(alert.severity, Severity::Critical);
    }

    #[test]
    fn error_rate_at_threshold_does_not_fire() {
        let errors: Vec<_> = (0..5).map(|i| error_entry(&format!("err {i}"))).collect();
        assert!(classify_error_rate(&errors, 100, &reading(10.0, 10.0), "t", "t").is_none());
    }
}
