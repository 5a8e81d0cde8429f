//! Shared Value Types
//!
//! Value objects exchanged between the monitor, safety, and executor layers.
//! All of these are immutable once constructed and carry no references back
//! into the components that produced them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyType {
    MemorySpike,
    HighErrorRate,
    CpuOverload,
}

impl AnomalyType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MEMORY_SPIKE" => Some(AnomalyType::MemorySpike),
            "HIGH_ERROR_RATE" => Some(AnomalyType::HighErrorRate),
            "CPU_OVERLOAD" => Some(AnomalyType::CpuOverload),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::MemorySpike => "MEMORY_SPIKE",
            AnomalyType::HighErrorRate => "HIGH_ERROR_RATE",
            AnomalyType::CpuOverload => "CPU_OVERLOAD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" => Some(LogLevel::Warn),
            "ERROR" => Some(LogLevel::Error),
            "FATAL" => Some(LogLevel::Fatal),
            _ => None,
        }
    }
}

/// Lifecycle state of a remediation target, normalized across backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    Running,
    Stopped,
    Paused,
    Restarting,
    Exited,
}

/// One normalized metrics reading for a single target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReading {
    /// CPU utilization as a percentage of the target's core limit.
    pub cpu_percent: f64,
    /// Memory utilization as a percentage of the limit, clamped to 100.
    pub memory_percent: f64,
    pub memory_usage_bytes: u64,
    pub memory_limit_bytes: u64,
    pub network_bytes_per_sec: f64,
    pub observed_at: DateTime<Utc>,
}

impl MetricsReading {
    /// An all-zero reading, used for targets that are not currently running.
    pub fn zero(observed_at: DateTime<Utc>) -> Self {
        Self {
            cpu_percent: 0.0,
            memory_percent: 0.0,
            memory_usage_bytes: 0,
            memory_limit_bytes: 0,
            network_bytes_per_sec: 0.0,
            observed_at,
        }
    }
}

/// A reading together with the target it was resolved against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub reading: MetricsReading,
    pub target_name: String,
    pub state: TargetState,
}

/// A single parsed log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub source_id: String,
    pub source_name: String,
}

/// The threshold that an anomaly rule fired on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threshold {
    pub metric: String,
    pub operator: String,
    pub value: f64,
    pub duration_seconds: u64,
}

/// Extra evidence attached to error-rate anomalies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyContext {
    pub error_count: usize,
    pub total_logs: usize,
    pub recent_errors: Vec<String>,
}

/// At most one of these is produced per detection cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyAlert {
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub target_id: String,
    pub target_name: String,
    pub metrics: MetricsReading,
    pub threshold: Threshold,
    pub message: String,
    pub observed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<AnomalyContext>,
}

/// Action classification inferred from runbook step text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Restart,
    Scale,
    Rollback,
    Monitor,
    Update,
    Check,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunbookStep {
    pub step_number: u32,
    pub description: String,
    pub action: ActionKind,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runbook {
    pub name: String,
    pub description: String,
    pub trigger: AnomalyType,
    pub steps: Vec<RunbookStep>,
    pub rollback_plan: String,
    pub tags: Vec<String>,
}

/// Verdict from the safety validator. A denial is an ordinary value, not an
/// error: it means the system refused, not that it failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyCheckResult {
    pub allowed: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl SafetyCheckResult {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn deny(reason: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            suggestions,
        }
    }
}
