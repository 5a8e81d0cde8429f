//! Metrics normalizer.
//!
//! Scrapes the monitored app's Prometheus-style text endpoint and combines
//! it with deployment resource limits into a normalized percentage reading.
//! CPU usage arrives as a cumulative seconds counter, so the collector keeps
//! the previous sample per target and differentiates across calls.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::backend::{quantity, Backend, TargetDescriptor};
use crate::config::MonitorConfig;
use crate::model::{MetricsReading, MetricsSnapshot, TargetState};
use crate::{Error, Result};

const MEMORY_USAGE_METRIC: &str = "demo_app_memory_usage_mb";
const CPU_SECONDS_METRIC: &str = "demo_app_process_cpu_seconds_total";
const CPU_USER_SECONDS_METRIC: &str = "demo_app_process_cpu_user_seconds_total";
const CPU_SYSTEM_SECONDS_METRIC: &str = "demo_app_process_cpu_system_seconds_total";

#[derive(Debug, Clone, Copy)]
struct CpuSample {
    cpu_seconds: f64,
    sampled_at: DateTime<Utc>,
}

pub struct MetricsCollector {
    backend: Arc<dyn Backend>,
    http: reqwest::Client,
    metrics_url: String,
    default_memory_limit_bytes: u64,
    service_name: String,
    cpu_samples: Mutex<HashMap<String, CpuSample>>,
}

impl MetricsCollector {
    pub fn new(backend: Arc<dyn Backend>, config: &MonitorConfig, service_name: &str) -> Self {
        Self {
            backend,
            http: reqwest::Client::new(),
            metrics_url: config.metrics_url.clone(),
            default_memory_limit_bytes: config.default_memory_limit_bytes,
            service_name: service_name.to_string(),
            cpu_samples: Mutex::new(HashMap::new()),
        }
    }

    /// Produce one normalized reading for the target. Non-running targets
    /// yield an all-zero reading rather than an error.
    pub async fn collect(&self, target_id: &str) -> Result<MetricsSnapshot> {
        debug!(target_id, "Fetching target metrics");

        let targets = self.backend.list_targets().await?;
        let target = select_target(&targets, target_id, &self.service_name)
            .ok_or_else(|| Error::TargetNotFound(target_id.to_string()))?;

        let observed_at = Utc::now();

        if target.state != TargetState::Running {
            return Ok(MetricsSnapshot {
                reading: MetricsReading::zero(observed_at),
                target_name: target.name.clone(),
                state: target.state,
            });
        }

        let response = self.http.get(&self.metrics_url).send().await?;
        if !response.status().is_success() {
            return Err(Error::BackendUnavailable(format!(
                "metrics endpoint returned HTTP {}",
                response.status()
            )));
        }
        let text = response.text().await?;

        let deployment = self.backend.read_deployment().await?;

        let memory_usage_mb = prom_metric_value(&text, MEMORY_USAGE_METRIC).max(0.0);
        let memory_usage_bytes = (memory_usage_mb * 1024.0 * 1024.0).round() as u64;

        let memory_limit_bytes = deployment
            .memory_limit
            .as_deref()
            .map(quantity::parse_memory_bytes)
            .filter(|&b| b > 0)
            .unwrap_or(self.default_memory_limit_bytes);

        let memory_percent = if memory_limit_bytes > 0 {
            ((memory_usage_bytes as f64 / memory_limit_bytes as f64) * 100.0).min(100.0)
        } else {
            0.0
        };

        let cpu_limit_cores = deployment
            .cpu_limit
            .as_deref()
            .map(quantity::parse_cpu_cores)
            .filter(|&c| c > 0.0)
            .unwrap_or(1.0);

        let cpu_seconds = cpu_seconds_total(&text);
        let cpu_percent = self.cpu_percent(&target.id, cpu_seconds, observed_at, cpu_limit_cores);

        let reading = MetricsReading {
            cpu_percent: round2(cpu_percent),
            memory_percent: round2(memory_percent),
            memory_usage_bytes,
            memory_limit_bytes,
            network_bytes_per_sec: 0.0,
            observed_at,
        };

        info!(
            target_id,
            target_name = %target.name,
            cpu = reading.cpu_percent,
            memory = reading.memory_percent,
            "Metrics collected"
        );

        Ok(MetricsSnapshot {
            reading,
            target_name: target.name.clone(),
            state: target.state,
        })
    }

    /// Differentiate the cumulative CPU counter against the previous sample
    /// for this target. The first sample for a target always reads 0 so a
    /// cold start cannot look like a spike.
    fn cpu_percent(
        &self,
        target_id: &str,
        cpu_seconds: f64,
        now: DateTime<Utc>,
        limit_cores: f64,
    ) -> f64 {
        let mut samples = self.cpu_samples.lock().expect("cpu sample cache poisoned");
        let previous = samples.insert(
            target_id.to_string(),
            CpuSample {
                cpu_seconds,
                sampled_at: now,
            },
        );

        compute_cpu_percent(previous, cpu_seconds, now, limit_cores)
    }
}

/// Exact name match wins, then substring, then any running target, then the
/// first one listed. An identifier naming the whole logical service skips
/// name matching entirely.
fn select_target<'a>(
    targets: &'a [TargetDescriptor],
    target_id: &str,
    service_name: &str,
) -> Option<&'a TargetDescriptor> {
    if targets.is_empty() {
        return None;
    }

    let normalized = target_id.trim();
    if !normalized.is_empty() && normalized != service_name {
        if let Some(exact) = targets.iter().find(|t| t.name == normalized) {
            return Some(exact);
        }
        if let Some(partial) = targets.iter().find(|t| t.name.contains(normalized)) {
            return Some(partial);
        }
    }

    targets
        .iter()
        .find(|t| t.state == TargetState::Running)
        .or_else(|| targets.first())
}

fn compute_cpu_percent(
    previous: Option<CpuSample>,
    cpu_seconds: f64,
    now: DateTime<Utc>,
    limit_cores: f64,
) -> f64 {
    let Some(previous) = previous else {
        return 0.0;
    };

    if cpu_seconds <= 0.0 {
        return 0.0;
    }

    let elapsed = (now - previous.sampled_at).num_milliseconds() as f64 / 1000.0;
    if elapsed <= 0.0 {
        return 0.0;
    }

    let delta = cpu_seconds - previous.cpu_seconds;
    if delta <= 0.0 {
        return 0.0;
    }

    let cores_consumed = delta / elapsed;
    let limit = if limit_cores > 0.0 { limit_cores } else { 1.0 };
    ((cores_consumed / limit) * 100.0).max(0.0)
}

/// Pull a single `name{labels} value` sample out of the exposition text.
/// Missing or malformed samples read as 0.
fn prom_metric_value(payload: &str, metric_name: &str) -> f64 {
    let pattern = format!(
        r"(?m)^{}(?:\{{[^}}]*\}})?\s+([-+]?\d*\.?\d+(?:[eE][-+]?\d+)?)\s*$",
        regex::escape(metric_name)
    );
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(_) => return 0.0,
    };

    re.captures(payload)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn cpu_seconds_total(payload: &str) -> f64 {
    let total = prom_metric_value(payload, CPU_SECONDS_METRIC);
    if total > 0.0 {
        return total;
    }

    prom_metric_value(payload, CPU_USER_SECONDS_METRIC)
        + prom_metric_value(payload, CPU_SYSTEM_SECONDS_METRIC)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
