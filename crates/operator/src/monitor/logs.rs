//! Log classifier.
//!
//! Fetches raw log text from every replica of a logical target, parses each
//! line into a leveled, timestamped entry, and returns the most recent N.
//! Merging happens before truncation so a chatty replica cannot evict newer
//! entries from a quieter one.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::{Backend, TargetDescriptor};
use crate::model::{LogEntry, LogLevel};
use crate::{Error, Result};

lazy_static! {
    static ref TIMESTAMP_RE: Regex =
        Regex::new(r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z)").unwrap();
}

/// Level tokens in precedence order; a line containing several resolves to
/// the first one found here.
const LEVEL_TOKENS: [(&str, LogLevel); 5] = [
    ("ERROR", LogLevel::Error),
    ("WARN", LogLevel::Warn),
    ("DEBUG", LogLevel::Debug),
    ("FATAL", LogLevel::Fatal),
    ("INFO", LogLevel::Info),
];

pub struct LogCollector {
    backend: Arc<dyn Backend>,
    service_name: String,
}

impl LogCollector {
    pub fn new(backend: Arc<dyn Backend>, service_name: &str) -> Self {
        Self {
            backend,
            service_name: service_name.to_string(),
        }
    }

    /// Up to `lines` entries for the target, most recent first, optionally
    /// filtered to one level.
    pub async fn fetch(
        &self,
        target_id: &str,
        lines: usize,
        level_filter: Option<LogLevel>,
    ) -> Result<Vec<LogEntry>> {
        let targets = self.backend.list_targets().await?;
        let selected = select_targets(&targets, target_id, &self.service_name);

        if selected.is_empty() {
            return Err(Error::TargetNotFound(format!(
                "no targets found for {target_id}"
            )));
        }

        let reads = selected
            .iter()
            .map(|t| self.backend.read_logs(&t.id, lines as i64));
        let results = join_all(reads).await;

        let mut entries = Vec::new();
        for (target, result) in selected.iter().zip(results) {
            let raw = match result {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(target = %target.name, error = %err, "Failed to read logs from replica");
                    continue;
                }
            };

            for line in raw.lines() {
                let clean = line.trim();
                if clean.is_empty() {
                    continue;
                }

                let entry = parse_log_line(clean, &target.id, &target.name);
                if let Some(filter) = level_filter {
                    if entry.level != filter {
                        continue;
                    }
                }
                entries.push(entry);
            }
        }

        let entries = sort_and_truncate(entries, lines);

        info!(
            target_id,
            replicas_queried = selected.len(),
            returned = entries.len(),
            "Logs fetched"
        );

        Ok(entries)
    }
}

/// Same resolution order as metrics collection: whole-service identifiers
/// address every replica, otherwise exact match, then substring, then all.
fn select_targets<'a>(
    targets: &'a [TargetDescriptor],
    target_id: &str,
    service_name: &str,
) -> Vec<&'a TargetDescriptor> {
    if targets.is_empty() {
        return Vec::new();
    }

    let normalized = target_id.trim();
    if normalized.is_empty() || normalized == service_name {
        return targets.iter().collect();
    }

    let exact: Vec<_> = targets.iter().filter(|t| t.name == normalized).collect();
    if !exact.is_empty() {
        return exact;
    }

    let partial: Vec<_> = targets.iter().filter(|t| t.name.contains(normalized)).collect();
    if !partial.is_empty() {
        return partial;
    }

    targets.iter().collect()
}

/// Merge-then-truncate: stable sort descending by timestamp, then limit.
fn sort_and_truncate(mut entries: Vec<LogEntry>, lines: usize) -> Vec<LogEntry> {
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    entries.truncate(lines);
    entries
}

fn parse_log_line(line: &str, source_id: &str, source_name: &str) -> LogEntry {
    let (timestamp, message) = match TIMESTAMP_RE.find(line) {
        Some(m) => {
            let parsed = DateTime::parse_from_rfc3339(m.as_str())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            (parsed, line[m.end()..].trim().to_string())
        }
        None => (Utc::now(), line.to_string()),
    };

    let upper = line.to_uppercase();
    let level = LEVEL_TOKENS
        .iter()
        .find(|(token, _)| upper.contains(token))
        .map(|(_, level)| *level)
        .unwrap_or(LogLevel::Info);

    LogEntry {
        timestamp,
        level,
        message,
        source_id: source_id.to_string(),
        source_name: source_name.to_string(),
    }
}
