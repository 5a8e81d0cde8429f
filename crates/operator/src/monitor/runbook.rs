//! Runbook selector.
//!
//! Maps an anomaly type to its remediation plan. Plans live as markdown
//! fixtures embedded at compile time and are parsed once into structured
//! steps. Step action kinds come from an ordered keyword table over the
//! free step text; treat that as a best-effort enrichment, not a parser
//! contract.

use std::collections::HashMap;
use tracing::debug;

use crate::model::{ActionKind, AnomalyType, Runbook, RunbookStep};
use crate::{Error, Result};

const MEMORY_SPIKE_MD: &str = include_str!("../../runbooks/memory-spike.md");
const CPU_OVERLOAD_MD: &str = include_str!("../../runbooks/cpu-overload.md");
const HIGH_ERROR_RATE_MD: &str = include_str!("../../runbooks/high-error-rate.md");

pub struct RunbookLibrary {
    runbooks: HashMap<AnomalyType, Runbook>,
}

impl Default for RunbookLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl RunbookLibrary {
    pub fn new() -> Self {
        let mut runbooks = HashMap::new();
        for (trigger, markdown) in [
            (AnomalyType::MemorySpike, MEMORY_SPIKE_MD),
            (AnomalyType::CpuOverload, CPU_OVERLOAD_MD),
            (AnomalyType::HighErrorRate, HIGH_ERROR_RATE_MD),
        ] {
            runbooks.insert(trigger, parse_runbook(markdown, trigger));
        }
        Self { runbooks }
    }

    pub fn select(&self, trigger: AnomalyType) -> &Runbook {
        debug!(anomaly = trigger.as_str(), "Selecting runbook");
        // Every enum member is populated in new().
        &self.runbooks[&trigger]
    }

    /// Selection by raw type name, for callers arriving over the wire.
    pub fn select_by_name(&self, name: &str) -> Result<&Runbook> {
        let trigger = AnomalyType::parse(name)
            .ok_or_else(|| Error::UnknownAnomalyType(name.to_string()))?;
        Ok(self.select(trigger))
    }
}

fn parse_runbook(markdown: &str, trigger: AnomalyType) -> Runbook {
    let mut name = String::new();
    let mut description = String::new();
    let mut steps = Vec::new();
    let mut rollback_plan = String::new();
    let mut section = "";
    let mut step_number = 0;

    for line in markdown.lines() {
        let trimmed = line.trim();

        if let Some(title) = trimmed.strip_prefix("# ") {
            if name.is_empty() {
                name = title.trim().to_string();
            }
            continue;
        }

        if trimmed.starts_with("## Detection") {
            section = "detection";
            continue;
        } else if trimmed.starts_with("## Steps") {
            section = "steps";
            continue;
        } else if trimmed.starts_with("## Rollback Plan") {
            section = "rollback";
            continue;
        }

        match section {
            "detection" if !trimmed.is_empty() && !trimmed.starts_with("##") => {
                description.push_str(trimmed);
                description.push(' ');
            }
            "steps" => {
                if let Some(dot) = trimmed.find('.') {
                    if trimmed[..dot].chars().all(|c| c.is_ascii_digit()) && dot > 0 {
                        step_number += 1;
                        let text = trimmed[dot + 1..].trim().to_string();
                        let action = infer_action(&text);
                        steps.push(RunbookStep {
                            step_number,
                            description: text,
                            action,
                            required: true,
                        });
                    }
                }
            }
            "rollback" if !trimmed.is_empty() && !trimmed.starts_with("##") => {
                rollback_plan.push_str(trimmed);
                rollback_plan.push('\n');
            }
            _ => {}
        }
    }

    Runbook {
        name: if name.is_empty() {
            format!("{} Runbook", trigger.as_str())
        } else {
            name
        },
        description: description.trim().to_string(),
        trigger,
        steps,
        rollback_plan: rollback_plan.trim().to_string(),
        tags: vec![trigger.as_str().to_lowercase()],
    }
}

/// Ordered keyword table; the first keyword found in the step text decides
/// the action kind, defaulting to a passive check.
fn infer_action(step_text: &str) -> ActionKind {
    let lowered = step_text.to_lowercase();
    if lowered.contains("restart") {
        ActionKind::Restart
    } else if lowered.contains("scale") {
        ActionKind::Scale
    } else if lowered.contains("rollback") {
        ActionKind::Rollback
    } else if lowered.contains("monitor") {
        ActionKind::Monitor
    } else if lowered.contains("update") || lowered.contains("increase") {
        ActionKind::Update
    } else {
        ActionKind::Check
    }
}
