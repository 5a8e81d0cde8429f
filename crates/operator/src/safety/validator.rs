//! Safety validator for remediation actions.
//!
//! Stateful gate in front of every executor tool. Keeps an in-memory ledger
//! of allowed actions for rate limiting; the ledger is process-local and
//! resets with the process, so rate limits do not survive a restart of the
//! operator (known limitation).

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{info, warn};

use super::limits::{SafetyLimits, BLOCKED_ACTION_KEYWORDS};
use crate::metrics::{ACTIONS_ALLOWED_TOTAL, ACTIONS_DENIED_TOTAL};
use crate::model::SafetyCheckResult;

/// One allowed action, as recorded in the ledger. Denied attempts are never
/// recorded, so being refused does not consume rate-limit budget.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActionRecord {
    pub action: String,
    pub target: String,
    pub occurred_at: DateTime<Utc>,
}

pub struct SafetyValidator {
    limits: SafetyLimits,
    ledger: Mutex<VecDeque<ActionRecord>>,
}

impl SafetyValidator {
    pub fn new(limits: SafetyLimits) -> Self {
        Self {
            limits,
            ledger: Mutex::new(VecDeque::new()),
        }
    }

    pub fn limits(&self) -> &SafetyLimits {
        &self.limits
    }

    /// Run the policy checks for `action` against `target` and, if the
    /// action is allowed, record it in the ledger.
    pub fn validate(&self, action: &str, target: Option<&str>) -> SafetyCheckResult {
        let result = self.validate_at(action, target, Utc::now());

        if result.allowed {
            ACTIONS_ALLOWED_TOTAL.inc();
            info!(action, target = target.unwrap_or("unknown"), "Action passed safety checks");
        } else {
            ACTIONS_DENIED_TOTAL.inc();
            warn!(
                action,
                target = target.unwrap_or("unknown"),
                reason = %result.reason,
                "Action denied by safety validator"
            );
        }

        result
    }

    fn validate_at(
        &self,
        action: &str,
        target: Option<&str>,
        now: DateTime<Utc>,
    ) -> SafetyCheckResult {
        // Blocked keywords are absolute and never consult the ledger.
        let lowered = action.to_lowercase();
        if BLOCKED_ACTION_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            return SafetyCheckResult::deny(
                format!("Action '{action}' is blocked and requires human approval"),
                vec![
                    "Request manual intervention".into(),
                    "Use safer alternative action".into(),
                ],
            );
        }

        let mut ledger = self.ledger.lock().expect("action ledger poisoned");

        let hour_ago = now - Duration::hours(1);
        let recent: Vec<&ActionRecord> = ledger
            .iter()
            .filter(|r| r.occurred_at > hour_ago)
            .collect();

        if recent.len() >= self.limits.max_actions_per_hour {
            return SafetyCheckResult::deny(
                format!(
                    "Rate limit exceeded: {} actions per hour",
                    self.limits.max_actions_per_hour
                ),
                vec![
                    "Wait before performing more actions".into(),
                    "Contact on-call engineer".into(),
                ],
            );
        }

        if action == "restart" {
            if let Some(target) = target {
                let restarts = recent
                    .iter()
                    .filter(|r| r.action == "restart" && r.target == target)
                    .count();
                if restarts >= self.limits.max_restarts_per_target_per_hour {
                    return SafetyCheckResult::deny(
                        format!(
                            "Too many restarts for target {target} in the last hour ({restarts}/{})",
                            self.limits.max_restarts_per_target_per_hour
                        ),
                        vec![
                            "Investigate root cause instead of repeatedly restarting".into(),
                            "Check logs for persistent issues".into(),
                        ],
                    );
                }
            }
        }

        if let Some(last) = recent.last() {
            let elapsed_ms = (now - last.occurred_at).num_milliseconds();
            if elapsed_ms < self.limits.min_time_between_actions_ms {
                return SafetyCheckResult::deny(
                    format!(
                        "Actions must be spaced at least {} seconds apart",
                        self.limits.min_time_between_actions_ms / 1000
                    ),
                    vec!["Wait a few seconds before next action".into()],
                );
            }
        }

        // Allow path: record the action, then prune anything older than the
        // 24-hour retention window from the head.
        ledger.push_back(ActionRecord {
            action: action.to_string(),
            target: target.unwrap_or("unknown").to_string(),
            occurred_at: now,
        });

        let retention_cutoff = now - Duration::hours(24);
        while ledger
            .front()
            .map(|r| r.occurred_at < retention_cutoff)
            .unwrap_or(false)
        {
            ledger.pop_front();
        }

        SafetyCheckResult::allow("Action passed all safety checks")
    }

    /// Snapshot of the ledger, oldest first.
    pub fn history(&self) -> Vec<ActionRecord> {
        let ledger = self.ledger.lock().expect("action ledger poisoned");
        ledger.iter().cloned().collect()
    }

    pub fn clear_history(&self) {
        let mut ledger = self.ledger.lock().expect("action ledger poisoned");
        ledger.clear();
        info!("Action history cleared");
    }
}
