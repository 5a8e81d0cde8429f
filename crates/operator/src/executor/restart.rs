//! Restart tool.
//!
//! Delete-and-recreate for backends whose instances come back under new
//! identities, in-place restart otherwise. Convergence is a bounded poll:
//! prefer a running instance distinct from the pre-restart set, fall back
//! to any running instance once the deadline is reached.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use super::RestartOutcome;
use crate::backend::{Backend, TargetDescriptor};
use crate::config::ExecutorConfig;
use crate::metrics::REMEDIATIONS_FAILED_TOTAL;
use crate::model::TargetState;
use crate::safety::SafetyValidator;
use crate::{Error, Result};

pub struct RestartTool {
    backend: Arc<dyn Backend>,
    validator: Arc<SafetyValidator>,
    service_name: String,
    poll_interval: Duration,
    ready_timeout: Duration,
}

impl RestartTool {
    pub fn new(
        backend: Arc<dyn Backend>,
        validator: Arc<SafetyValidator>,
        service_name: &str,
        config: &ExecutorConfig,
    ) -> Self {
        Self {
            backend,
            validator,
            service_name: service_name.to_string(),
            poll_interval: Duration::from_millis(config.restart_poll_interval_ms),
            ready_timeout: Duration::from_millis(config.restart_ready_timeout_ms),
        }
    }

    pub async fn run(&self, target_id: &str, reason: Option<&str>) -> RestartOutcome {
        info!(target_id, reason, "Attempting to restart target");

        let validation = self.validator.validate("restart", Some(target_id));
        if !validation.allowed {
            // Denied is terminal without touching the backend.
            return failure(target_id, format!("Action blocked: {}", validation.reason));
        }

        match self.execute(target_id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                REMEDIATIONS_FAILED_TOTAL.inc();
                error!(target_id, error = %err, "Failed to restart target");
                failure(target_id, format!("Failed to restart target: {err}"))
            }
        }
    }

    async fn execute(&self, target_id: &str) -> Result<RestartOutcome> {
        let targets = self.backend.list_targets().await?;
        let selected = select_targets(&targets, target_id, &self.service_name);
        if selected.is_empty() {
            return Err(Error::TargetNotFound(format!(
                "no targets found for {target_id}"
            )));
        }

        let representative = selected[0];
        let previous_state = state_label(representative.state);
        let previous_ids: Vec<String> = selected.iter().map(|t| t.id.clone()).collect();

        if self.backend.capabilities().tracks_instance_identity {
            // Narrow the delete to one instance when exactly one was
            // addressed by name; otherwise recycle the whole selection.
            let narrow = (selected.len() == 1 && target_id != self.service_name)
                .then(|| selected[0].id.clone());
            self.backend.delete_targets(narrow.as_deref()).await?;
        } else {
            self.backend.restart_target(&representative.id).await?;
        }

        let replacement = self.await_running_replacement(&previous_ids).await?;
        let new_state = state_label(replacement.state);

        info!(
            target_id,
            new_target_id = %replacement.id,
            previous_state = %previous_state,
            new_state = %new_state,
            "Target restarted"
        );

        Ok(RestartOutcome {
            success: true,
            target_id: replacement.id.clone(),
            target_name: replacement.name.clone(),
            previous_state: previous_state.to_string(),
            new_state: new_state.to_string(),
            timestamp: Utc::now(),
            message: format!(
                "Restarted {}. Previous state: {previous_state}, New state: {new_state}",
                self.service_name
            ),
        })
    }

    /// Poll until a running instance outside `previous_ids` appears. At the
    /// deadline, settle for any running instance before giving up.
    async fn await_running_replacement(
        &self,
        previous_ids: &[String],
    ) -> Result<TargetDescriptor> {
        let deadline = Instant::now() + self.ready_timeout;

        loop {
            let current = self.backend.list_targets().await?;
            if let Some(fresh) = current
                .iter()
                .find(|t| t.state == TargetState::Running && !previous_ids.contains(&t.id))
            {
                return Ok(fresh.clone());
            }

            if Instant::now() >= deadline {
                if let Some(running) = current.iter().find(|t| t.state == TargetState::Running) {
                    warn!(
                        target_id = %running.id,
                        "No distinct replacement observed; settling for running instance"
                    );
                    return Ok(running.clone());
                }
                return Err(Error::ConvergenceTimeout {
                    action: "restart".to_string(),
                    deadline_ms: self.ready_timeout.as_millis() as u64,
                });
            }

            sleep(self.poll_interval).await;
        }
    }
}

fn select_targets<'a>(
    targets: &'a [TargetDescriptor],
    target_id: &str,
    service_name: &str,
) -> Vec<&'a TargetDescriptor> {
    if target_id == service_name {
        return targets.iter().collect();
    }

    let exact: Vec<_> = targets.iter().filter(|t| t.name == target_id).collect();
    if !exact.is_empty() {
        return exact;
    }

    let partial: Vec<_> = targets.iter().filter(|t| t.name.contains(target_id)).collect();
    if !partial.is_empty() {
        return partial;
    }

    targets.iter().collect()
}

fn state_label(state: TargetState) -> &'static str {
    match state {
        TargetState::Running => "running",
        TargetState::Stopped => "stopped",
        TargetState::Paused => "paused",
        TargetState::Restarting => "restarting",
        TargetState::Exited => "exited",
    }
}

fn failure(target_id: &str, message: String) -> RestartOutcome {
    RestartOutcome {
        success: false,
        target_id: target_id.to_string(),
        target_name: String::new(),
        previous_state: String::new(),
        new_state: String::new(),
        timestamp: Utc::now(),
        message,
    }
}
