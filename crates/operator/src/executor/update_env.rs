//! Update-env tool.
//!
//! All-or-nothing whitelist over the requested variable names, then a merge
//! into the existing set with deterministic (sorted-by-key) ordering. The
//! merge is only applied when the caller opts into a restart; a merge that
//! changes nothing skips the restart unless `force_restart` demands one.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use super::UpdateEnvOutcome;
use crate::backend::{Backend, EnvVar};
use crate::metrics::REMEDIATIONS_FAILED_TOTAL;
use crate::safety::{SafetyValidator, ENV_VAR_WHITELIST};
use crate::Result;

pub struct UpdateEnvTool {
    backend: Arc<dyn Backend>,
    validator: Arc<SafetyValidator>,
}

pub struct UpdateEnvRequest<'a> {
    pub target_id: &'a str,
    pub env_vars: &'a BTreeMap<String, String>,
    /// Apply the merged set and restart the target.
    pub restart: bool,
    /// Restart even when the merge changed nothing. Default off: a no-op
    /// merge must not cause a surprise restart.
    pub force_restart: bool,
    pub reason: Option<&'a str>,
}

impl UpdateEnvTool {
    pub fn new(backend: Arc<dyn Backend>, validator: Arc<SafetyValidator>) -> Self {
        Self { backend, validator }
    }

    pub async fn run(&self, request: UpdateEnvRequest<'_>) -> UpdateEnvOutcome {
        info!(
            target_id = request.target_id,
            restart = request.restart,
            reason = request.reason,
            "Attempting to update environment variables"
        );

        // Whitelist check is all-or-nothing and precedes validation.
        let invalid: Vec<&str> = request
            .env_vars
            .keys()
            .map(|k| k.as_str())
            .filter(|k| !ENV_VAR_WHITELIST.contains(k))
            .collect();
        if !invalid.is_empty() {
            warn!(invalid = ?invalid, "Env update blocked by whitelist");
            return failure(
                request.target_id,
                format!(
                    "Blocked: Environment variables not whitelisted: {}. Allowed: {}",
                    invalid.join(", "),
                    ENV_VAR_WHITELIST.join(", ")
                ),
            );
        }

        let validation = self.validator.validate("update-env", Some(request.target_id));
        if !validation.allowed {
            return failure(
                request.target_id,
                format!("Action blocked: {}", validation.reason),
            );
        }

        match self.execute(&request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                REMEDIATIONS_FAILED_TOTAL.inc();
                error!(target_id = request.target_id, error = %err, "Failed to update environment variables");
                failure(
                    request.target_id,
                    format!("Failed to update environment variables: {err}"),
                )
            }
        }
    }

    async fn execute(&self, request: &UpdateEnvRequest<'_>) -> Result<UpdateEnvOutcome> {
        let deployment = self.backend.read_deployment().await?;
        let (merged, changed) = merge_env(&deployment.env, request.env_vars);
        let updated_vars: Vec<String> = request.env_vars.keys().cloned().collect();

        if !request.restart && !request.force_restart {
            return Ok(UpdateEnvOutcome {
                success: true,
                target_id: request.target_id.to_string(),
                updated_vars,
                restarted: false,
                timestamp: Utc::now(),
                message: format!(
                    "Staged environment variables: {}. Restart required for changes to take effect.",
                    request.env_vars.keys().cloned().collect::<Vec<_>>().join(", ")
                ),
            });
        }

        if !changed && !request.force_restart {
            return Ok(UpdateEnvOutcome {
                success: true,
                target_id: request.target_id.to_string(),
                updated_vars,
                restarted: false,
                timestamp: Utc::now(),
                message: "Requested values match current configuration; restart skipped."
                    .to_string(),
            });
        }

        if changed {
            self.backend.patch_env(&merged).await?;
        }

        // Applying the patch recreates the targets on identity-tracking
        // backends; otherwise restart the instances in place.
        if !self.backend.capabilities().tracks_instance_identity {
            let targets = self.backend.list_targets().await?;
            for target in &targets {
                self.backend.restart_target(&target.id).await?;
            }
        } else if !changed {
            // Forced restart with nothing to patch: recycle the targets.
            self.backend.delete_targets(None).await?;
        }

        info!(
            target_id = request.target_id,
            updated = ?updated_vars,
            "Environment variables applied"
        );

        Ok(UpdateEnvOutcome {
            success: true,
            target_id: request.target_id.to_string(),
            updated_vars: updated_vars.clone(),
            restarted: true,
            timestamp: Utc::now(),
            message: format!(
                "Updated environment variables: {}. Target restarted.",
                updated_vars.join(", ")
            ),
        })
    }
}

/// Merge requested variables into the existing set: new keys appended,
/// existing keys overwritten, result sorted by key so the configuration is
/// reproducible and diffable. Returns whether anything actually changed.
fn merge_env(current: &[EnvVar], requested: &BTreeMap<String, String>) -> (Vec<EnvVar>, bool) {
    let mut merged: BTreeMap<String, String> = current
        .iter()
        .map(|v| (v.name.clone(), v.value.clone()))
        .collect();

    let mut changed = false;
    for (key, value) in requested {
        if merged.get(key) != Some(value) {
            changed = true;
        }
        merged.insert(key.clone(), value.clone());
    }

    let vars = merged
        .into_iter()
        .map(|(name, value)| EnvVar { name, value })
        .collect();
    (vars, changed)
}

fn failure(target_id: &str, message: String) -> UpdateEnvOutcome {
    UpdateEnvOutcome {
        success: false,
        target_id: target_id.to_string(),
        updated_vars: Vec::new(),
        restarted: false,
        timestamp: Utc::now(),
        message,
    }
}
