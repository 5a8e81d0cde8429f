//! Scale tool.
//!
//! Replica counts outside the architectural ceiling are rejected before the
//! validator is ever consulted. Scaling to the current count is a validated
//! no-op: one ledger entry, zero backend mutations. Declarative backends
//! get a single scale patch; instance backends get best-effort start/stop
//! of the delta with the achieved count reported honestly.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use super::ScaleOutcome;
use crate::backend::{Backend, TargetDescriptor};
use crate::metrics::REMEDIATIONS_FAILED_TOTAL;
use crate::model::TargetState;
use crate::safety::{SafetyLimits, SafetyValidator};
use crate::Result;

pub struct ScaleTool {
    backend: Arc<dyn Backend>,
    validator: Arc<SafetyValidator>,
    min_replicas: i32,
    max_replicas: i32,
}

impl ScaleTool {
    pub fn new(
        backend: Arc<dyn Backend>,
        validator: Arc<SafetyValidator>,
        limits: &SafetyLimits,
    ) -> Self {
        Self {
            backend,
            validator,
            min_replicas: limits.min_replicas,
            max_replicas: limits.max_replicas,
        }
    }

    pub async fn run(&self, service_name: &str, replicas: i32, reason: Option<&str>) -> ScaleOutcome {
        info!(service_name, replicas, reason, "Attempting to scale service");

        // Hard architectural ceiling, independent of the safety ledger.
        if replicas < self.min_replicas || replicas > self.max_replicas {
            warn!(service_name, replicas, "Scale request outside allowed range");
            return failure(
                service_name,
                format!(
                    "Replica count {replicas} outside allowed range ({}-{})",
                    self.min_replicas, self.max_replicas
                ),
            );
        }

        let validation = self.validator.validate("scale", Some(service_name));
        if !validation.allowed {
            return failure(service_name, format!("Action blocked: {}", validation.reason));
        }

        match self.execute(service_name, replicas).await {
            Ok(outcome) => outcome,
            Err(err) => {
                REMEDIATIONS_FAILED_TOTAL.inc();
                error!(service_name, error = %err, "Failed to scale service");
                failure(service_name, format!("Failed to scale service: {err}"))
            }
        }
    }

    async fn execute(&self, service_name: &str, replicas: i32) -> Result<ScaleOutcome> {
        if self.backend.capabilities().declarative_scale {
            self.scale_declarative(service_name, replicas).await
        } else {
            self.scale_instances(service_name, replicas).await
        }
    }

    async fn scale_declarative(&self, service_name: &str, replicas: i32) -> Result<ScaleOutcome> {
        let deployment = self.backend.read_deployment().await?;
        let previous = deployment.replicas;

        if previous == replicas {
            // Idempotent: no backend write for a no-op.
            return Ok(ScaleOutcome {
                success: true,
                service_name: service_name.to_string(),
                previous_replicas: previous,
                new_replicas: replicas,
                failed_operations: 0,
                timestamp: Utc::now(),
                message: format!("Service {service_name} already at {replicas} replicas"),
            });
        }

        self.backend.patch_scale(replicas).await?;

        info!(service_name, previous, replicas, "Scaled service");

        Ok(ScaleOutcome {
            success: true,
            service_name: service_name.to_string(),
            previous_replicas: previous,
            new_replicas: replicas,
            failed_operations: 0,
            timestamp: Utc::now(),
            message: format!("Scaled {service_name} from {previous} to {replicas} replicas"),
        })
    }

    /// Best-effort path for backends without declarative replica counts:
    /// start stopped spares or stop running instances, tally individual
    /// failures, and report the count actually achieved.
    async fn scale_instances(&self, service_name: &str, replicas: i32) -> Result<ScaleOutcome> {
        let targets = self.backend.list_targets().await?;
        let instances: Vec<&TargetDescriptor> = targets
            .iter()
            .filter(|t| t.name.contains(service_name))
            .collect();

        let running: Vec<&&TargetDescriptor> = instances
            .iter()
            .filter(|t| t.state == TargetState::Running)
            .collect();
        let previous = running.len() as i32;

        if previous == replicas {
            return Ok(ScaleOutcome {
                success: true,
                service_name: service_name.to_string(),
                previous_replicas: previous,
                new_replicas: replicas,
                failed_operations: 0,
                timestamp: Utc::now(),
                message: format!("Service {service_name} already at {replicas} replicas"),
            });
        }

        let mut failed_operations = 0usize;
        let achieved;

        if replicas > previous {
            let stopped: Vec<&&TargetDescriptor> = instances
                .iter()
                .filter(|t| t.state != TargetState::Running)
                .collect();
            let to_start = ((replicas - previous) as usize).min(stopped.len());

            let mut started = 0;
            for target in stopped.iter().take(to_start) {
                match self.backend.start_target(&target.id).await {
                    Ok(()) => {
                        started += 1;
                        info!(target_id = %target.id, "Started instance");
                    }
                    Err(err) => {
                        failed_operations += 1;
                        error!(target_id = %target.id, error = %err, "Failed to start instance during scale-up");
                    }
                }
            }
            achieved = previous + started;
        } else {
            let to_stop = (previous - replicas) as usize;

            let mut stopped = 0;
            for target in running.iter().take(to_stop) {
                match self.backend.stop_target(&target.id).await {
                    Ok(()) => {
                        stopped += 1;
                        info!(target_id = %target.id, "Stopped instance");
                    }
                    Err(err) => {
                        failed_operations += 1;
                        error!(target_id = %target.id, error = %err, "Failed to stop instance during scale-down");
                    }
                }
            }
            achieved = previous - stopped;
        }

        Ok(ScaleOutcome {
            success: true,
            service_name: service_name.to_string(),
            previous_replicas: previous,
            new_replicas: achieved,
            failed_operations,
            timestamp: Utc::now(),
            message: format!("Scaled {service_name} from {previous} to {achieved} replicas"),
        })
    }
}

fn failure(service_name: &str, message: String) -> ScaleOutcome {
    ScaleOutcome {
        success: false,
        service_name: service_name.to_string(),
        previous_replicas: 0,
        new_replicas: 0,
        failed_operations: 0,
        timestamp: Utc::now(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Capabilities, DeploymentView, MockBackend};
    use crate::safety::SafetyLimits;

    fn deployment(replicas: i32) -> DeploymentView {
        DeploymentView {
            name: "demo-app".to_string(),
            replicas,
            image: "app:1.0".to_string(),
            env: vec![],
            cpu_limit: None,
            memory_limit: None,
        }
    }

    fn declarative_caps() -> Capabilities {
        Capabilities {
            declarative_scale: true,
            tracks_instance_identity: true,
            revision_history: true,
        }
    }

    fn tool(backend: MockBackend) -> ScaleTool {
        let limits = SafetyLimits {
            min_time_between_actions_ms: 0,
            ..SafetyLimits::default()
        };
        ScaleTool::new(
            Arc::new(backend),
            Arc::new(SafetyValidator::new(limits.clone())),
            &limits,
        )
    }

    #[tokio::test]
    async fn out_of_range_replicas_rejected_before_validation() {
        // No backend expectations at all: nothing may be touched.
        let backend = MockBackend::new();
        let tool = tool(backend);

        for replicas in [0, 6, -1] {
            let outcome = tool.run("demo-app", replicas, None).await;
            assert!(!outcome.success);
            assert!(outcome.message.contains("outside allowed range"));
        }
    }

    #[tokio::test]
    async fn idempotent_scale_performs_no_mutation() {
        let mut backend = MockBackend::new();
        backend.expect_capabilities().return_const(declarative_caps());
        backend
            .expect_read_deployment()
            .times(1)
            .returning(|| Ok(deployment(3)));
        // No expect_patch_scale: a patch call would panic the mock.
        let tool = tool(backend);

        let outcome = tool.run("demo-app", 3, None).await;
        assert!(outcome.success);
        assert_eq!(outcome.previous_replicas, 3);
        assert_eq!(outcome.new_replicas, 3);
        assert!(outcome.message.contains("already at 3 replicas"));
    }

    #[tokio::test]
    async fn scale_up_patches_once() {
        let mut backend = MockBackend::new();
        backend.expect_capabilities().return_const(declarative_caps());
        backend
            .expect_read_deployment()
            .times(1)
            .returning(|| Ok(deployment(2)));
        backend
            .expect_patch_scale()
            .times(1)
            .withf(|replicas| *replicas == 4)
            .returning(|_| Ok(()));
        let tool = tool(backend);

        let outcome = tool.run("demo-app", 4, None).await;
        assert!(outcome.success);
        assert_eq!(outcome.previous_replicas, 2);
        assert_eq!(outcome.new_replicas, 4);
    }

    #[tokio::test]
    async fn backend_error_becomes_failed_outcome() {
        let mut backend = MockBackend::new();
        backend.expect_capabilities().return_const(declarative_caps());
        backend
            .expect_read_deployment()
            .returning(|| Err(crate::Error::BackendUnavailable("api down".into())));
        let tool = tool(backend);

        let outcome = tool.run("demo-app", 2, None).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("api down"));
    }
}
