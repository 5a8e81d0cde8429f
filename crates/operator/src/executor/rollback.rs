//! Rollback tool.
//!
//! Walks revision history newest-first and applies the most recent image
//! that differs from the one currently deployed. Revisions recording the
//! current image are skipped so a rollback can never be a no-op. Finding
//! no differing revision is an expected outcome, not a fault.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use super::RollbackOutcome;
use crate::backend::Backend;
use crate::metrics::REMEDIATIONS_FAILED_TOTAL;
use crate::safety::SafetyValidator;
use crate::Result;

pub struct RollbackTool {
    backend: Arc<dyn Backend>,
    validator: Arc<SafetyValidator>,
}

impl RollbackTool {
    pub fn new(backend: Arc<dyn Backend>, validator: Arc<SafetyValidator>) -> Self {
        Self { backend, validator }
    }

    pub async fn run(&self, service_name: &str, reason: Option<&str>) -> RollbackOutcome {
        info!(service_name, reason, "Attempting to rollback deployment");

        let validation = self.validator.validate("rollback", Some(service_name));
        if !validation.allowed {
            return failure(service_name, format!("Action blocked: {}", validation.reason));
        }

        if !self.backend.capabilities().revision_history {
            return failure(
                service_name,
                "Backend does not record revision history; rollback is not available."
                    .to_string(),
            );
        }

        match self.execute(service_name).await {
            Ok(outcome) => outcome,
            Err(err) => {
                REMEDIATIONS_FAILED_TOTAL.inc();
                error!(service_name, error = %err, "Failed to rollback deployment");
                failure(service_name, format!("Failed to rollback deployment: {err}"))
            }
        }
    }

    async fn execute(&self, service_name: &str) -> Result<RollbackOutcome> {
        let deployment = self.backend.read_deployment().await?;
        let current_image = deployment.image;

        let revisions = self.backend.list_revisions().await?;

        // Newest first; skip revisions whose image matches what is already
        // deployed, or the rollback would change nothing.
        let target = revisions.iter().find(|r| r.image != current_image);

        let Some(target) = target else {
            warn!(service_name, %current_image, "No differing revision to roll back to");
            return Ok(RollbackOutcome {
                success: false,
                service_name: service_name.to_string(),
                previous_image: current_image.clone(),
                new_image: String::new(),
                timestamp: Utc::now(),
                message: format!(
                    "No rollback target: every recorded revision runs image {current_image}"
                ),
            });
        };

        self.backend.patch_image(&target.image).await?;

        info!(
            service_name,
            revision = target.revision,
            previous_image = %current_image,
            new_image = %target.image,
            "Deployment rolled back"
        );

        Ok(RollbackOutcome {
            success: true,
            service_name: service_name.to_string(),
            previous_image: current_image.clone(),
            new_image: target.image.clone(),
            timestamp: Utc::now(),
            message: format!(
                "Rolled back {service_name} from {current_image} to {} (revision {})",
                target.image, target.revision
            ),
        })
    }
}

fn failure(service_name: &str, message: String) -> RollbackOutcome {
    RollbackOutcome {
        success: false,
        service_name: service_name.to_string(),
        previous_image: String::new(),
        new_image: String::new(),
        timestamp: Utc::now(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Capabilities, DeploymentView, MockBackend, RevisionRecord};
    use crate::safety::{SafetyLimits, SafetyValidator};

    fn caps(revision_history: bool) -> Capabilities {
        Capabilities {
            declarative_scale: true,
            tracks_instance_identity: true,
            revision_history,
        }
    }

    fn deployment(image: &str) -> DeploymentView {
        DeploymentView {
            name: "demo-app".to_string(),
            replicas: 2,
            image: image.to_string(),
            env: vec![],
            cpu_limit: None,
            memory_limit: None,
        }
    }

    fn revision(revision: i64, image: &str) -> RevisionRecord {
        RevisionRecord {
            revision,
            image: image.to_string(),
        }
    }

    fn tool(backend: MockBackend) -> RollbackTool {
        let limits = SafetyLimits {
            min_time_between_actions_ms: 0,
            ..SafetyLimits::default()
        };
        RollbackTool::new(Arc::new(backend), Arc::new(SafetyValidator::new(limits)))
    }

    #[tokio::test]
    async fn skips_revisions_with_identical_image() {
        let mut backend = MockBackend::new();
        backend.expect_capabilities().return_const(caps(true));
        backend
            .expect_read_deployment()
            .returning(|| Ok(deployment("a")));
        // rev 2 records the current image and must be skipped in favor of
        // rev 1 despite being more recent.
        backend.expect_list_revisions().returning(|| {
            Ok(vec![revision(3, "a"), revision(2, "a"), revision(1, "b")])
        });
        backend
            .expect_patch_image()
            .times(1)
            .withf(|image| image == "b")
            .returning(|_| Ok(()));
        let tool = tool(backend);

        let outcome = tool.run("demo-app", None).await;
        assert!(outcome.success);
        assert_eq!(outcome.previous_image, "a");
        assert_eq!(outcome.new_image, "b");
    }

    #[tokio::test]
    async fn no_differing_revision_is_a_structured_failure() {
        let mut backend = MockBackend::new();
        backend.expect_capabilities().return_const(caps(true));
        backend
            .expect_read_deployment()
            .returning(|| Ok(deployment("a")));
        backend
            .expect_list_revisions()
            .returning(|| Ok(vec![revision(2, "a"), revision(1, "a")]));
        // No expect_patch_image: touching the deployment would panic.
        let tool = tool(backend);

        let outcome = tool.run("demo-app", None).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("No rollback target"));
        assert_eq!(outcome.previous_image, "a");
    }

    #[tokio::test]
    async fn backend_without_history_refuses_cleanly() {
        let mut backend = MockBackend::new();
        backend.expect_capabilities().return_const(caps(false));
        let tool = tool(backend);

        let outcome = tool.run("demo-app", None).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("revision history"));
    }
}
