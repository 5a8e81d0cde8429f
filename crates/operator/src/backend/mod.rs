//! Orchestration Backend Abstraction
//!
//! The monitor and executor layers talk to the container orchestrator through
//! this trait only. Capabilities are probed once when the adapter is
//! constructed, never re-negotiated per call.

mod kubernetes;
pub mod quantity;

pub use kubernetes::KubeBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::model::TargetState;

/// What the selected backend can do. Decided at construction time so that
/// the tools can branch on policy without re-probing the API on every call.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// Replica counts are declarative (a scale patch) rather than achieved
    /// by starting and stopping individual instances.
    pub declarative_scale: bool,
    /// Restarted instances come back under new identities, so convergence
    /// can look for a replacement distinct from the pre-restart set.
    pub tracks_instance_identity: bool,
    /// Revision history is recorded and can be walked for rollback.
    pub revision_history: bool,
}

/// One remediation-addressable unit as the backend sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub id: String,
    pub name: String,
    pub state: TargetState,
    pub image: String,
}

/// Current shape of the deployable the targets belong to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentView {
    pub name: String,
    pub replicas: i32,
    pub image: String,
    pub env: Vec<EnvVar>,
    /// Per-container resource limits, as raw quantity strings.
    pub cpu_limit: Option<String>,
    pub memory_limit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// One historical revision of the deployable's template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub revision: i64,
    pub image: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    /// All targets matching the configured label selector.
    async fn list_targets(&self) -> crate::Result<Vec<TargetDescriptor>>;

    /// Delete targets; `name` narrows the deletion to a single target,
    /// `None` deletes everything under the selector.
    async fn delete_targets<'a>(&self, name: Option<&'a str>) -> crate::Result<()>;

    /// In-place restart of one instance, for backends without delete-and-
    /// recreate semantics.
    async fn restart_target(&self, id: &str) -> crate::Result<()>;

    async fn start_target(&self, id: &str) -> crate::Result<()>;

    async fn stop_target(&self, id: &str) -> crate::Result<()>;

    async fn read_deployment(&self) -> crate::Result<DeploymentView>;

    async fn patch_scale(&self, replicas: i32) -> crate::Result<()>;

    async fn patch_env(&self, env: &[EnvVar]) -> crate::Result<()>;

    async fn patch_image(&self, image: &str) -> crate::Result<()>;

    /// Revision history, newest first.
    async fn list_revisions(&self) -> crate::Result<Vec<RevisionRecord>>;

    async fn read_logs(&self, target_id: &str, tail_lines: i64) -> crate::Result<String>;
}

pub async fn create_backend(config: &Config) -> crate::Result<Arc<dyn Backend>> {
    let backend = KubeBackend::new(&config.kube).await?;
    Ok(Arc::new(backend))
}
