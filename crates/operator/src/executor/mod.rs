//! Remediation Executor
//!
//! The four validator-gated tools. Every tool follows the same shape:
//! validate, check preconditions, mutate the backend, poll for convergence
//! where applicable, and return a structured outcome. Tools never return
//! `Err`; backend failures are caught at the tool boundary and folded into
//! a failed outcome with a display-ready message.

pub mod restart;
pub mod rollback;
pub mod scale;
pub mod update_env;

pub use restart::RestartTool;
pub use rollback::RollbackTool;
pub use scale::ScaleTool;
pub use update_env::UpdateEnvTool;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartOutcome {
    pub success: bool,
    pub target_id: String,
    pub target_name: String,
    pub previous_state: String,
    pub new_state: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleOutcome {
    pub success: bool,
    pub service_name: String,
    pub previous_replicas: i32,
    pub new_replicas: i32,
    /// Instance operations that failed during a best-effort scale. Always 0
    /// on declarative backends.
    pub failed_operations: usize,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEnvOutcome {
    pub success: bool,
    pub target_id: String,
    pub updated_vars: Vec<String>,
    pub restarted: bool,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub success: bool,
    pub service_name: String,
    pub previous_image: String,
    pub new_image: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}
