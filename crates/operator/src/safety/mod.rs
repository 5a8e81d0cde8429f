//! Safety Layer
//!
//! Every remediation action passes through the validator in this module
//! before anything mutates the backend.

mod limits;
mod validator;

pub use limits::{SafetyLimits, BLOCKED_ACTION_KEYWORDS, ENV_VAR_WHITELIST};
pub use validator::{ActionRecord, SafetyValidator};
