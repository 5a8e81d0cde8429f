//! Safety limits for executor actions.

use serde::{Deserialize, Serialize};

/// Environment variables that the update-env tool may touch. Anything else
/// blocks the whole request.
pub const ENV_VAR_WHITELIST: &[&str] = &[
    "LOG_LEVEL",
    "DEBUG",
    "NODE_ENV",
    "JAVA_OPTS",
    "MAX_MEMORY",
    "MAX_HEAP_SIZE",
    "TIMEOUT",
    "RETRY_COUNT",
    "POOL_SIZE",
];

/// Action keywords that always require human approval, regardless of rate
/// limits or ledger state.
pub const BLOCKED_ACTION_KEYWORDS: &[&str] = &["delete", "remove", "prune", "kill"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyLimits {
    // Scaling limits
    pub min_replicas: i32,
    pub max_replicas: i32,

    // Rate limiting
    pub max_actions_per_hour: usize,
    pub max_restarts_per_target_per_hour: usize,

    // Timing
    pub min_time_between_actions_ms: i64,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            min_replicas: 1,
            max_replicas: 5,
            max_actions_per_hour: 10,
            max_restarts_per_target_per_hour: 3,
            min_time_between_actions_ms: 5_000,
        }
    }
}

impl SafetyLimits {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_replicas: defaults.min_replicas,
            max_replicas: defaults.max_replicas,
            max_actions_per_hour: env_or("MAX_ACTIONS_PER_HOUR", defaults.max_actions_per_hour),
            max_restarts_per_target_per_hour: env_or(
                "MAX_RESTARTS_PER_TARGET_PER_HOUR",
                defaults.max_restarts_per_target_per_hour,
            ),
            min_time_between_actions_ms: env_or(
                "MIN_TIME_BETWEEN_ACTIONS_MS",
                defaults.min_time_between_actions_ms,
            ),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
