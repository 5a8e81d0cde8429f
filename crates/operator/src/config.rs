use serde::{Deserialize, Serialize};

use crate::safety::SafetyLimits;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub kube: KubeConfig,
    pub monitor: MonitorConfig,
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub safety: SafetyLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubeConfig {
    pub namespace: String,
    pub label_selector: String,
    pub deployment_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Prometheus-style text endpoint exposed by the monitored app.
    pub metrics_url: String,
    /// Fallback when the pod spec declares no memory limit.
    pub default_memory_limit_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub restart_poll_interval_ms: u64,
    pub restart_ready_timeout_ms: u64,
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Config {
            server: ServerConfig {
                addr: std::env::var("SERVER_ADDR")
                    .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            },
            kube: KubeConfig {
                namespace: std::env::var("KUBE_NAMESPACE")
                    .unwrap_or_else(|_| "default".to_string()),
                label_selector: std::env::var("APP_LABEL_SELECTOR")
                    .unwrap_or_else(|_| "app=demo-app".to_string()),
                deployment_name: std::env::var("APP_DEPLOYMENT_NAME")
                    .unwrap_or_else(|_| "demo-app".to_string()),
            },
            monitor: MonitorConfig {
                metrics_url: std::env::var("APP_METRICS_URL")
                    .unwrap_or_else(|_| "http://demo-app:3000/metrics".to_string()),
                default_memory_limit_bytes: std::env::var("APP_MEMORY_LIMIT_BYTES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(512 * 1024 * 1024),
            },
            executor: ExecutorConfig {
                restart_poll_interval_ms: std::env::var("RESTART_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
                restart_ready_timeout_ms: std::env::var("RESTART_READY_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15_000),
            },
            safety: SafetyLimits::from_env(),
        };

        if config.executor.restart_poll_interval_ms == 0 {
            return Err(crate::Error::Config(
                "RESTART_POLL_INTERVAL_MS must be greater than zero".into(),
            ));
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                addr: "0.0.0.0:8080".to_string(),
            },
            kube: KubeConfig {
                namespace: "default".to_string(),
                label_selector: "app=demo-app".to_string(),
                deployment_name: "demo-app".to_string(),
            },
            monitor: MonitorConfig {
                metrics_url: "http://demo-app:3000/metrics".to_string(),
                default_memory_limit_bytes: 512 * 1024 * 1024,
            },
            executor: ExecutorConfig {
                restart_poll_interval_ms: 500,
                restart_ready_timeout_ms: 15_000,
            },
            safety: SafetyLimits::default(),
        }
    }
}
