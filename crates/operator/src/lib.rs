pub mod backend;
pub mod config;
pub mod executor;
pub mod metrics;
pub mod model;
pub mod monitor;
pub mod safety;
pub mod server;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("target not found: {0}")]
    TargetNotFound(String),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("metrics unavailable: {0}")]
    MetricsUnavailable(String),
    #[error("unknown anomaly type: {0}")]
    UnknownAnomalyType(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("did not converge within {deadline_ms}ms: {action}")]
    ConvergenceTimeout { action: String, deadline_ms: u64 },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref resp) if resp.code == 404 => {
                Error::TargetNotFound(resp.message.clone())
            }
            other => Error::BackendUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
