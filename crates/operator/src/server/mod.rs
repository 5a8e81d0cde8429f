mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    backend::Backend,
    config::Config,
    executor::{RestartTool, RollbackTool, ScaleTool, UpdateEnvTool},
    monitor::{AnomalyDetector, LogCollector, MetricsCollector, RunbookLibrary},
    safety::SafetyValidator,
};

pub struct AppState {
    pub metrics: Arc<MetricsCollector>,
    pub logs: Arc<LogCollector>,
    pub detector: AnomalyDetector,
    pub runbooks: RunbookLibrary,
    pub validator: Arc<SafetyValidator>,
    pub restart: RestartTool,
    pub scale: ScaleTool,
    pub update_env: UpdateEnvTool,
    pub rollback: RollbackTool,
}

pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(config: &Config, backend: Arc<dyn Backend>) -> Self {
        crate::metrics::register_metrics();

        let service_name = &config.kube.deployment_name;
        let validator = Arc::new(SafetyValidator::new(config.safety.clone()));

        let metrics = Arc::new(MetricsCollector::new(
            backend.clone(),
            &config.monitor,
            service_name,
        ));
        let logs = Arc::new(LogCollector::new(backend.clone(), service_name));
        let detector = AnomalyDetector::new(metrics.clone(), logs.clone());

        let state = AppState {
            metrics,
            logs,
            detector,
            runbooks: RunbookLibrary::new(),
            validator: validator.clone(),
            restart: RestartTool::new(
                backend.clone(),
                validator.clone(),
                service_name,
                &config.executor,
            ),
            scale: ScaleTool::new(backend.clone(), validator.clone(), &config.safety),
            update_env: UpdateEnvTool::new(backend.clone(), validator.clone()),
            rollback: RollbackTool::new(backend, validator),
        };

        Self {
            state: Arc::new(state),
        }
    }

    pub fn build_router(self) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .route("/metrics", get(routes::metrics))
            .route("/monitor/metrics/{target}", get(routes::target_metrics))
            .route("/monitor/logs/{target}", get(routes::target_logs))
            .route("/monitor/anomaly/{target}", get(routes::detect_anomaly))
            .route("/monitor/runbook/{anomaly_type}", get(routes::get_runbook))
            .route(
                "/safety/history",
                get(routes::action_history).delete(routes::clear_action_history),
            )
            .route("/tools/restart-container", post(routes::restart_container))
            .route("/tools/scale-service", post(routes::scale_service))
            .route("/tools/update-env-vars", post(routes::update_env_vars))
            .route("/tools/rollback-deployment", post(routes::rollback_deployment))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state)
    }

    pub async fn start(self, addr: &str) -> crate::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr, "Server listening");
        axum::serve(listener, self.build_router())
            .await
            .map_err(|e| crate::Error::Internal(e.to_string()))
    }
}
