use lazy_static::lazy_static;
use prometheus::{register_int_counter, Encoder, IntCounter, Registry, TextEncoder};
use std::sync::Once;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref ACTIONS_ALLOWED_TOTAL: IntCounter = register_int_counter!(
        "selfheal_actions_allowed_total",
        "Total number of actions that passed safety validation."
    )
    .unwrap();
    pub static ref ACTIONS_DENIED_TOTAL: IntCounter = register_int_counter!(
        "selfheal_actions_denied_total",
        "Total number of actions denied by the safety validator."
    )
    .unwrap();
    pub static ref ANOMALIES_DETECTED_TOTAL: IntCounter = register_int_counter!(
        "selfheal_anomalies_detected_total",
        "Total number of anomaly alerts emitted."
    )
    .unwrap();
    pub static ref REMEDIATIONS_FAILED_TOTAL: IntCounter = register_int_counter!(
        "selfheal_remediations_failed_total",
        "Total number of remediation tool calls that ended in failure."
    )
    .unwrap();
}

static REGISTER: Once = Once::new();

/// Idempotent: the server constructor and `main` may both call this.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(ACTIONS_ALLOWED_TOTAL.clone()))
            .expect("Failed to register ACTIONS_ALLOWED_TOTAL");
        REGISTRY
            .register(Box::new(ACTIONS_DENIED_TOTAL.clone()))
            .expect("Failed to register ACTIONS_DENIED_TOTAL");
        REGISTRY
            .register(Box::new(ANOMALIES_DETECTED_TOTAL.clone()))
            .expect("Failed to register ANOMALIES_DETECTED_TOTAL");
        REGISTRY
            .register(Box::new(REMEDIATIONS_FAILED_TOTAL.clone()))
            .expect("Failed to register REMEDIATIONS_FAILED_TOTAL");
    });
}

// Function to gather metrics for exposition
pub fn gather_metrics() -> String {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to string")
}
