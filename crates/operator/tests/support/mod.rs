//! In-memory backend for integration tests.
//!
//! Records every mutation so tests can assert on exactly what a tool did,
//! and supports swapping the target list on delete to simulate an
//! orchestrator bringing up replacement instances.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use selfheal_operator::backend::{
    Backend, Capabilities, DeploymentView, EnvVar, RevisionRecord, TargetDescriptor,
};
use selfheal_operator::model::TargetState;
use selfheal_operator::safety::{SafetyLimits, SafetyValidator};
use selfheal_operator::{Error, Result};

pub struct FakeState {
    pub targets: Vec<TargetDescriptor>,
    /// When set, `delete_targets` replaces the target list with this,
    /// simulating the orchestrator recreating instances under new ids.
    pub replacement_targets: Option<Vec<TargetDescriptor>>,
    pub deployment: DeploymentView,
    pub revisions: Vec<RevisionRecord>,
    /// Raw log text keyed by target id.
    pub logs: HashMap<String, String>,
    /// Instance ids whose `start_target` should fail.
    pub fail_start_ids: HashSet<String>,

    // Recorded mutations, in call order.
    pub deleted: Vec<Option<String>>,
    pub restarted: Vec<String>,
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub scale_patches: Vec<i32>,
    pub env_patches: Vec<Vec<EnvVar>>,
    pub image_patches: Vec<String>,
}

pub struct FakeBackend {
    caps: Capabilities,
    pub state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new(caps: Capabilities) -> Self {
        Self {
            caps,
            state: Mutex::new(FakeState {
                targets: Vec::new(),
                replacement_targets: None,
                deployment: DeploymentView {
                    name: "demo-app".to_string(),
                    replicas: 1,
                    image: "app:1.0".to_string(),
                    env: Vec::new(),
                    cpu_limit: None,
                    memory_limit: None,
                },
                revisions: Vec::new(),
                logs: HashMap::new(),
                fail_start_ids: HashSet::new(),
                deleted: Vec::new(),
                restarted: Vec::new(),
                started: Vec::new(),
                stopped: Vec::new(),
                scale_patches: Vec::new(),
                env_patches: Vec::new(),
                image_patches: Vec::new(),
            }),
        }
    }

    /// Declarative backend with instance identity and revision history.
    pub fn kubernetes_like() -> Self {
        Self::new(Capabilities {
            declarative_scale: true,
            tracks_instance_identity: true,
            revision_history: true,
        })
    }

    /// Instance-oriented backend: no scale patches, stable instance ids,
    /// no recorded revisions.
    pub fn instance_based() -> Self {
        Self::new(Capabilities {
            declarative_scale: false,
            tracks_instance_identity: false,
            revision_history: false,
        })
    }
}

pub fn target(id: &str, name: &str, state: TargetState) -> TargetDescriptor {
    TargetDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        state,
        image: "app:1.0".to_string(),
    }
}

pub fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: value.to_string(),
    }
}

/// Validator with spacing disabled so consecutive test actions pass.
pub fn permissive_validator() -> SafetyValidator {
    SafetyValidator::new(SafetyLimits {
        min_time_between_actions_ms: 0,
        ..SafetyLimits::default()
    })
}

#[async_trait]
impl Backend for FakeBackend {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    async fn list_targets(&self) -> Result<Vec<TargetDescriptor>> {
        Ok(self.state.lock().unwrap().targets.clone())
    }

    async fn delete_targets<'a>(&self, name: Option<&'a str>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.deleted.push(name.map(str::to_string));

        if let Some(replacement) = state.replacement_targets.take() {
            state.targets = replacement;
        } else if let Some(name) = name {
            state.targets.retain(|t| t.id != name && t.name != name);
        } else {
            state.targets.clear();
        }
        Ok(())
    }

    async fn restart_target(&self, id: &str) -> Result<()> {
        self.state.lock().unwrap().restarted.push(id.to_string());
        Ok(())
    }

    async fn start_target(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_start_ids.contains(id) {
            return Err(Error::BackendUnavailable(format!(
                "instance {id} failed to start"
            )));
        }
        state.started.push(id.to_string());
        if let Some(target) = state.targets.iter_mut().find(|t| t.id == id) {
            target.state = TargetState::Running;
        }
        Ok(())
    }

    async fn stop_target(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.stopped.push(id.to_string());
        if let Some(target) = state.targets.iter_mut().find(|t| t.id == id) {
            target.state = TargetState::Stopped;
        }
        Ok(())
    }

    async fn read_deployment(&self) -> Result<DeploymentView> {
        Ok(self.state.lock().unwrap().deployment.clone())
    }

    async fn patch_scale(&self, replicas: i32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.scale_patches.push(replicas);
        state.deployment.replicas = replicas;
        Ok(())
    }

    async fn patch_env(&self, env: &[EnvVar]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.env_patches.push(env.to_vec());
        state.deployment.env = env.to_vec();
        Ok(())
    }

    async fn patch_image(&self, image: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.image_patches.push(image.to_string());
        state.deployment.image = image.to_string();
        Ok(())
    }

    async fn list_revisions(&self) -> Result<Vec<RevisionRecord>> {
        Ok(self.state.lock().unwrap().revisions.clone())
    }

    async fn read_logs(&self, target_id: &str, _tail_lines: i64) -> Result<String> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .logs
            .get(target_id)
            .cloned()
            .unwrap_or_default())
    }
}
