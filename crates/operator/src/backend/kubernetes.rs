//! Kubernetes backend adapter.
//!
//! One typed `kube` client behind the `Backend` trait. Pod restarts are
//! delete-and-recreate (the Deployment controller brings replacements up),
//! scaling is a declarative patch, and rollback targets come from ReplicaSet
//! revision annotations.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, DeleteParams, ListParams, LogParams, Patch, PatchParams},
    Client,
};
use serde_json::json;
use tracing::info;

use super::{Backend, Capabilities, DeploymentView, EnvVar, RevisionRecord, TargetDescriptor};
use crate::config::KubeConfig;
use crate::model::TargetState;
use crate::{Error, Result};

const REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";

pub struct KubeBackend {
    client: Client,
    namespace: String,
    label_selector: String,
    deployment_name: String,
}

impl KubeBackend {
    pub async fn new(config: &KubeConfig) -> Result<Self> {
        let client = Client::try_default().await?;

        info!(
            namespace = %config.namespace,
            selector = %config.label_selector,
            "Initialized Kubernetes backend"
        );

        Ok(Self {
            client,
            namespace: config.namespace.clone(),
            label_selector: config.label_selector.clone(),
            deployment_name: config.deployment_name.clone(),
        })
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn replica_sets(&self) -> Api<ReplicaSet> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl Backend for KubeBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            declarative_scale: true,
            tracks_instance_identity: true,
            revision_history: true,
        }
    }

    async fn list_targets(&self) -> Result<Vec<TargetDescriptor>> {
        let params = ListParams::default().labels(&self.label_selector);
        let pods = self.pods().list(&params).await?;

        Ok(pods.items.iter().map(describe_pod).collect())
    }

    async fn delete_targets<'a>(&self, name: Option<&'a str>) -> Result<()> {
        let mut params = ListParams::default().labels(&self.label_selector);
        if let Some(name) = name {
            params = params.fields(&format!("metadata.name={name}"));
        }

        self.pods()
            .delete_collection(&DeleteParams::default(), &params)
            .await?;
        Ok(())
    }

    async fn restart_target(&self, id: &str) -> Result<()> {
        self.pods().delete(id, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn start_target(&self, _id: &str) -> Result<()> {
        Err(Error::InvalidParameter(
            "kubernetes backend does not manage standalone instances".into(),
        ))
    }

    async fn stop_target(&self, _id: &str) -> Result<()> {
        Err(Error::InvalidParameter(
            "kubernetes backend does not manage standalone instances".into(),
        ))
    }

    async fn read_deployment(&self) -> Result<DeploymentView> {
        let deployment = self.deployments().get(&self.deployment_name).await?;

        let spec = deployment.spec.as_ref();
        let replicas = spec.and_then(|s| s.replicas).unwrap_or(0);
        let container = spec
            .and_then(|s| s.template.spec.as_ref())
            .and_then(|p| p.containers.first());

        let image = container
            .and_then(|c| c.image.clone())
            .unwrap_or_default();
        let env = container
            .and_then(|c| c.env.as_ref())
            .map(|vars| {
                vars.iter()
                    .filter_map(|v| {
                        v.value.as_ref().map(|value| EnvVar {
                            name: v.name.clone(),
                            value: value.clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let limits = container.and_then(|c| c.resources.as_ref()).and_then(|r| r.limits.as_ref());
        let cpu_limit = limits.and_then(|l| l.get("cpu")).map(|q| q.0.clone());
        let memory_limit = limits.and_then(|l| l.get("memory")).map(|q| q.0.clone());

        Ok(DeploymentView {
            name: self.deployment_name.clone(),
            replicas,
            image,
            env,
            cpu_limit,
            memory_limit,
        })
    }

    async fn patch_scale(&self, replicas: i32) -> Result<()> {
        let patch = json!({ "spec": { "replicas": replicas } });
        self.deployments()
            .patch_scale(
                &self.deployment_name,
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }

    async fn patch_env(&self, env: &[EnvVar]) -> Result<()> {
        let deployment = self.deployments().get(&self.deployment_name).await?;
        let container_name = deployment
            .spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .and_then(|p| p.containers.first())
            .map(|c| c.name.clone())
            .ok_or_else(|| {
                Error::TargetNotFound(format!(
                    "deployment {} has no containers",
                    self.deployment_name
                ))
            })?;

        let env_json: Vec<_> = env
            .iter()
            .map(|v| json!({ "name": v.name, "value": v.value }))
            .collect();
        let patch = json!({
            "spec": {
                "template": {
                    "spec": {
                        "containers": [{ "name": container_name, "env": env_json }]
                    }
                }
            }
        });

        self.deployments()
            .patch(
                &self.deployment_name,
                &PatchParams::default(),
                &Patch::Strategic(&patch),
            )
            .await?;
        Ok(())
    }

    async fn patch_image(&self, image: &str) -> Result<()> {
        let deployment = self.deployments().get(&self.deployment_name).await?;
        let container_name = deployment
            .spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .and_then(|p| p.containers.first())
            .map(|c| c.name.clone())
            .ok_or_else(|| {
                Error::TargetNotFound(format!(
                    "deployment {} has no containers",
                    self.deployment_name
                ))
            })?;

        let patch = json!({
            "spec": {
                "template": {
                    "spec": {
                        "containers": [{ "name": container_name, "image": image }]
                    }
                }
            }
        });

        self.deployments()
            .patch(
                &self.deployment_name,
                &PatchParams::default(),
                &Patch::Strategic(&patch),
            )
            .await?;
        Ok(())
    }

    async fn list_revisions(&self) -> Result<Vec<RevisionRecord>> {
        let params = ListParams::default().labels(&self.label_selector);
        let sets = self.replica_sets().list(&params).await?;

        let mut revisions: Vec<RevisionRecord> = sets
            .items
            .iter()
            .filter_map(|rs| {
                let revision = rs
                    .metadata
                    .annotations
                    .as_ref()
                    .and_then(|a| a.get(REVISION_ANNOTATION))
                    .and_then(|r| r.parse::<i64>().ok())?;
                let image = rs
                    .spec
                    .as_ref()
                    .and_then(|s| s.template.as_ref())
                    .and_then(|t| t.spec.as_ref())
                    .and_then(|p| p.containers.first())
                    .and_then(|c| c.image.clone())?;
                Some(RevisionRecord { revision, image })
            })
            .collect();

        revisions.sort_by(|a, b| b.revision.cmp(&a.revision));
        Ok(revisions)
    }

    async fn read_logs(&self, target_id: &str, tail_lines: i64) -> Result<String> {
        let params = LogParams {
            tail_lines: Some(tail_lines),
            timestamps: true,
            ..Default::default()
        };
        let text = self.pods().logs(target_id, &params).await?;
        Ok(text)
    }
}

fn describe_pod(pod: &Pod) -> TargetDescriptor {
    let name = pod.metadata.name.clone().unwrap_or_default();
    let image = pod
        .spec
        .as_ref()
        .and_then(|s| s.containers.first())
        .and_then(|c| c.image.clone())
        .unwrap_or_default();

    TargetDescriptor {
        id: name.clone(),
        name,
        state: resolve_pod_state(pod),
        image,
    }
}

/// Collapse pod phase and primary-container status into one state. Container
/// status wins over phase when both are present.
fn resolve_pod_state(pod: &Pod) -> TargetState {
    let status = pod.status.as_ref();
    let container_state = status
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|cs| cs.first())
        .and_then(|c| c.state.as_ref());

    if let Some(state) = container_state {
        if state.running.is_some() {
            return TargetState::Running;
        }
        if let Some(waiting) = &state.waiting {
            if waiting
                .reason
                .as_deref()
                .map(|r| r.to_lowercase().contains("crashloop"))
                .unwrap_or(false)
            {
                return TargetState::Restarting;
            }
        }
        if state.terminated.is_some() {
            return TargetState::Exited;
        }
    }

    match status.and_then(|s| s.phase.as_deref()) {
        Some("Running") => TargetState::Running,
        Some("Pending") | Some("Unknown") => TargetState::Restarting,
        Some("Failed") => TargetState::Exited,
        Some("Succeeded") => TargetState::Stopped,
        _ => TargetState::Stopped,
    }
}
