//! Typed wrapper around the Kubernetes pod API for runner-pool-labelled
//! resources. Every pod this gateway creates or touches carries
//! `runner-pool=<poolName>` and `managed-by=azdo-runner-operator`
//! (invariant 1 of the data model); every read filters on those labels
//! so the engine never sees a pod it doesn't own.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, EnvVarSource, ExecAction, Lifecycle,
    LifecycleHandler, PersistentVolumeClaimVolumeSource, Pod, PodSecurityContext, PodSpec,
    SecretKeySelector, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::ResourceExt;

use crate::crd::{ImagePullPolicy, RunnerPool, RunnerPoolSpec};
use crate::error::{EngineError, EngineResult};
use crate::naming;
use crate::snapshot::{PodInfo, PodPhase};

pub struct PodGateway {
    api: Api<Pod>,
    namespace: String,
}

impl PodGateway {
    pub fn new(client: kube::Client, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            api: Api::namespaced(client, &namespace),
            namespace,
        }
    }

    fn list_params(pool_name: &str) -> ListParams {
        ListParams::default().labels(&format!(
            "runner-pool={pool_name},managed-by=azdo-runner-operator"
        ))
    }

    pub async fn list_all(&self, pool_name: &str) -> EngineResult<Vec<PodInfo>> {
        let list = self
            .api
            .list(&Self::list_params(pool_name))
            .await
            .map_err(EngineError::from)?;
        Ok(list.iter().map(to_pod_info).collect())
    }

    pub async fn list_active(&self, pool_name: &str) -> EngineResult<Vec<PodInfo>> {
        Ok(self
            .list_all(pool_name)
            .await?
            .into_iter()
            .filter(|p| matches!(p.phase, PodPhase::Running | PodPhase::Pending))
            .collect())
    }

    pub async fn list_min_agents(&self, pool_name: &str) -> EngineResult<Vec<PodInfo>> {
        Ok(self
            .list_all(pool_name)
            .await?
            .into_iter()
            .filter(|p| p.is_min_agent())
            .collect())
    }

    pub async fn next_available_agent_index(&self, pool_name: &str, max_agents: i32) -> EngineResult<u32> {
        let active = self.list_active(pool_name).await?;
        let names: Vec<String> = active.into_iter().map(|p| p.name).collect();
        naming::next_available_index(pool_name, &names, max_agents)
            .ok_or_else(|| EngineError::InvariantViolation(format!("no slot available for pool {pool_name}")))
    }

    /// Re-fetches a single pod by name, for callers that need live state
    /// immediately before a destructive action rather than a cached
    /// snapshot. `Ok(None)` means the pod is already gone.
    pub async fn get_pod(&self, name: &str) -> EngineResult<Option<PodInfo>> {
        match self.api.get(name).await {
            Ok(pod) => Ok(Some(to_pod_info(&pod))),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(EngineError::from(e)),
        }
    }

    pub async fn delete_pod(&self, name: &str) -> EngineResult<()> {
        match self.api.delete(name, &Default::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(EngineError::from(e)),
        }
    }

    pub async fn update_pod_labels(&self, name: &str, labels: &BTreeMap<String, String>) -> EngineResult<()> {
        let patch = serde_json::json!({ "metadata": { "labels": labels } });
        self.api
            .patch(name, &PatchParams::apply("azdo-runner-operator"), &Patch::Merge(&patch))
            .await
            .map_err(EngineError::from)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_agent_pod(
        &self,
        pool: &RunnerPool,
        spec: &RunnerPoolSpec,
        index: u32,
        is_min_agent: bool,
        capability: &str,
        extra_labels: &BTreeMap<String, String>,
    ) -> EngineResult<()> {
        let name = naming::pod_name(&pool.name_any(), index);
        let pod = build_agent_pod(pool, spec, &name, is_min_agent, capability, extra_labels, &self.namespace);
        self.api
            .create(&Default::default(), &pod)
            .await
            .map_err(EngineError::from)?;
        Ok(())
    }
}

fn to_pod_info(pod: &Pod) -> PodInfo {
    let labels: BTreeMap<String, String> = pod.labels().clone().into_iter().collect();
    let phase = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map(parse_phase)
        .unwrap_or(PodPhase::Unknown);

    let container_waiting_reasons = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| {
            statuses
                .iter()
                .filter_map(|cs| cs.state.as_ref()?.waiting.as_ref()?.reason.clone())
                .collect()
        })
        .unwrap_or_default();

    let created_at = pod
        .metadata
        .creation_timestamp
        .as_ref()
        .map(|t| t.0)
        .unwrap_or_else(chrono::Utc::now);

    PodInfo {
        name: pod.name_any(),
        phase,
        labels,
        created_at,
        container_waiting_reasons,
    }
}

fn parse_phase(phase: &str) -> PodPhase {
    match phase {
        "Pending" => PodPhase::Pending,
        "Running" => PodPhase::Running,
        "Succeeded" => PodPhase::Succeeded,
        "Failed" => PodPhase::Failed,
        _ => PodPhase::Unknown,
    }
}

fn build_agent_pod(
    pool: &RunnerPool,
    spec: &RunnerPoolSpec,
    name: &str,
    is_min_agent: bool,
    capability: &str,
    extra_labels: &BTreeMap<String, String>,
    namespace: &str,
) -> Pod {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), "azdo-runner".to_string());
    labels.insert("runner-pool".to_string(), pool.name_any());
    labels.insert("managed-by".to_string(), "azdo-runner-operator".to_string());
    labels.insert("min-agent".to_string(), is_min_agent.to_string());
    labels.insert("capability".to_string(), capability.to_string());
    for (k, v) in extra_labels {
        labels.insert(k.clone(), v.clone());
    }

    let mut env = vec![
        EnvVar {
            name: "AZP_URL".to_string(),
            value: Some(spec.azdo_url.clone()),
            ..Default::default()
        },
        EnvVar {
            name: "AZP_POOL".to_string(),
            value: Some(spec.pool.clone()),
            ..Default::default()
        },
        EnvVar {
            name: "AZP_TOKEN".to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: Some(spec.pat_secret_name.clone()),
                    key: "token".to_string(),
                    optional: Some(false),
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        EnvVar {
            name: "AZP_AGENT_NAME".to_string(),
            value: Some(name.to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "AZP_CAPABILITY".to_string(),
            value: Some(capability.to_string()),
            ..Default::default()
        },
    ];
    for extra in &spec.extra_env {
        env.push(EnvVar {
            name: extra.name.clone(),
            value: Some(extra.value.clone()),
            ..Default::default()
        });
    }

    let args = if spec.ttl_idle_seconds == 0 {
        Some(vec!["--once".to_string()])
    } else {
        None
    };

    let mut volumes = Vec::new();
    let mut volume_mounts = Vec::new();

    for pvc in &spec.pvcs {
        volumes.push(Volume {
            name: pvc.name.clone(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: pvc.claim_name.clone(),
                read_only: Some(false),
            }),
            ..Default::default()
        });
        volume_mounts.push(VolumeMount {
            name: pvc.name.clone(),
            mount_path: pvc.mount_path.clone(),
            ..Default::default()
        });
    }

    if let Some(config_map_name) = &spec.cert_trust_store {
        volumes.push(Volume {
            name: "cert-trust-store".to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(config_map_name.clone()),
                ..Default::default()
            }),
            ..Default::default()
        });
        volume_mounts.push(VolumeMount {
            name: "cert-trust-store".to_string(),
            mount_path: "/etc/azdo-runner/certs".to_string(),
            read_only: Some(true),
            ..Default::default()
        });
        env.push(EnvVar {
            name: "AZP_CERT_TRUST_STORE".to_string(),
            value: Some("/etc/azdo-runner/certs".to_string()),
            ..Default::default()
        });
    }

    let container = Container {
        name: "agent".to_string(),
        image: Some(spec.image.clone()),
        image_pull_policy: Some(spec.image_pull_policy.as_str().to_string()),
        env: Some(env),
        args,
        volume_mounts: (!volume_mounts.is_empty()).then(|| volume_mounts.clone()),
        lifecycle: Some(Lifecycle {
            pre_stop: Some(LifecycleHandler {
                exec: Some(ExecAction {
                    command: Some(vec![
                        "/bin/sh".to_string(),
                        "-c".to_string(),
                        "kill -TERM $(pgrep Agent.Listener)".to_string(),
                    ]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    let init_containers = spec.init_container.as_ref().map(|ic| {
        vec![Container {
            name: ic.name.clone(),
            image: Some(ic.image.clone()),
            command: (!ic.command.is_empty()).then(|| ic.command.clone()),
            args: (!ic.args.is_empty()).then(|| ic.args.clone()),
            volume_mounts: (!volume_mounts.is_empty()).then(|| volume_mounts.clone()),
            ..Default::default()
        }]
    });

    let security_context = spec.security_context.as_ref().map(|sc| PodSecurityContext {
        run_as_non_root: sc.run_as_non_root,
        run_as_user: sc.run_as_user,
        fs_group: sc.fs_group,
        ..Default::default()
    });

    let owner_ref = OwnerReference {
        api_version: "devops.opentools.mf/v1".to_string(),
        kind: "RunnerPool".to_string(),
        name: pool.name_any(),
        uid: pool.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    };

    Pod {
        metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            owner_references: Some(vec![owner_ref]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![container],
            init_containers,
            volumes: (!volumes.is_empty()).then_some(volumes),
            security_context,
            restart_policy: Some("Never".to_string()),
            ..Default::default()
        }),
        status: None,
    }
}
