//! The `RunnerPool` custom resource: desired state for a pool of
//! self-hosted Azure DevOps build agents, plus the status subresource
//! the engine writes back.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `imagePullPolicy` values a RunnerPool may request for its agent pods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ImagePullPolicy {
    Always,
    #[default]
    IfNotPresent,
    Never,
}

impl ImagePullPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImagePullPolicy::Always => "Always",
            ImagePullPolicy::IfNotPresent => "IfNotPresent",
            ImagePullPolicy::Never => "Never",
        }
    }
}

/// An init container to prepend to the agent pod, verbatim pass-through
/// to the Kubernetes API (PodGateway consumes this; the planner never
/// inspects it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct InitContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// A PVC to mount into the agent pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct PvcMount {
    pub name: String,
    pub claim_name: String,
    pub mount_path: String,
}

/// An extra environment variable forwarded into the agent container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct EnvVarSpec {
    pub name: String,
    pub value: String,
}

/// Pod-level `securityContext`, passed through to PodGateway untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct SecurityContextSpec {
    #[serde(default)]
    pub run_as_non_root: Option<bool>,
    #[serde(default)]
    pub run_as_user: Option<i64>,
    #[serde(default)]
    pub fs_group: Option<i64>,
}

/// Desired state for a pool of self-hosted Azure DevOps agents.
///
/// Field semantics, defaults, and the planning algorithm that consumes
/// them are described alongside the reconciliation engine; this type
/// only carries the data.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "devops.opentools.mf",
    version = "v1",
    kind = "RunnerPool",
    plural = "runnerpools",
    status = "RunnerPoolStatus",
    namespaced,
    printcolumn = r#"{"name":"Connection", "type":"string", "jsonPath":".status.connectionStatus"}"#,
    printcolumn = r#"{"name":"Pool", "type":"string", "jsonPath":".spec.pool"}"#,
    printcolumn = r#"{"name":"Organization", "type":"string", "jsonPath":".status.organizationName"}"#,
    printcolumn = r#"{"name":"Queued", "type":"integer", "jsonPath":".status.queuedJobs"}"#,
    printcolumn = r#"{"name":"Agents", "type":"string", "jsonPath":".status.agentsSummary"}"#,
    printcolumn = r#"{"name":"Running", "type":"integer", "jsonPath":".status.runningAgents"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RunnerPoolSpec {
    /// Absolute http(s) URL of the organization/collection root.
    pub azdo_url: String,
    /// Pool display name in Azure DevOps.
    pub pool: String,
    /// Name of a namespace-scoped secret with key `token`.
    pub pat_secret_name: String,
    /// Default agent container image.
    pub image: String,
    #[serde(default)]
    pub image_pull_policy: ImagePullPolicy,
    #[serde(default = "default_max_agents")]
    pub max_agents: i32,
    #[serde(default)]
    pub min_agents: i32,
    #[serde(default)]
    pub ttl_idle_seconds: i32,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: i32,
    #[serde(default)]
    pub capability_aware: bool,
    #[serde(default)]
    pub capability_images: BTreeMap<String, String>,
    #[serde(default)]
    pub extra_env: Vec<EnvVarSpec>,
    #[serde(default)]
    pub pvcs: Vec<PvcMount>,
    #[serde(default)]
    pub cert_trust_store: Option<String>,
    #[serde(default)]
    pub init_container: Option<InitContainerSpec>,
    #[serde(default)]
    pub security_context: Option<SecurityContextSpec>,
}

fn default_max_agents() -> i32 {
    10
}

fn default_poll_interval() -> i32 {
    5
}

/// Connectivity classification surfaced in `status.connectionStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub enum ConnectionStatus {
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

/// One entry in `status.agents`, a point-in-time summary of an
/// operator-managed agent for human consumption only — the engine never
/// reads status back to make decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusEntry {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_request_id: Option<String>,
}

/// Observed state written by the engine after every tick.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunnerPoolStatus {
    #[serde(default)]
    pub connection_status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_polled: Option<Time>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(default)]
    pub queued_jobs: i32,
    #[serde(default)]
    pub running_agents: i32,
    #[serde(default)]
    pub agents_summary: String,
    #[serde(default)]
    pub agents: Vec<AgentStatusEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crd_yaml_generation() {
        let crd = RunnerPool::crd();
        let yaml = serde_yaml::to_string(&crd).expect("crd should serialize to yaml");
        assert!(yaml.contains("runnerpools"));
        assert!(yaml.contains("devops.opentools.mf"));
    }

    #[test]
    fn test_spec_defaults_via_deserialize() {
        let json = serde_json::json!({
            "azdoUrl": "https://dev.azure.com/acme",
            "pool": "default",
            "patSecretName": "azdo-pat",
            "image": "acme/agent:latest",
        });
        let spec: RunnerPoolSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.max_agents, 10);
        assert_eq!(spec.min_agents, 0);
        assert_eq!(spec.poll_interval_seconds, 5);
        assert_eq!(spec.image_pull_policy, ImagePullPolicy::IfNotPresent);
        assert!(!spec.capability_aware);
    }

    #[test]
    fn test_spec_roundtrip_with_capability_images() {
        let json = serde_json::json!({
            "azdoUrl": "https://dev.azure.com/acme",
            "pool": "linux-pool",
            "patSecretName": "azdo-pat",
            "image": "acme/agent:base",
            "maxAgents": 5,
            "minAgents": 1,
            "ttlIdleSeconds": 300,
            "capabilityAware": true,
            "capabilityImages": {"java": "acme/agent:java"},
        });
        let spec: RunnerPoolSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.max_agents, 5);
        assert_eq!(spec.min_agents, 1);
        assert_eq!(spec.ttl_idle_seconds, 300);
        assert!(spec.capability_aware);
        assert_eq!(
            spec.capability_images.get("java"),
            Some(&"acme/agent:java".to_string())
        );

        let back = serde_json::to_string(&spec).expect("should serialize");
        let reparsed: RunnerPoolSpec = serde_json::from_str(&back).expect("should deserialize");
        assert_eq!(reparsed.pool, "linux-pool");
    }

    #[test]
    fn test_status_default_is_unknown() {
        let status = RunnerPoolStatus::default();
        assert_eq!(status.connection_status, ConnectionStatus::Unknown);
        assert_eq!(status.queued_jobs, 0);
        assert!(status.agents.is_empty());
    }

    #[test]
    fn test_image_pull_policy_as_str() {
        assert_eq!(ImagePullPolicy::Always.as_str(), "Always");
        assert_eq!(ImagePullPolicy::IfNotPresent.as_str(), "IfNotPresent");
        assert_eq!(ImagePullPolicy::Never.as_str(), "Never");
    }

    #[test]
    fn test_backward_compat_missing_optional_fields() {
        // Old/minimal manifests without extraEnv/pvcs/etc. must still parse.
        let json = serde_json::json!({
            "azdoUrl": "https://tfs.acme.internal/collection",
            "pool": "onprem",
            "patSecretName": "azdo-pat",
            "image": "acme/agent:base",
        });
        let spec: RunnerPoolSpec = serde_json::from_value(json).unwrap();
        assert!(spec.extra_env.is_empty());
        assert!(spec.pvcs.is_empty());
        assert!(spec.init_container.is_none());
    }
}
