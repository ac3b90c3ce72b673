//! Writes observed state back to the RunnerPool's `status` subresource
//! after every tick, success or failure. Status is write-only from the
//! engine's perspective — it is never read back to make decisions, only
//! to inform the user. Writes use a conflict-tolerant read-modify-write:
//! on a 409 the object is refetched and the patch retried, up to three
//! times, after which the write is dropped silently and the next tick
//! will recompute and try again.

use kube::api::{Api, Patch, PatchParams};
use tracing::warn;

use crate::crd::{AgentStatusEntry, ConnectionStatus, RunnerPool, RunnerPoolStatus};
use crate::error::EngineError;
use crate::snapshot::{AgentStatus, Snapshot};

const MAX_RETRIES: u32 = 3;
const FIELD_MANAGER: &str = "azdo-runner-operator";

pub struct StatusWriter {
    client: kube::Client,
}

impl StatusWriter {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn write(
        &self,
        namespace: &str,
        name: &str,
        connection_status: ConnectionStatus,
        organization_name: Option<String>,
        snapshot: Option<&Snapshot>,
        max_agents: i32,
        message: Option<String>,
    ) {
        let status = build_status(connection_status, organization_name, snapshot, max_agents, message);
        let api: Api<RunnerPool> = Api::namespaced(self.client.clone(), namespace);

        for attempt in 0..=MAX_RETRIES {
            let patch = serde_json::json!({ "status": status });
            match api
                .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
                .await
            {
                Ok(_) => return,
                Err(e) => {
                    let classified = EngineError::from(e);
                    if matches!(classified, EngineError::Conflict(_)) && attempt < MAX_RETRIES {
                        if let Err(refetch_err) = api.get(name).await {
                            warn!(pool = %name, error = %EngineError::from(refetch_err), attempt, "status_conflict_refetch_failed_giving_up");
                            return;
                        }
                        continue;
                    }
                    warn!(pool = %name, error = %classified, attempt, "status_write_failed_giving_up");
                    return;
                }
            }
        }
    }
}

fn build_status(
    connection_status: ConnectionStatus,
    organization_name: Option<String>,
    snapshot: Option<&Snapshot>,
    max_agents: i32,
    message: Option<String>,
) -> RunnerPoolStatus {
    let queued_jobs = snapshot.map(|s| s.queued_jobs).unwrap_or(0);
    let running_agents = snapshot
        .map(|s| s.pods.iter().filter(|p| p.phase == crate::snapshot::PodPhase::Running).count() as i32)
        .unwrap_or(0);

    let agents = snapshot
        .map(|s| {
            s.agents
                .iter()
                .map(|a| AgentStatusEntry {
                    name: a.name.clone(),
                    status: match a.status {
                        AgentStatus::Online => "Online".to_string(),
                        AgentStatus::Offline => "Offline".to_string(),
                    },
                    job_request_id: s
                        .jobs
                        .iter()
                        .find(|j| j.agent_id == Some(a.id) && j.result.is_none())
                        .map(|j| j.request_id.clone()),
                })
                .collect()
        })
        .unwrap_or_default();

    let (condition_type, condition_message) = match (&connection_status, &message) {
        (ConnectionStatus::Connected, None) => ("Ready".to_string(), "pool reconciled successfully".to_string()),
        (ConnectionStatus::Connected, Some(m)) => ("Ready".to_string(), m.clone()),
        (_, Some(m)) => ("Error".to_string(), m.clone()),
        (_, None) => ("Error".to_string(), "pool is disconnected".to_string()),
    };

    RunnerPoolStatus {
        connection_status,
        last_polled: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now())),
        organization_name,
        queued_jobs,
        running_agents,
        agents_summary: format!("{running_agents}/{max_agents}"),
        agents,
        condition_type: Some(condition_type),
        condition_message: Some(condition_message),
    }
}
