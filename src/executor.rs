//! Applies the planner's action list via [`AzDoGateway`] and
//! [`PodGateway`]. Actions are applied sequentially, never in parallel
//! — within one tick, creations must land before a later stage's count
//! check and deregistrations must precede the matching delete. Before
//! any destructive action (`DeletePod` or `DeregisterAgent`) the
//! executor re-fetches the target pod plus fresh job/agent state from
//! the live APIs and re-checks Busy/InGrace against that read — the
//! plan was computed against a snapshot that may already be stale by
//! the time it runs. A single action's failure is logged and does not
//! abort the rest of the tick — the next poll will reattempt whatever
//! didn't land.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::azdo::AzDoGateway;
use crate::crd::RunnerPool;
use crate::metrics;
use crate::planner::{in_grace, is_busy, Action, MIN_AGENT_GRACE, REGISTRATION_GRACE};
use crate::podgateway::PodGateway;
use crate::snapshot::{AzdoAgent, JobRequest, PodInfo};

pub struct ReconcileExecutor<'a> {
    pub azdo: &'a AzDoGateway,
    pub pods: &'a PodGateway,
    pub pool_id: i64,
}

impl<'a> ReconcileExecutor<'a> {
    pub async fn apply(&self, pool: &RunnerPool, actions: &[Action]) {
        for action in actions {
            let kind = action_kind(action);
            match self.apply_one(pool, action).await {
                Ok(()) => metrics::ACTIONS_APPLIED_TOTAL.with_label_values(&[kind, "ok"]).inc(),
                Err(err) => {
                    metrics::ACTIONS_APPLIED_TOTAL.with_label_values(&[kind, "failed"]).inc();
                    warn!(action = ?action, error = %err, "action_failed_will_retry_next_tick");
                }
            }
        }
    }

    async fn apply_one(&self, pool: &RunnerPool, action: &Action) -> Result<(), crate::error::EngineError> {
        match action {
            Action::RelabelPod { name, labels } => {
                self.pods.update_pod_labels(name, labels).await
            }
            Action::CreatePod {
                index,
                is_min_agent,
                capability,
                job_request_id,
            } => {
                let mut extra = std::collections::BTreeMap::new();
                if let Some(id) = job_request_id {
                    extra.insert("job-request-id".to_string(), id.clone());
                }
                self.pods
                    .create_agent_pod(pool, &pool.spec, *index, *is_min_agent, capability, &extra)
                    .await
            }
            Action::DeregisterAgent { name } => {
                if self.is_destructive_action_blocked(name, Utc::now()).await {
                    return Ok(());
                }
                self.azdo.unregister_agent(self.pool_id, name).await
            }
            Action::DeletePod { name } => {
                if self.is_destructive_action_blocked(name, Utc::now()).await {
                    return Ok(());
                }
                self.pods.delete_pod(name).await
            }
        }
    }

    /// Re-fetches the named pod plus live job/agent state and decides
    /// whether a destructive action against it should still be blocked.
    /// Fetch failures are treated as blocked: we'd rather retry next
    /// tick than risk killing a job we couldn't verify is idle.
    async fn is_destructive_action_blocked(&self, name: &str, now: DateTime<Utc>) -> bool {
        let pod = match self.pods.get_pod(name).await {
            Ok(pod) => pod,
            Err(err) => {
                warn!(pod = name, error = %err, "re_check_pod_fetch_failed_blocking_action");
                return true;
            }
        };

        let jobs = match self.azdo.list_job_requests(self.pool_id).await {
            Ok(jobs) => jobs,
            Err(err) => {
                warn!(pod = name, error = %err, "re_check_job_fetch_failed_blocking_action");
                return true;
            }
        };

        let agents = match self.azdo.list_agents(self.pool_id).await {
            Ok(agents) => agents,
            Err(err) => {
                warn!(pod = name, error = %err, "re_check_agent_fetch_failed_blocking_action");
                return true;
            }
        };

        decide_blocked(pod.as_ref(), &jobs, &agents, now)
    }
}

fn action_kind(action: &Action) -> &'static str {
    match action {
        Action::DeregisterAgent { .. } => "deregister_agent",
        Action::DeletePod { .. } => "delete_pod",
        Action::RelabelPod { .. } => "relabel_pod",
        Action::CreatePod { .. } => "create_pod",
    }
}

/// Pure decision: given a freshly-fetched pod (or `None` if it's
/// already gone) plus freshly-fetched job/agent lists, should a
/// destructive action against it be blocked? Blocked if the pod is
/// busy or still within its registration grace window.
fn decide_blocked(pod: Option<&PodInfo>, jobs: &[JobRequest], agents: &[AzdoAgent], now: DateTime<Utc>) -> bool {
    let Some(pod) = pod else {
        return false; // already gone: nothing to protect
    };

    let grace = if pod.is_min_agent() { MIN_AGENT_GRACE } else { REGISTRATION_GRACE };
    is_busy(jobs, agents, pod) || in_grace(now, pod, grace)
}
