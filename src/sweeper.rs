//! Independent timer task that purges pods the planner's normal stages
//! wouldn't catch on their own schedule: pods stuck in an image-pull or
//! crash-loop waiting reason, and pods stuck `Pending` far longer than
//! any scheduling delay should take. Runs on its own ~10s cadence,
//! decoupled from each pool's poll interval, because a wedged pod is a
//! cluster-health problem independent of how often a given pool talks
//! to Azure DevOps.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::azdo::AzDoGateway;
use crate::podgateway::PodGateway;
use crate::registry::PoolRegistry;
use crate::snapshot::PodInfo;

const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(10);
const STUCK_PENDING_THRESHOLD: Duration = Duration::minutes(15);

const ERROR_WAITING_REASONS: &[&str] = &[
    "ImagePullBackOff",
    "ErrImagePull",
    "CrashLoopBackOff",
    "InvalidImageName",
    "ImageInspectError",
];

pub struct ErrorSweeper {
    registry: PoolRegistry,
    client: kube::Client,
}

impl ErrorSweeper {
    pub fn new(registry: PoolRegistry, client: kube::Client) -> Self {
        Self { registry, client }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep_once(Utc::now()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("error_sweeper_shutting_down");
                        return;
                    }
                }
            }
        }
    }

    async fn sweep_once(&self, now: DateTime<Utc>) {
        for (key, state) in self.registry.snapshot().await {
            let Some((namespace, pool_name)) = key.split_once('/') else {
                continue;
            };
            let gateway = PodGateway::new(self.client.clone(), namespace);
            let pods = match gateway.list_all(pool_name).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(pool = %key, error = %e, "sweeper_list_failed");
                    continue;
                }
            };

            let to_purge = pods_to_purge(&pods, now);
            if to_purge.is_empty() {
                continue;
            }

            let azdo = match AzDoGateway::new(state.spec.azdo_url.clone(), state.pat.clone()) {
                Ok(g) => Some(g),
                Err(e) => {
                    warn!(pool = %key, error = %e, "sweeper_azdo_gateway_build_failed");
                    None
                }
            };
            let pool_id = match &azdo {
                Some(g) => match g.resolve_pool_id(&state.spec.pool).await {
                    Ok(id) => Some(id),
                    Err(e) => {
                        warn!(pool = %key, error = %e, "sweeper_resolve_pool_id_failed");
                        None
                    }
                },
                None => None,
            };

            for pod in to_purge {
                if let (Some(azdo), Some(pool_id)) = (&azdo, pool_id) {
                    if let Err(e) = azdo.unregister_agent(pool_id, &pod.name).await {
                        warn!(pool = %key, pod = %pod.name, error = %e, "sweeper_deregister_failed");
                    }
                }

                if let Err(e) = gateway.delete_pod(&pod.name).await {
                    warn!(pool = %key, pod = %pod.name, error = %e, "sweeper_delete_failed");
                } else {
                    info!(pool = %key, pod = %pod.name, min_agent = pod.is_min_agent(), "sweeper_purged_pod");
                }
            }
        }
    }
}

/// Pure decision function: which pods the sweeper should delete right
/// now. Separated from the I/O loop so it can be tested without a
/// cluster.
fn pods_to_purge<'a>(pods: &'a [PodInfo], now: DateTime<Utc>) -> Vec<&'a PodInfo> {
    pods.iter()
        .filter(|p| {
            let has_error_reason = p
                .container_waiting_reasons
                .iter()
                .any(|r| ERROR_WAITING_REASONS.contains(&r.as_str()));

            let stuck_pending = p.phase == crate::snapshot::PodPhase::Pending
                && now - p.created_at > STUCK_PENDING_THRESHOLD;

            has_error_reason || stuck_pending
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::PodPhase;
    use std::collections::BTreeMap;

    fn pod(name: &str, phase: PodPhase, age_mins: i64, reasons: Vec<&str>) -> PodInfo {
        PodInfo {
            name: name.to_string(),
            phase,
            labels: BTreeMap::new(),
            created_at: Utc::now() - Duration::minutes(age_mins),
            container_waiting_reasons: reasons.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn test_purges_image_pull_backoff_regardless_of_age() {
        let pods = vec![pod("p-agent-0", PodPhase::Pending, 1, vec!["ImagePullBackOff"])];
        let purged = pods_to_purge(&pods, Utc::now());
        assert_eq!(purged.len(), 1);
    }

    #[test]
    fn test_purges_crash_loop_backoff() {
        let pods = vec![pod("p-agent-0", PodPhase::Running, 1, vec!["CrashLoopBackOff"])];
        let purged = pods_to_purge(&pods, Utc::now());
        assert_eq!(purged.len(), 1);
    }

    #[test]
    fn test_purges_pending_stuck_past_fifteen_minutes() {
        let pods = vec![pod("p-agent-0", PodPhase::Pending, 16, vec![])];
        let purged = pods_to_purge(&pods, Utc::now());
        assert_eq!(purged.len(), 1);
    }

    #[test]
    fn test_leaves_recently_pending_pod_alone() {
        let pods = vec![pod("p-agent-0", PodPhase::Pending, 2, vec![])];
        let purged = pods_to_purge(&pods, Utc::now());
        assert!(purged.is_empty());
    }

    #[test]
    fn test_leaves_healthy_running_pod_alone() {
        let pods = vec![pod("p-agent-0", PodPhase::Running, 60, vec![])];
        let purged = pods_to_purge(&pods, Utc::now());
        assert!(purged.is_empty());
    }

    #[test]
    fn test_purges_invalid_image_name() {
        let pods = vec![pod("p-agent-0", PodPhase::Pending, 1, vec!["InvalidImageName"])];
        let purged = pods_to_purge(&pods, Utc::now());
        assert_eq!(purged.len(), 1);
    }

    #[test]
    fn test_purges_image_inspect_error() {
        let pods = vec![pod("p-agent-0", PodPhase::Pending, 1, vec!["ImageInspectError"])];
        let purged = pods_to_purge(&pods, Utc::now());
        assert_eq!(purged.len(), 1);
    }

    #[test]
    fn test_ignores_unrelated_waiting_reasons() {
        let pods = vec![pod("p-agent-0", PodPhase::Pending, 1, vec!["ContainerCreating"])];
        let purged = pods_to_purge(&pods, Utc::now());
        assert!(purged.is_empty());
    }
}
