//! The reconciliation heart of the engine: a single task that wakes up
//! whenever any registered pool is due, builds a snapshot, runs it
//! through the planner, executes the resulting actions, and writes
//! status. Deliberately not built on `kube::runtime::Controller` —
//! polling Azure DevOps on a timer is the whole point, not a reaction
//! to a Kubernetes watch event. A thin Controller/`watcher()` elsewhere
//! only keeps [`PoolRegistry`] in sync with RunnerPool create/update/
//! delete events; this type never watches anything.

use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::azdo::{self, AzDoGateway};
use crate::crd::ConnectionStatus;
use crate::error::EngineError;
use crate::executor::ReconcileExecutor;
use crate::metrics;
use crate::planner;
use crate::podgateway::PodGateway;
use crate::registry::{PollState, PoolRegistry};
use crate::snapshot::Snapshot;
use crate::status::StatusWriter;

/// Lower bound on the scheduler's own wake-up granularity: even with
/// every pool on a long poll interval, we still check at least this
/// often for newly-registered pools.
const TICK_GRANULARITY: StdDuration = StdDuration::from_secs(1);

pub struct PollScheduler {
    registry: PoolRegistry,
    client: kube::Client,
    status: StatusWriter,
}

impl PollScheduler {
    pub fn new(registry: PoolRegistry, client: kube::Client) -> Self {
        Self {
            status: StatusWriter::new(client.clone()),
            registry,
            client,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(TICK_GRANULARITY);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick_due_pools(Utc::now()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("poll_scheduler_shutting_down");
                        return;
                    }
                }
            }
        }
    }

    async fn tick_due_pools(&self, now: chrono::DateTime<Utc>) {
        let pools = self.registry.snapshot().await;
        metrics::REGISTERED_POOLS.set(pools.len() as f64);
        for (key, state) in pools {
            let due = now - state.last_polled
                >= chrono::Duration::seconds(state.poll_interval_seconds as i64);
            if !due {
                continue;
            }
            let Some((namespace, name)) = key.split_once('/') else {
                continue;
            };
            self.registry.mark_polled(namespace, name, now).await;
            self.reconcile_one(namespace, name, &state, now).await;
        }
    }

    async fn reconcile_one(
        &self,
        namespace: &str,
        pool_name: &str,
        state: &PollState,
        now: chrono::DateTime<Utc>,
    ) {
        let timer = metrics::RECONCILE_DURATION_SECONDS.start_timer();
        metrics::RECONCILE_TOTAL.inc();

        let azdo = match AzDoGateway::new(state.spec.azdo_url.clone(), state.pat.clone()) {
            Ok(g) => g,
            Err(e) => {
                error!(pool = %pool_name, error = %e, "failed_building_azdo_gateway");
                self.status
                    .write(
                        namespace,
                        pool_name,
                        ConnectionStatus::Disconnected,
                        None,
                        None,
                        state.spec.max_agents,
                        Some(e.to_string()),
                    )
                    .await;
                timer.stop_and_record();
                return;
            }
        };

        let result = self.run_tick(namespace, pool_name, state, &azdo, now).await;
        timer.stop_and_record();

        match result {
            Ok(snapshot) => {
                metrics::RECONCILE_SUCCESS_TOTAL.inc();
                let organization_name = Some(azdo::extract_organization_name(&state.spec.azdo_url));
                self.status
                    .write(
                        namespace,
                        pool_name,
                        ConnectionStatus::Connected,
                        organization_name,
                        Some(&snapshot),
                        state.spec.max_agents,
                        None,
                    )
                    .await;
            }
            Err(e) => {
                metrics::RECONCILE_FAILURE_TOTAL.inc();
                warn!(pool = %pool_name, error = %e, "reconcile_failed");
                self.status
                    .write(
                        namespace,
                        pool_name,
                        ConnectionStatus::Disconnected,
                        None,
                        None,
                        state.spec.max_agents,
                        Some(e.to_string()),
                    )
                    .await;
            }
        }
    }

    async fn run_tick(
        &self,
        namespace: &str,
        pool_name: &str,
        state: &PollState,
        azdo: &AzDoGateway,
        now: chrono::DateTime<Utc>,
    ) -> Result<Snapshot, EngineError> {
        let pool_id = azdo.resolve_pool_id(&state.spec.pool).await?;
        let pods_gateway = PodGateway::new(self.client.clone(), namespace);

        let jobs = azdo.list_job_requests(pool_id).await?;
        let agents = azdo.list_agents(pool_id).await?;
        let pods = pods_gateway.list_all(pool_name).await?;
        let queued_jobs = jobs.iter().filter(|j| j.is_queued()).count() as i32;

        let snapshot = Snapshot {
            queued_jobs,
            jobs,
            agents,
            pods,
        };

        metrics::QUEUED_JOBS.with_label_values(&[pool_name]).set(snapshot.queued_jobs as f64);
        metrics::RUNNING_AGENTS
            .with_label_values(&[pool_name])
            .set(snapshot.pods.iter().filter(|p| p.phase == crate::snapshot::PodPhase::Running).count() as f64);

        let actions = planner::plan(now, pool_name, &state.spec, &snapshot);
        metrics::ACTIONS_PLANNED_TOTAL.inc_by(actions.len() as u64);

        let pool = api_for(&self.client, namespace)
            .get(pool_name)
            .await
            .map_err(EngineError::from)?;

        let executor = ReconcileExecutor {
            azdo,
            pods: &pods_gateway,
            pool_id,
        };
        executor.apply(&pool, &actions).await;

        Ok(snapshot)
    }
}

fn api_for(client: &kube::Client, namespace: &str) -> kube::Api<crate::crd::RunnerPool> {
    kube::Api::namespaced(client.clone(), namespace)
}
