//! End-to-end exercises of the planner against a synthesized snapshot,
//! covering multi-stage interactions a single-stage unit test can't:
//! an idle min-agent pod getting relabeled and scaled up to cover a
//! queued capability-specific job in the same tick.

use std::collections::BTreeMap;

use azdo_runner_operator::crd::RunnerPoolSpec;
use azdo_runner_operator::planner::{plan, Action};
use azdo_runner_operator::snapshot::{AzdoAgent, JobRequest, PodInfo, PodPhase, Snapshot};
use chrono::Utc;

fn base_spec() -> RunnerPoolSpec {
    RunnerPoolSpec {
        azdo_url: "https://dev.azure.com/acme".into(),
        pool: "ci".into(),
        pat_secret_name: "azdo-pat".into(),
        image: "acme/agent:base".into(),
        max_agents: 5,
        min_agents: 1,
        ttl_idle_seconds: 300,
        poll_interval_seconds: 30,
        ..Default::default()
    }
}

fn idle_min_agent_pod(name: &str) -> PodInfo {
    let mut labels = BTreeMap::new();
    labels.insert("min-agent".to_string(), "true".to_string());
    labels.insert("capability".to_string(), "base".to_string());
    PodInfo {
        name: name.to_string(),
        phase: PodPhase::Running,
        labels,
        created_at: Utc::now() - chrono::Duration::minutes(30),
        container_waiting_reasons: vec![],
    }
}

#[test]
fn test_queued_job_with_unmet_capability_triggers_scale_up() {
    let mut spec = base_spec();
    spec.capability_aware = true;
    spec.capability_images.insert("java".to_string(), "acme/agent:java".to_string());

    let snapshot = Snapshot {
        queued_jobs: 1,
        jobs: vec![JobRequest {
            request_id: "100".into(),
            agent_id: None,
            result: None,
            demands: vec!["java".to_string()],
        }],
        agents: vec![],
        pods: vec![idle_min_agent_pod("ci-agent-0")],
    };

    let actions = plan(Utc::now(), "ci", &spec, &snapshot);

    let created_java = actions.iter().any(|a| matches!(
        a,
        Action::CreatePod { capability, .. } if capability == "java"
    ));
    assert!(created_java, "expected a java-capable pod to be planned: {actions:?}");
}

#[test]
fn test_offline_agent_with_no_pending_job_is_cleaned_up() {
    let spec = base_spec();
    let snapshot = Snapshot {
        queued_jobs: 0,
        jobs: vec![],
        agents: vec![AzdoAgent {
            id: 1,
            name: "ci-agent-0".into(),
            status: azdo_runner_operator::snapshot::AgentStatus::Offline,
            last_active: Some(Utc::now() - chrono::Duration::minutes(20)),
        }],
        pods: vec![],
    };

    let actions = plan(Utc::now(), "ci", &spec, &snapshot);
    assert!(actions.iter().any(|a| matches!(a, Action::DeregisterAgent { name } if name == "ci-agent-0")));
}

#[test]
fn test_empty_pool_with_min_agents_one_creates_a_min_agent_pod() {
    let spec = base_spec();
    let snapshot = Snapshot::default();
    let actions = plan(Utc::now(), "ci", &spec, &snapshot);
    assert!(actions.iter().any(|a| matches!(a, Action::CreatePod { is_min_agent: true, .. })));
}
