//! The pure heart of the reconciliation engine: given a pool's desired
//! spec and a point-in-time snapshot, produce a deterministic, ordered
//! list of actions. No I/O, no clock reads (time is injected), no
//! randomness (indices come from the snapshot). This is what makes the
//! whole engine testable: the same `(now, spec, snapshot)` triple always
//! yields the same action list.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};

use crate::crd::RunnerPoolSpec;
use crate::naming;
use crate::snapshot::{AgentStatus, AzdoAgent, JobRequest, PodInfo, PodPhase, Snapshot};

pub(crate) const REGISTRATION_GRACE: Duration = Duration::minutes(2);
pub(crate) const MIN_AGENT_GRACE: Duration = Duration::minutes(3);
const STUCK_AGENT_WINDOW: Duration = Duration::minutes(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    DeregisterAgent { name: String },
    DeletePod { name: String },
    RelabelPod { name: String, labels: BTreeMap<String, String> },
    CreatePod {
        index: u32,
        is_min_agent: bool,
        capability: String,
        job_request_id: Option<String>,
    },
}

/// A working copy of the pod fleet the planner mutates across stages so
/// later stages see the effect of earlier ones (Stage E's creations
/// count toward Stage G's cap check, deletions free up slots, etc).
/// This is bookkeeping internal to one planning pass, not state that
/// escapes the function.
struct Working {
    pods: Vec<PodInfo>,
    agents: Vec<AzdoAgent>,
}

impl Working {
    fn remove_pod(&mut self, name: &str) {
        self.pods.retain(|p| p.name != name);
    }

    fn remove_agent(&mut self, name: &str) {
        self.agents.retain(|a| a.name != name);
    }

    fn relabel(&mut self, name: &str, key: &str, value: &str) {
        if let Some(pod) = self.pods.iter_mut().find(|p| p.name == name) {
            if value.is_empty() {
                pod.labels.remove(key);
            } else {
                pod.labels.insert(key.to_string(), value.to_string());
            }
        }
    }

    fn agent_by_name(&self, name: &str) -> Option<&AzdoAgent> {
        self.agents.iter().find(|a| a.name == name)
    }
}

fn busy_by_agent(jobs: &[JobRequest], agents: &[AzdoAgent], pod_name: &str) -> bool {
    jobs.iter().any(|j| {
        j.result.is_none()
            && j.agent_id
                .is_some_and(|id| agents.iter().any(|a| a.id == id && a.name == pod_name))
    })
}

fn busy_by_label(jobs: &[JobRequest], pod: &PodInfo) -> bool {
    pod.job_request_id()
        .and_then(|id| jobs.iter().find(|j| j.request_id == id))
        .is_some_and(|j| j.result.is_none())
}

pub(crate) fn is_busy(jobs: &[JobRequest], agents: &[AzdoAgent], pod: &PodInfo) -> bool {
    busy_by_agent(jobs, agents, &pod.name) || busy_by_label(jobs, pod)
}

pub(crate) fn in_grace(now: DateTime<Utc>, pod: &PodInfo, window: Duration) -> bool {
    now - pod.created_at < window
}

fn synthetic_pod(pool_name: &str, index: u32, is_min_agent: bool, capability: &str, job_request_id: Option<&str>, now: DateTime<Utc>) -> PodInfo {
    let mut labels = BTreeMap::new();
    labels.insert("runner-pool".to_string(), pool_name.to_string());
    labels.insert("managed-by".to_string(), "azdo-runner-operator".to_string());
    labels.insert("min-agent".to_string(), is_min_agent.to_string());
    labels.insert("capability".to_string(), capability.to_string());
    if let Some(id) = job_request_id {
        labels.insert("job-request-id".to_string(), id.to_string());
    }
    PodInfo {
        name: naming::pod_name(pool_name, index),
        phase: PodPhase::Pending,
        labels,
        created_at: now,
        container_waiting_reasons: vec![],
    }
}

fn resolve_capability(demands: &[String], capability_images: &BTreeMap<String, String>) -> String {
    demands
        .iter()
        .find(|d| capability_images.contains_key(d.as_str()))
        .cloned()
        .unwrap_or_else(|| "base".to_string())
}

/// Runs Stages A through H in order and returns the full action list.
pub fn plan(now: DateTime<Utc>, pool_name: &str, spec: &RunnerPoolSpec, snapshot: &Snapshot) -> Vec<Action> {
    let mut actions = Vec::new();
    let mut w = Working {
        pods: snapshot.pods.clone(),
        agents: snapshot.agents.clone(),
    };

    stage_a_completed_label_sweep(&mut actions, &mut w, snapshot);
    stage_b_terminal_pod_cleanup(&mut actions, &mut w, snapshot, spec, now);
    stage_c_offline_agent_cleanup(&mut actions, &mut w, snapshot, now);
    stage_d_idle_cleanup(&mut actions, &mut w, snapshot, spec, now);
    stage_e_min_agent_convergence(&mut actions, &mut w, snapshot, spec, pool_name, now);
    stage_f_capability_optimization(&mut actions, &mut w, snapshot, spec, pool_name, now);
    stage_g_max_agent_enforcement(&mut actions, &mut w, snapshot, spec, now);
    stage_h_scale_up(&mut actions, &mut w, snapshot, spec, pool_name, now);

    actions
}

fn stage_a_completed_label_sweep(actions: &mut Vec<Action>, w: &mut Working, snapshot: &Snapshot) {
    let candidates: Vec<String> = w
        .pods
        .iter()
        .filter(|p| p.phase == PodPhase::Running)
        .filter_map(|p| {
            let req_id = p.job_request_id()?;
            let finished_or_missing = match snapshot.job(req_id) {
                Some(job) => job.result.is_some(),
                None => true,
            };
            finished_or_missing.then(|| p.name.clone())
        })
        .collect();

    for name in candidates {
        let mut labels = BTreeMap::new();
        labels.insert("job-request-id".to_string(), String::new());
        actions.push(Action::RelabelPod { name: name.clone(), labels });
        w.relabel(&name, "job-request-id", "");
    }
}

fn stage_b_terminal_pod_cleanup(actions: &mut Vec<Action>, w: &mut Working, snapshot: &Snapshot, spec: &RunnerPoolSpec, now: DateTime<Utc>) {
    let candidates: Vec<String> = w
        .pods
        .iter()
        .filter(|p| matches!(p.phase, PodPhase::Succeeded | PodPhase::Failed))
        .filter(|p| !is_busy(&snapshot.jobs, &w.agents, p))
        .filter(|p| {
            spec.ttl_idle_seconds == 0
                || now - p.created_at > Duration::seconds(spec.ttl_idle_seconds as i64)
        })
        .map(|p| p.name.clone())
        .collect();

    for name in candidates {
        actions.push(Action::DeregisterAgent { name: name.clone() });
        actions.push(Action::DeletePod { name: name.clone() });
        w.remove_pod(&name);
        w.remove_agent(&name);
    }
}

fn stage_c_offline_agent_cleanup(actions: &mut Vec<Action>, w: &mut Working, snapshot: &Snapshot, now: DateTime<Utc>) {
    let candidates: Vec<AzdoAgent> = w
        .agents
        .iter()
        .filter(|a| a.status == AgentStatus::Offline)
        .filter(|a| {
            !w.pods.iter().any(|p| {
                p.name == a.name && matches!(p.phase, PodPhase::Running | PodPhase::Pending)
            })
        })
        .cloned()
        .collect();

    for agent in candidates {
        let incomplete = snapshot
            .jobs
            .iter()
            .find(|j| j.result.is_none() && j.agent_id == Some(agent.id));

        let should_deregister = match incomplete {
            Some(_) => agent
                .last_active
                .is_some_and(|t| now - t <= STUCK_AGENT_WINDOW),
            None => true,
        };

        if should_deregister {
            actions.push(Action::DeregisterAgent { name: agent.name.clone() });
            w.remove_agent(&agent.name);
        }
    }
}

fn stage_d_idle_cleanup(actions: &mut Vec<Action>, w: &mut Working, snapshot: &Snapshot, spec: &RunnerPoolSpec, now: DateTime<Utc>) {
    let candidates: Vec<String> = w
        .pods
        .iter()
        .filter(|p| p.phase == PodPhase::Running)
        .filter(|p| !p.is_min_agent())
        .filter(|p| !in_grace(now, p, REGISTRATION_GRACE))
        .filter(|p| !is_busy(&snapshot.jobs, &w.agents, p))
        .filter_map(|p| {
            if spec.ttl_idle_seconds == 0 {
                (snapshot.queued_jobs == 0).then(|| p.name.clone())
            } else {
                let reference = w
                    .agent_by_name(&p.name)
                    .and_then(|a| a.last_active)
                    .unwrap_or(p.created_at);
                let idle_for = now - reference;
                (idle_for > Duration::seconds(spec.ttl_idle_seconds as i64)).then(|| p.name.clone())
            }
        })
        .collect();

    for name in candidates {
        actions.push(Action::DeregisterAgent { name: name.clone() });
        actions.push(Action::DeletePod { name: name.clone() });
        w.remove_pod(&name);
        w.remove_agent(&name);
    }
}

fn stage_e_min_agent_convergence(
    actions: &mut Vec<Action>,
    w: &mut Working,
    snapshot: &Snapshot,
    spec: &RunnerPoolSpec,
    pool_name: &str,
    now: DateTime<Utc>,
) {
    let m = spec.min_agents.max(0).min(spec.max_agents.max(0));
    let c = w.pods.iter().filter(|p| p.is_min_agent()).count() as i32;

    if c > m {
        let mut eligible: Vec<PodInfo> = w
            .pods
            .iter()
            .filter(|p| p.is_min_agent())
            .filter(|p| !is_busy(&snapshot.jobs, &w.agents, p))
            .filter(|p| !in_grace(now, p, MIN_AGENT_GRACE))
            .cloned()
            .collect();
        eligible.sort_by_key(|p| p.created_at);
        eligible.truncate((c - m) as usize);

        for pod in eligible {
            actions.push(Action::DeregisterAgent { name: pod.name.clone() });
            actions.push(Action::DeletePod { name: pod.name.clone() });
            w.remove_pod(&pod.name);
            w.remove_agent(&pod.name);
        }
    } else if c < m {
        let needed = m - c;
        for _ in 0..needed {
            let existing_names: Vec<String> = w.pods.iter().map(|p| p.name.clone()).collect();
            let Some(index) = naming::next_available_index(pool_name, &existing_names, spec.max_agents) else {
                break;
            };
            actions.push(Action::CreatePod {
                index,
                is_min_agent: true,
                capability: "base".to_string(),
                job_request_id: None,
            });
            w.pods.push(synthetic_pod(pool_name, index, true, "base", None, now));
        }
    }
}

fn stage_f_capability_optimization(
    actions: &mut Vec<Action>,
    w: &mut Working,
    snapshot: &Snapshot,
    spec: &RunnerPoolSpec,
    pool_name: &str,
    now: DateTime<Utc>,
) {
    let m = spec.min_agents.max(0).min(spec.max_agents.max(0));
    if !spec.capability_aware || m <= 0 || snapshot.queued_jobs <= 0 {
        return;
    }

    let required: BTreeSet<String> = snapshot
        .jobs
        .iter()
        .filter(|j| j.is_queued())
        .filter_map(|j| {
            j.demands
                .iter()
                .find(|d| spec.capability_images.contains_key(d.as_str()))
                .cloned()
        })
        .collect();
    if required.is_empty() {
        return;
    }

    let present: BTreeSet<String> = w
        .pods
        .iter()
        .filter(|p| p.is_min_agent())
        .map(|p| p.capability().to_string())
        .collect();

    let missing: Vec<String> = required.difference(&present).cloned().collect();

    for cap in missing {
        let mut base_pods: Vec<PodInfo> = w
            .pods
            .iter()
            .filter(|p| p.is_min_agent() && p.capability() == "base")
            .cloned()
            .collect();
        base_pods.sort_by_key(|p| p.created_at);
        let Some(base_pod) = base_pods.into_iter().next() else {
            break;
        };

        if w.pods.len() as i32 >= spec.max_agents {
            break;
        }

        let existing_names: Vec<String> = w.pods.iter().map(|p| p.name.clone()).collect();
        let Some(index) = naming::next_available_index(pool_name, &existing_names, spec.max_agents) else {
            break;
        };

        actions.push(Action::CreatePod {
            index,
            is_min_agent: true,
            capability: cap.clone(),
            job_request_id: None,
        });
        w.pods.push(synthetic_pod(pool_name, index, true, &cap, None, now));

        actions.push(Action::DeregisterAgent { name: base_pod.name.clone() });
        actions.push(Action::DeletePod { name: base_pod.name.clone() });
        w.remove_pod(&base_pod.name);
        w.remove_agent(&base_pod.name);
    }
}

fn stage_g_max_agent_enforcement(actions: &mut Vec<Action>, w: &mut Working, snapshot: &Snapshot, spec: &RunnerPoolSpec, now: DateTime<Utc>) {
    let a = w
        .pods
        .iter()
        .filter(|p| matches!(p.phase, PodPhase::Running | PodPhase::Pending))
        .count() as i32;

    if a <= spec.max_agents {
        return;
    }

    let excess = (a - spec.max_agents) as usize;

    let mut candidates: Vec<PodInfo> = w
        .pods
        .iter()
        .filter(|p| matches!(p.phase, PodPhase::Running | PodPhase::Pending))
        .filter(|p| !is_busy(&snapshot.jobs, &w.agents, p))
        .filter(|p| {
            let grace = if p.is_min_agent() { MIN_AGENT_GRACE } else { REGISTRATION_GRACE };
            !in_grace(now, p, grace)
        })
        .cloned()
        .collect();
    candidates.sort_by_key(|p| (p.is_min_agent(), p.created_at));
    candidates.truncate(excess);

    for pod in candidates {
        actions.push(Action::DeregisterAgent { name: pod.name.clone() });
        actions.push(Action::DeletePod { name: pod.name.clone() });
        w.remove_pod(&pod.name);
        w.remove_agent(&pod.name);
    }
}

fn stage_h_scale_up(
    actions: &mut Vec<Action>,
    w: &mut Working,
    snapshot: &Snapshot,
    spec: &RunnerPoolSpec,
    pool_name: &str,
    now: DateTime<Utc>,
) {
    if snapshot.queued_jobs <= 0 {
        return;
    }

    let unbound: Vec<&JobRequest> = snapshot
        .jobs
        .iter()
        .filter(|j| j.needs_agent())
        .filter(|j| {
            let bound_to_managed_agent = j.agent_id.is_some_and(|id| {
                w.agents
                    .iter()
                    .any(|a| a.id == id && naming::is_operator_managed(pool_name, &a.name))
            });
            let represented_by_pod = w
                .pods
                .iter()
                .any(|p| p.job_request_id() == Some(j.request_id.as_str()));
            !bound_to_managed_agent && !represented_by_pod
        })
        .collect();

    for job in unbound {
        let required_capability = resolve_capability(&job.demands, &spec.capability_images);

        let reuse_target = (spec.ttl_idle_seconds > 0)
            .then(|| find_idle_agent_pod(w, snapshot, spec, &required_capability, now))
            .flatten();

        if let Some(pod_name) = reuse_target {
            let mut labels = BTreeMap::new();
            labels.insert("job-request-id".to_string(), job.request_id.clone());
            actions.push(Action::RelabelPod { name: pod_name.clone(), labels });
            w.relabel(&pod_name, "job-request-id", &job.request_id);
            continue;
        }

        if (w.pods.len() as i32) < spec.max_agents {
            let existing_names: Vec<String> = w.pods.iter().map(|p| p.name.clone()).collect();
            let Some(index) = naming::next_available_index(pool_name, &existing_names, spec.max_agents) else {
                break;
            };
            actions.push(Action::CreatePod {
                index,
                is_min_agent: false,
                capability: required_capability.clone(),
                job_request_id: Some(job.request_id.clone()),
            });
            w.pods.push(synthetic_pod(
                pool_name,
                index,
                false,
                &required_capability,
                Some(&job.request_id),
                now,
            ));
        } else {
            break;
        }
    }
}

fn find_idle_agent_pod(
    w: &Working,
    snapshot: &Snapshot,
    spec: &RunnerPoolSpec,
    required_capability: &str,
    now: DateTime<Utc>,
) -> Option<String> {
    let ttl = Duration::seconds(spec.ttl_idle_seconds as i64);
    w.pods
        .iter()
        .filter(|p| p.phase == PodPhase::Running)
        .filter(|p| !p.is_min_agent())
        .filter(|p| !is_busy(&snapshot.jobs, &w.agents, p))
        .filter(|p| p.job_request_id().is_none())
        .filter(|p| {
            if spec.capability_aware {
                p.capability() == required_capability
            } else {
                true
            }
        })
        .find(|p| {
            let last_active = w.agent_by_name(&p.name).and_then(|a| a.last_active);
            match last_active {
                None => true,
                Some(t) => now - t <= ttl,
            }
        })
        .map(|p| p.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::RunnerPoolSpec;
    use std::collections::BTreeMap as Map;

    fn base_spec() -> RunnerPoolSpec {
        RunnerPoolSpec {
            azdo_url: "https://dev.azure.com/acme".into(),
            pool: "ci".into(),
            pat_secret_name: "azdo-pat".into(),
            image: "acme/agent:base".into(),
            max_agents: 3,
            min_agents: 0,
            ttl_idle_seconds: 0,
            poll_interval_seconds: 5,
            ..Default::default()
        }
    }

    fn pod(name: &str, phase: PodPhase, labels: &[(&str, &str)], age: Duration) -> PodInfo {
        let mut map = Map::new();
        for (k, v) in labels {
            map.insert(k.to_string(), v.to_string());
        }
        PodInfo {
            name: name.to_string(),
            phase,
            labels: map,
            created_at: Utc::now() - age,
            container_waiting_reasons: vec![],
        }
    }

    #[test]
    fn scenario_1_cold_start_no_work() {
        let spec = base_spec();
        let snapshot = Snapshot::default();
        let actions = plan(Utc::now(), "ci", &spec, &snapshot);
        assert!(actions.is_empty());
    }

    #[test]
    fn scenario_2_scale_up_to_single_job() {
        let mut spec = base_spec();
        spec.max_agents = 5;
        spec.ttl_idle_seconds = 60;
        let snapshot = Snapshot {
            queued_jobs: 1,
            jobs: vec![JobRequest {
                request_id: "42".into(),
                agent_id: None,
                result: None,
                demands: vec![],
            }],
            agents: vec![],
            pods: vec![],
        };
        let actions = plan(Utc::now(), "p", &spec, &snapshot);
        assert_eq!(
            actions,
            vec![Action::CreatePod {
                index: 0,
                is_min_agent: false,
                capability: "base".into(),
                job_request_id: Some("42".into()),
            }]
        );
    }

    #[test]
    fn scenario_3_reuse_idle_agent() {
        let mut spec = base_spec();
        spec.max_agents = 2;
        spec.ttl_idle_seconds = 300;
        let snapshot = Snapshot {
            queued_jobs: 1,
            jobs: vec![JobRequest {
                request_id: "99".into(),
                agent_id: None,
                result: None,
                demands: vec![],
            }],
            agents: vec![AzdoAgent {
                id: 7,
                name: "p-agent-0".into(),
                status: AgentStatus::Online,
                last_active: Some(Utc::now() - Duration::seconds(30)),
            }],
            pods: vec![pod("p-agent-0", PodPhase::Running, &[("job-request-id", "")], Duration::minutes(10))],
        };
        let actions = plan(Utc::now(), "p", &spec, &snapshot);
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            Action::RelabelPod { name, labels } => {
                assert_eq!(name, "p-agent-0");
                assert_eq!(labels.get("job-request-id"), Some(&"99".to_string()));
            }
            other => panic!("expected RelabelPod, got {other:?}"),
        }
    }

    #[test]
    fn scenario_4_capability_replace() {
        let mut spec = base_spec();
        spec.min_agents = 1;
        spec.max_agents = 3;
        spec.capability_aware = true;
        spec.capability_images.insert("java".into(), "img-java".into());

        let snapshot = Snapshot {
            queued_jobs: 1,
            jobs: vec![JobRequest {
                request_id: "1".into(),
                agent_id: None,
                result: None,
                demands: vec!["java".into()],
            }],
            agents: vec![],
            pods: vec![pod(
                "p-agent-0",
                PodPhase::Running,
                &[("min-agent", "true"), ("capability", "base")],
                Duration::minutes(10),
            )],
        };
        let actions = plan(Utc::now(), "p", &spec, &snapshot);
        assert_eq!(
            actions[0],
            Action::CreatePod {
                index: 1,
                is_min_agent: true,
                capability: "java".into(),
                job_request_id: None,
            }
        );
        assert_eq!(actions[1], Action::DeregisterAgent { name: "p-agent-0".into() });
        assert_eq!(actions[2], Action::DeletePod { name: "p-agent-0".into() });
    }

    #[test]
    fn scenario_5_busy_agent_protected() {
        let mut spec = base_spec();
        spec.max_agents = 1;
        spec.ttl_idle_seconds = 0;

        let snapshot = Snapshot {
            queued_jobs: 0,
            jobs: vec![JobRequest {
                request_id: "500".into(),
                agent_id: Some(7),
                result: None,
                demands: vec![],
            }],
            agents: vec![AzdoAgent {
                id: 7,
                name: "p-agent-0".into(),
                status: AgentStatus::Online,
                last_active: None,
            }],
            pods: vec![pod(
                "p-agent-0",
                PodPhase::Running,
                &[("job-request-id", "500")],
                Duration::minutes(10),
            )],
        };
        let actions = plan(Utc::now(), "p", &spec, &snapshot);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_stage_a_clears_label_on_finished_job() {
        let spec = base_spec();
        let snapshot = Snapshot {
            queued_jobs: 0,
            jobs: vec![JobRequest {
                request_id: "1".into(),
                agent_id: None,
                result: Some("succeeded".into()),
                demands: vec![],
            }],
            agents: vec![],
            pods: vec![pod(
                "ci-agent-0",
                PodPhase::Running,
                &[("job-request-id", "1")],
                Duration::minutes(10),
            )],
        };
        let actions = plan(Utc::now(), "ci", &spec, &snapshot);
        assert!(actions.iter().any(|a| matches!(a, Action::RelabelPod { name, .. } if name == "ci-agent-0")));
    }

    #[test]
    fn test_grace_period_protects_new_pod_from_idle_removal() {
        let spec = base_spec();
        let snapshot = Snapshot {
            queued_jobs: 0,
            jobs: vec![],
            agents: vec![],
            pods: vec![pod("ci-agent-0", PodPhase::Running, &[], Duration::seconds(30))],
        };
        let actions = plan(Utc::now(), "ci", &spec, &snapshot);
        assert!(actions.is_empty(), "pod younger than grace period must survive: {actions:?}");
    }

    #[test]
    fn test_min_agents_equal_max_agents_forbids_non_min_pods() {
        let mut spec = base_spec();
        spec.min_agents = 2;
        spec.max_agents = 2;
        let snapshot = Snapshot {
            queued_jobs: 0,
            jobs: vec![],
            agents: vec![],
            pods: vec![],
        };
        let actions = plan(Utc::now(), "ci", &spec, &snapshot);
        let creates: Vec<_> = actions
            .iter()
            .filter(|a| matches!(a, Action::CreatePod { is_min_agent, .. } if *is_min_agent))
            .collect();
        assert_eq!(creates.len(), 2);
    }

    #[test]
    fn test_planner_is_deterministic() {
        let spec = base_spec();
        let now = Utc::now();
        let snapshot = Snapshot {
            queued_jobs: 1,
            jobs: vec![JobRequest {
                request_id: "1".into(),
                agent_id: None,
                result: None,
                demands: vec![],
            }],
            agents: vec![],
            pods: vec![],
        };
        let first = plan(now, "ci", &spec, &snapshot);
        let second = plan(now, "ci", &spec, &snapshot);
        assert_eq!(first, second);
    }

    #[test]
    fn test_stage_g_caps_active_pods_preferring_non_min_first() {
        let mut spec = base_spec();
        spec.max_agents = 1;
        let snapshot = Snapshot {
            queued_jobs: 0,
            jobs: vec![],
            agents: vec![],
            pods: vec![
                pod("ci-agent-0", PodPhase::Running, &[("min-agent", "true")], Duration::minutes(10)),
                pod("ci-agent-1", PodPhase::Running, &[], Duration::minutes(10)),
            ],
        };
        let actions = plan(Utc::now(), "ci", &spec, &snapshot);
        assert!(actions.contains(&Action::DeletePod { name: "ci-agent-1".into() }));
        assert!(!actions.contains(&Action::DeletePod { name: "ci-agent-0".into() }));
    }

    #[test]
    fn test_stage_g_uses_min_agent_grace_for_min_agent_pods() {
        let mut spec = base_spec();
        spec.max_agents = 1;
        let snapshot = Snapshot {
            queued_jobs: 0,
            jobs: vec![],
            agents: vec![],
            pods: vec![
                pod("ci-agent-0", PodPhase::Running, &[("min-agent", "true")], Duration::minutes(2) + Duration::seconds(30)),
                pod("ci-agent-1", PodPhase::Running, &[], Duration::minutes(10)),
            ],
        };
        let actions = plan(Utc::now(), "ci", &spec, &snapshot);
        assert!(actions.contains(&Action::DeletePod { name: "ci-agent-1".into() }));
        assert!(
            !actions.contains(&Action::DeletePod { name: "ci-agent-0".into() }),
            "min-agent pod aged 2.5 minutes is still within its 3-minute grace: {actions:?}"
        );
    }
}
