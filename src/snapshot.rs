//! The immutable input to a planning pass: a point-in-time view of
//! Azure DevOps jobs/agents and Kubernetes pods for one pool. Built by
//! combining an AzDoGateway call and a PodGateway call; consumed only
//! by the planner.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub request_id: String,
    pub agent_id: Option<i64>,
    /// `None` = queued. `Some("inProgress")` still needs an agent.
    /// Any other `Some(_)` means finished.
    pub result: Option<String>,
    pub demands: Vec<String>,
}

impl JobRequest {
    /// Folds the two "still needs an agent" representations the source
    /// system uses (`result == null` and `result == "inProgress"`) into
    /// one predicate, per the open question resolved in the design
    /// notes.
    pub fn needs_agent(&self) -> bool {
        matches!(self.result.as_deref(), None | Some("inProgress"))
    }

    pub fn is_queued(&self) -> bool {
        self.result.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AzdoAgent {
    pub id: i64,
    pub name: String,
    pub status: AgentStatus,
    pub last_active: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PodInfo {
    pub name: String,
    pub phase: PodPhase,
    pub labels: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    /// Container `waiting.reason` values currently reported, used only
    /// by the error sweeper.
    pub container_waiting_reasons: Vec<String>,
}

impl PodInfo {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(|s| s.as_str())
    }

    pub fn is_min_agent(&self) -> bool {
        self.label("min-agent") == Some("true")
    }

    pub fn capability(&self) -> &str {
        self.label("capability").unwrap_or("base")
    }

    pub fn job_request_id(&self) -> Option<&str> {
        match self.label("job-request-id") {
            Some(v) if !v.is_empty() => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub queued_jobs: i32,
    pub jobs: Vec<JobRequest>,
    pub agents: Vec<AzdoAgent>,
    pub pods: Vec<PodInfo>,
}

impl Snapshot {
    pub fn job(&self, request_id: &str) -> Option<&JobRequest> {
        self.jobs.iter().find(|j| j.request_id == request_id)
    }

    pub fn agent(&self, name: &str) -> Option<&AzdoAgent> {
        self.agents.iter().find(|a| a.name == name)
    }
}
