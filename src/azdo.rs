//! HTTP client for Azure DevOps: pools, agents, job requests, and agent
//! deregistration. Stateless, bound to `(azDoUrl, pat)`. Every operation
//! is cancellable through the underlying `reqwest::Client`'s own request
//! timeout, and every failure is classified into one of the semantic
//! error kinds in [`crate::error`] so callers never need to inspect an
//! HTTP status code themselves.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::{EngineError, EngineResult};
use crate::snapshot::{AgentStatus, AzdoAgent, JobRequest};

const API_VERSION: &str = "7.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AzDoGateway {
    client: Client,
    base_url: String,
    pat: String,
}

#[derive(Debug, Deserialize)]
struct ProjectListResponse {
    #[allow(dead_code)]
    count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PoolListResponse {
    value: Vec<PoolDto>,
}

#[derive(Debug, Deserialize)]
struct PoolDto {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct AgentListResponse {
    value: Vec<AgentDto>,
}

#[derive(Debug, Deserialize)]
struct AgentDto {
    id: i64,
    name: String,
    status: String,
    #[serde(rename = "assignedRequest")]
    assigned_request: Option<AssignedRequestDto>,
}

#[derive(Debug, Deserialize)]
struct AssignedRequestDto {
    #[serde(rename = "finishTime")]
    finish_time: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
struct JobRequestListResponse {
    value: Vec<JobRequestDto>,
}

#[derive(Debug, Deserialize)]
struct JobRequestDto {
    #[serde(rename = "requestId")]
    request_id: i64,
    result: Option<String>,
    #[serde(rename = "reservedAgent")]
    reserved_agent: Option<ReservedAgentDto>,
    demands: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ReservedAgentDto {
    id: i64,
}

impl AzDoGateway {
    pub fn new(azdo_url: impl Into<String>, pat: impl Into<String>) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Configuration(format!("building http client: {e}")))?;
        Ok(Self {
            client,
            base_url: azdo_url.into().trim_end_matches('/').to_string(),
            pat: pat.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get(&self, path: &str) -> EngineResult<reqwest::Response> {
        let resp = self
            .client
            .get(self.url(path))
            .basic_auth("", Some(&self.pat))
            .send()
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        classify_response(resp).await
    }

    pub async fn test_connection(&self) -> EngineResult<bool> {
        match self
            .get(&format!("/_apis/projects?api-version={API_VERSION}"))
            .await
        {
            Ok(resp) => {
                let _: ProjectListResponse = resp
                    .json()
                    .await
                    .map_err(|e| EngineError::Transient(e.to_string()))?;
                Ok(true)
            }
            Err(EngineError::NotFound(_)) => Ok(false),
            Err(other) => Err(other),
        }
    }

    pub async fn resolve_pool_id(&self, pool_name: &str) -> EngineResult<i64> {
        let resp = self
            .get(&format!(
                "/_apis/distributedtask/pools?api-version={API_VERSION}"
            ))
            .await?;
        let pools: PoolListResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;

        pools
            .value
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(pool_name))
            .map(|p| p.id)
            .ok_or_else(|| EngineError::Permanent(format!("pool not found: {pool_name}")))
    }

    pub async fn list_agents(&self, pool_id: i64) -> EngineResult<Vec<AzdoAgent>> {
        let resp = self
            .get(&format!(
                "/_apis/distributedtask/pools/{pool_id}/agents?includeLastCompletedRequest=true&api-version={API_VERSION}"
            ))
            .await?;
        let agents: AgentListResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;

        Ok(agents
            .value
            .into_iter()
            .map(|a| AzdoAgent {
                id: a.id,
                name: a.name,
                status: normalize_status(&a.status),
                last_active: a.assigned_request.and_then(|r| r.finish_time),
            })
            .collect())
    }

    pub async fn list_job_requests(&self, pool_id: i64) -> EngineResult<Vec<JobRequest>> {
        let resp = self
            .get(&format!(
                "/_apis/distributedtask/pools/{pool_id}/jobrequests?api-version={API_VERSION}"
            ))
            .await?;
        let jobs: JobRequestListResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;

        Ok(jobs
            .value
            .into_iter()
            .map(|j| JobRequest {
                request_id: j.request_id.to_string(),
                agent_id: j.reserved_agent.map(|a| a.id),
                result: j.result,
                demands: j.demands.unwrap_or_default(),
            })
            .collect())
    }

    pub async fn count_queued_jobs(&self, pool_id: i64) -> EngineResult<i32> {
        Ok(self
            .list_job_requests(pool_id)
            .await?
            .iter()
            .filter(|j| j.is_queued())
            .count() as i32)
    }

    pub async fn unregister_agent(&self, pool_id: i64, agent_name: &str) -> EngineResult<()> {
        let agents = self.list_agents(pool_id).await?;
        let Some(agent) = agents.iter().find(|a| a.name == agent_name) else {
            return Ok(()); // already gone: idempotent success
        };

        let resp = self
            .client
            .delete(self.url(&format!(
                "/_apis/distributedtask/pools/{pool_id}/agents/{}?api-version={API_VERSION}",
                agent.id
            )))
            .basic_auth("", Some(&self.pat))
            .send()
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;

        match classify_response(resp).await {
            Ok(_) | Err(EngineError::NotFound(_)) => Ok(()),
            Err(other) => Err(other),
        }
    }
}

fn normalize_status(raw: &str) -> AgentStatus {
    if raw.eq_ignore_ascii_case("online") {
        AgentStatus::Online
    } else {
        AgentStatus::Offline
    }
}

async fn classify_response(resp: reqwest::Response) -> EngineResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(EngineError::NotFound(status.to_string()));
    }
    if status == StatusCode::CONFLICT {
        return Err(EngineError::Conflict(status.to_string()));
    }
    if status.is_client_error() {
        return Err(EngineError::Permanent(status.to_string()));
    }
    Err(EngineError::Transient(status.to_string()))
}

/// Derives a display name for the organization from the AzDo URL's
/// hostname or, for self-hosted (TFS-style) installations, from the
/// first non-empty path segment (skipping a leading `tfs`).
pub fn extract_organization_name(azdo_url: &str) -> String {
    let Ok(url) = reqwest::Url::parse(azdo_url) else {
        return azdo_url.to_string();
    };

    if let Some(host) = url.host_str() {
        if host.eq_ignore_ascii_case("dev.azure.com") {
            if let Some(org) = url.path_segments().and_then(|mut s| s.next()) {
                if !org.is_empty() {
                    return org.to_string();
                }
            }
        }
        if let Some(org) = host.strip_suffix(".visualstudio.com") {
            if !org.is_empty() {
                return org.to_string();
            }
        }
    }

    url.path_segments()
        .into_iter()
        .flatten()
        .find(|seg| !seg.is_empty() && !seg.eq_ignore_ascii_case("tfs"))
        .unwrap_or(url.host_str().unwrap_or(azdo_url))
        .to_string()
}
