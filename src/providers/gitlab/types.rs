//! Payloads of the GitLab REST API, converted into the shared model at the
//! provider boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Job, MergeRequest, MergeStatus, Pipeline, PipelineStatus};

#[derive(Debug, Deserialize)]
pub struct PipelineResponse {
    pub id: u64,
    #[serde(rename = "ref")]
    pub ref_: String,
    pub sha: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub web_url: Option<String>,
}

impl From<PipelineResponse> for Pipeline {
    fn from(response: PipelineResponse) -> Self {
        Self {
            id: response.id,
            ref_: response.ref_,
            sha: response.sha,
            status: PipelineStatus::from_gitlab(&response.status),
            created_at: response.created_at,
            web_url: response.web_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JobPipeline {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct JobResponse {
    pub id: u64,
    pub name: String,
    pub stage: Option<String>,
    pub status: String,
    pub pipeline: JobPipeline,
}

impl From<JobResponse> for Job {
    fn from(response: JobResponse) -> Self {
        Self {
            id: response.id,
            pipeline_id: response.pipeline.id,
            name: response.name,
            stage: response.stage,
            status: PipelineStatus::from_gitlab(&response.status),
            log: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MergeRequestResponse {
    pub iid: u64,
    pub source_branch: String,
    pub target_branch: String,
    #[serde(default)]
    pub merge_status: Option<String>,
    #[serde(default)]
    pub detailed_merge_status: Option<String>,
    pub web_url: Option<String>,
}

impl MergeRequestResponse {
    /// `detailed_merge_status` also reports conflicts, `merge_status` is the
    /// fallback for older GitLab versions.
    pub fn status(&self) -> MergeStatus {
        match self.detailed_merge_status.as_deref() {
            Some("mergeable") => MergeStatus::Mergeable,
            Some("conflict" | "broken_status") => MergeStatus::Conflict,
            _ => self
                .merge_status
                .as_deref()
                .map_or(MergeStatus::Checking, MergeStatus::from_gitlab),
        }
    }
}

impl From<MergeRequestResponse> for MergeRequest {
    fn from(response: MergeRequestResponse) -> Self {
        let merge_status = response.status();
        Self {
            id: response.iid,
            source_branch: response.source_branch,
            target_branch: response.target_branch,
            merge_status,
            web_url: response.web_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommitResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct CommitAction<'a> {
    pub action: &'static str,
    pub file_path: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CreateCommitRequest<'a> {
    pub branch: &'a str,
    pub commit_message: &'a str,
    pub actions: Vec<CommitAction<'a>>,
}

#[derive(Debug, Serialize)]
pub struct CreateMergeRequest<'a> {
    pub source_branch: &'a str,
    pub target_branch: &'a str,
    pub title: &'a str,
}

#[derive(Debug, Serialize)]
pub struct VariableRequest<'a> {
    pub key: &'a str,
    pub value: &'a str,
}
