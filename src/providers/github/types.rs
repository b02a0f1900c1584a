use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Job, MergeRequest, MergeStatus, Pipeline, PipelineStatus};

/// GitHub Actions workflow run.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubWorkflowRun {
    /// Unique identifier for the workflow run
    pub id: u64,
    /// Head branch or tag name
    pub head_branch: Option<String>,
    /// SHA of the head commit
    pub head_sha: String,
    /// Status of the run (queued, in_progress, completed, ...)
    pub status: Option<String>,
    /// Conclusion of the run (success, failure, etc.)
    pub conclusion: Option<String>,
    /// When the run was created
    pub created_at: DateTime<Utc>,
    pub html_url: Option<String>,
}

impl From<GitHubWorkflowRun> for Pipeline {
    fn from(run: GitHubWorkflowRun) -> Self {
        Self {
            id: run.id,
            ref_: run.head_branch.unwrap_or_default(),
            sha: run.head_sha,
            status: run_status(run.status.as_deref(), run.conclusion.as_deref()),
            created_at: run.created_at,
            web_url: run.html_url,
        }
    }
}

/// Job within a GitHub Actions workflow run.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubJob {
    pub id: u64,
    pub run_id: u64,
    pub name: String,
    pub status: Option<String>,
    pub conclusion: Option<String>,
}

impl From<GitHubJob> for Job {
    fn from(job: GitHubJob) -> Self {
        Self {
            id: job.id,
            pipeline_id: job.run_id,
            name: job.name,
            stage: None,
            status: actions_status(job.status.as_deref(), job.conclusion.as_deref()),
            log: None,
        }
    }
}

/// Folds GitHub's status/conclusion pair into one `PipelineStatus`.
pub fn actions_status(status: Option<&str>, conclusion: Option<&str>) -> PipelineStatus {
    match (status, conclusion) {
        (Some("completed"), Some("success" | "neutral")) => PipelineStatus::Success,
        (Some("completed"), Some("cancelled")) => PipelineStatus::Canceled,
        (Some("completed"), Some("skipped")) => PipelineStatus::Skipped,
        (Some("completed"), _) => PipelineStatus::Failed,
        (Some("in_progress"), _) => PipelineStatus::Running,
        (Some("queued" | "requested" | "waiting" | "pending"), _) => PipelineStatus::Pending,
        _ => PipelineStatus::Unknown,
    }
}

/// Like [`actions_status`], except that a skipped run is over for good and
/// counts as canceled. Skipped jobs stay `Skipped` so they read as never run.
pub fn run_status(status: Option<&str>, conclusion: Option<&str>) -> PipelineStatus {
    match actions_status(status, conclusion) {
        PipelineStatus::Skipped => PipelineStatus::Canceled,
        other => other,
    }
}

#[derive(Deserialize)]
pub struct WorkflowRunsResponse {
    pub workflow_runs: Vec<GitHubWorkflowRun>,
}

#[derive(Deserialize)]
pub struct WorkflowJobsResponse {
    pub jobs: Vec<GitHubJob>,
}

#[derive(Debug, Deserialize)]
pub struct BranchRef {
    #[serde(rename = "ref")]
    pub ref_: String,
}

#[derive(Debug, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub head: BranchRef,
    pub base: BranchRef,
    /// `null` while GitHub is still computing mergeability
    pub mergeable: Option<bool>,
    pub html_url: Option<String>,
}

impl PullRequest {
    pub fn merge_status(&self) -> MergeStatus {
        match self.mergeable {
            Some(true) => MergeStatus::Mergeable,
            Some(false) => MergeStatus::Conflict,
            None => MergeStatus::Checking,
        }
    }
}

impl From<PullRequest> for MergeRequest {
    fn from(pull: PullRequest) -> Self {
        let merge_status = pull.merge_status();
        Self {
            id: pull.number,
            source_branch: pull.head.ref_,
            target_branch: pull.base.ref_,
            merge_status,
            web_url: pull.html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GitObject {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub struct GitRef {
    pub object: GitObject,
}

#[derive(Debug, Deserialize)]
pub struct ContentResponse {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub struct ContentCommitResponse {
    pub commit: GitObject,
}

#[derive(Debug, Serialize)]
pub struct PutContentRequest<'a> {
    pub message: &'a str,
    /// Base64 encoded file content
    pub content: String,
    pub branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateRefRequest {
    #[serde(rename = "ref")]
    pub ref_: String,
    pub sha: String,
}

#[derive(Debug, Serialize)]
pub struct CreatePullRequest<'a> {
    pub title: &'a str,
    pub head: &'a str,
    pub base: &'a str,
}

#[derive(Debug, Serialize)]
pub struct VariableRequest<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_runs_use_conclusion() {
        assert_eq!(
            actions_status(Some("completed"), Some("success")),
            PipelineStatus::Success
        );
        assert_eq!(
            actions_status(Some("completed"), Some("cancelled")),
            PipelineStatus::Canceled
        );
        assert_eq!(
            actions_status(Some("completed"), Some("timed_out")),
            PipelineStatus::Failed
        );
    }

    #[test]
    fn skipped_runs_are_finished_but_skipped_jobs_never_ran() {
        let status = run_status(Some("completed"), Some("skipped"));
        assert_eq!(status, PipelineStatus::Canceled);
        assert!(status.is_terminal());

        assert_eq!(
            actions_status(Some("completed"), Some("skipped")),
            PipelineStatus::Skipped
        );
        assert_eq!(run_status(Some("in_progress"), None), PipelineStatus::Running);
    }

    #[test]
    fn active_runs_ignore_conclusion() {
        assert_eq!(actions_status(Some("in_progress"), None), PipelineStatus::Running);
        assert_eq!(actions_status(Some("queued"), None), PipelineStatus::Pending);
        assert_eq!(actions_status(None, None), PipelineStatus::Unknown);
    }

    #[test]
    fn pull_request_mergeability() {
        let json = r#"{
            "number": 4,
            "head": {"ref": "feature"},
            "base": {"ref": "main"},
            "mergeable": null,
            "html_url": "https://github.com/org/app/pull/4"
        }"#;
        let pull: PullRequest = serde_json::from_str(json).unwrap();
        assert_eq!(pull.merge_status(), MergeStatus::Checking);

        let merge_request = MergeRequest::from(pull);
        assert_eq!(merge_request.source_branch, "feature");
        assert_eq!(merge_request.target_branch, "main");
    }
}
