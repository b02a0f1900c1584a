//! Thin clients for the systems the harness talks to.
//!
//! SCM providers and CI backends are reached through the two traits below so
//! that the resolver and the promotion flow do not care which one they drive.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Job, MergeRequest, MergeStatus, Pipeline};

pub mod developer_hub;
pub mod github;
pub mod gitlab;
pub mod jenkins;
pub mod tekton;

pub use developer_hub::DeveloperHubClient;
pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;
pub use jenkins::JenkinsClient;
pub use tekton::TektonClient;

/// Narrows a pipeline listing. Backends that cannot filter server-side on a
/// field filter client-side instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineFilter {
    pub ref_: Option<String>,
    pub sha: Option<String>,
}

impl PipelineFilter {
    pub fn by_ref(ref_: &str) -> Self {
        Self {
            ref_: Some(ref_.to_owned()),
            sha: None,
        }
    }

    pub fn by_ref_and_sha(ref_: &str, sha: &str) -> Self {
        Self {
            ref_: Some(ref_.to_owned()),
            sha: Some(sha.to_owned()),
        }
    }

    pub fn matches(&self, pipeline: &Pipeline) -> bool {
        self.ref_.as_deref().map_or(true, |r| r == pipeline.ref_)
            && self.sha.as_deref().map_or(true, |s| s == pipeline.sha)
    }
}

/// Read access to a CI backend's pipelines and jobs.
#[async_trait]
pub trait PipelineSource: Send + Sync {
    /// Short backend name used in log lines.
    fn name(&self) -> &'static str;

    async fn list_pipelines(&self, filter: &PipelineFilter) -> Result<Vec<Pipeline>>;

    async fn get_pipeline(&self, id: u64) -> Result<Pipeline>;

    async fn cancel_pipeline(&self, id: u64) -> Result<()>;

    async fn list_jobs(&self, pipeline_id: u64) -> Result<Vec<Job>>;

    async fn get_job_log(&self, job_id: u64) -> Result<String>;
}

/// Repository-level actions on an SCM provider.
#[async_trait]
pub trait ScmProvider: PipelineSource {
    async fn create_branch(&self, branch: &str, from_ref: &str) -> Result<()>;

    /// Adds a new file on `branch` and returns the commit sha.
    async fn create_commit(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<String>;

    /// Replaces an existing file on `branch` and returns the commit sha.
    async fn edit_file(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<String>;

    async fn get_file(&self, branch: &str, path: &str) -> Result<String>;

    async fn create_merge_request(
        &self,
        source_branch: &str,
        target_branch: &str,
        title: &str,
    ) -> Result<MergeRequest>;

    async fn merge_merge_request(&self, id: u64) -> Result<()>;

    async fn get_merge_request_status(&self, id: u64) -> Result<MergeStatus>;

    /// Creates or overwrites a CI variable on the repository.
    async fn set_repo_variable(&self, key: &str, value: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PipelineStatus;
    use chrono::Utc;

    fn pipeline(ref_: &str, sha: &str) -> Pipeline {
        Pipeline {
            id: 1,
            ref_: ref_.into(),
            sha: sha.into(),
            status: PipelineStatus::Running,
            created_at: Utc::now(),
            web_url: None,
        }
    }

    #[test]
    fn filter_matches_on_every_set_field() {
        let p = pipeline("main", "abc123");

        assert!(PipelineFilter::default().matches(&p));
        assert!(PipelineFilter::by_ref("main").matches(&p));
        assert!(PipelineFilter::by_ref_and_sha("main", "abc123").matches(&p));
        assert!(!PipelineFilter::by_ref_and_sha("main", "def456").matches(&p));
        assert!(!PipelineFilter::by_ref("develop").matches(&p));
    }
}
