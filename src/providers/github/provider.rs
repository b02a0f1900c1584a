use async_trait::async_trait;
use base64::Engine;
use log::{debug, info};
use reqwest::Method;

use crate::auth::Token;
use crate::error::{E2eError, Result};
use crate::model::{Job, MergeRequest, MergeStatus, Pipeline};
use crate::providers::{PipelineFilter, PipelineSource, ScmProvider};

use super::client::GitHubClient;
use super::types::{
    ContentCommitResponse, ContentResponse, CreatePullRequest, CreateRefRequest, GitHubWorkflowRun,
    GitRef, PullRequest, PutContentRequest, VariableRequest, WorkflowJobsResponse,
    WorkflowRunsResponse,
};

/// GitHub repository acting as SCM provider, with GitHub Actions as its CI
/// backend. Workflow runs are exposed as pipelines.
pub struct GitHubProvider {
    /// GitHub API client
    pub(super) client: GitHubClient,
    /// Repository owner
    pub(super) owner: String,
    /// Repository name
    pub(super) repo: String,
}

impl GitHubProvider {
    /// Create a new GitHub provider.
    ///
    /// # Arguments
    ///
    /// * `base_url` - GitHub API base URL
    /// * `repo_path` - Repository path in format "owner/repo"
    /// * `token` - Optional GitHub personal access token
    pub fn new(base_url: &str, repo_path: &str, token: Option<Token>) -> Result<Self> {
        let parts: Vec<&str> = repo_path.split('/').collect();
        let [owner, repo] = parts.as_slice() else {
            return Err(E2eError::Config(format!(
                "Repository path must be in format 'owner/repo', got '{repo_path}'"
            )));
        };

        let owner = (*owner).to_string();
        let repo = (*repo).to_string();
        let client = GitHubClient::new(base_url, owner.clone(), repo.clone(), token)?;

        Ok(Self {
            client,
            owner,
            repo,
        })
    }

    async fn put_content(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<String>,
    ) -> Result<String> {
        let request = PutContentRequest {
            message,
            content: base64::engine::general_purpose::STANDARD.encode(content),
            branch,
            sha,
        };

        let response: ContentCommitResponse = self
            .client
            .send(Method::PUT, self.client.repo_url(&format!("contents/{path}"))?, &request)
            .await?;

        info!(
            "Committed {path} to {branch} in {}/{} ({})",
            self.owner, self.repo, response.commit.sha
        );
        Ok(response.commit.sha)
    }
}

#[async_trait]
impl PipelineSource for GitHubProvider {
    fn name(&self) -> &'static str {
        "GitHub Actions"
    }

    async fn list_pipelines(&self, filter: &PipelineFilter) -> Result<Vec<Pipeline>> {
        let mut url = self.client.repo_url("actions/runs")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("per_page", "100");
            if let Some(branch) = &filter.ref_ {
                query.append_pair("branch", branch);
            }
            if let Some(sha) = &filter.sha {
                query.append_pair("head_sha", sha);
            }
        }

        let response: WorkflowRunsResponse = self.client.get(url).await?;
        debug!(
            "Listed {} workflow runs in {}/{}",
            response.workflow_runs.len(),
            self.owner,
            self.repo
        );

        Ok(response
            .workflow_runs
            .into_iter()
            .map(Pipeline::from)
            .filter(|pipeline| filter.matches(pipeline))
            .collect())
    }

    async fn get_pipeline(&self, id: u64) -> Result<Pipeline> {
        let run: GitHubWorkflowRun = self
            .client
            .get(self.client.repo_url(&format!("actions/runs/{id}"))?)
            .await?;
        Ok(run.into())
    }

    async fn cancel_pipeline(&self, id: u64) -> Result<()> {
        self.client
            .send_empty::<()>(
                Method::POST,
                self.client.repo_url(&format!("actions/runs/{id}/cancel"))?,
                None,
            )
            .await
    }

    async fn list_jobs(&self, pipeline_id: u64) -> Result<Vec<Job>> {
        let response: WorkflowJobsResponse = self
            .client
            .get(self.client.repo_url(&format!("actions/runs/{pipeline_id}/jobs"))?)
            .await?;
        Ok(response.jobs.into_iter().map(Job::from).collect())
    }

    async fn get_job_log(&self, job_id: u64) -> Result<String> {
        self.client
            .get_text(self.client.repo_url(&format!("actions/jobs/{job_id}/logs"))?)
            .await
    }
}

#[async_trait]
impl ScmProvider for GitHubProvider {
    async fn create_branch(&self, branch: &str, from_ref: &str) -> Result<()> {
        let base: GitRef = self
            .client
            .get(self.client.repo_url(&format!("git/ref/heads/{from_ref}"))?)
            .await?;

        let request = CreateRefRequest {
            ref_: format!("refs/heads/{branch}"),
            sha: base.object.sha,
        };
        self.client
            .send_empty(Method::POST, self.client.repo_url("git/refs")?, Some(&request))
            .await?;

        info!("Created branch {branch} from {from_ref} in {}/{}", self.owner, self.repo);
        Ok(())
    }

    async fn create_commit(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<String> {
        self.put_content(branch, path, content, message, None).await
    }

    async fn edit_file(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<String> {
        let mut url = self.client.repo_url(&format!("contents/{path}"))?;
        url.query_pairs_mut().append_pair("ref", branch);
        let existing: ContentResponse = self.client.get(url).await?;

        self.put_content(branch, path, content, message, Some(existing.sha))
            .await
    }

    async fn get_file(&self, branch: &str, path: &str) -> Result<String> {
        let mut url = self.client.repo_url(&format!("contents/{path}"))?;
        url.query_pairs_mut().append_pair("ref", branch);
        self.client.get_text(url).await
    }

    async fn create_merge_request(
        &self,
        source_branch: &str,
        target_branch: &str,
        title: &str,
    ) -> Result<MergeRequest> {
        let request = CreatePullRequest {
            title,
            head: source_branch,
            base: target_branch,
        };

        let pull: PullRequest = self
            .client
            .send(Method::POST, self.client.repo_url("pulls")?, &request)
            .await?;

        info!(
            "Opened pull request #{} ({source_branch} -> {target_branch})",
            pull.number
        );
        Ok(pull.into())
    }

    async fn merge_merge_request(&self, id: u64) -> Result<()> {
        let body = serde_json::json!({ "merge_method": "merge" });
        self.client
            .send_empty(
                Method::PUT,
                self.client.repo_url(&format!("pulls/{id}/merge"))?,
                Some(&body),
            )
            .await?;
        info!("Merged pull request #{id} in {}/{}", self.owner, self.repo);
        Ok(())
    }

    async fn get_merge_request_status(&self, id: u64) -> Result<MergeStatus> {
        let pull: PullRequest = self
            .client
            .get(self.client.repo_url(&format!("pulls/{id}"))?)
            .await?;
        Ok(pull.merge_status())
    }

    async fn set_repo_variable(&self, key: &str, value: &str) -> Result<()> {
        let request = VariableRequest { name: key, value };

        let created = self
            .client
            .send_empty(
                Method::POST,
                self.client.repo_url("actions/variables")?,
                Some(&request),
            )
            .await;

        match created {
            Ok(()) => Ok(()),
            Err(E2eError::Api { status: 409, .. }) => {
                debug!("Variable {key} exists in {}/{}, updating it", self.owner, self.repo);
                self.client
                    .send_empty(
                        Method::PATCH,
                        self.client.repo_url(&format!("actions/variables/{key}"))?,
                        Some(&request),
                    )
                    .await
            }
            Err(e) => Err(e),
        }
    }
}
