use async_trait::async_trait;
use log::{debug, info};
use reqwest::Method;

use crate::auth::Token;
use crate::error::{E2eError, Result};
use crate::model::{Job, MergeRequest, MergeStatus, Pipeline};
use crate::poll::{wait_for, PollPolicy};
use crate::providers::{PipelineFilter, PipelineSource, ScmProvider};

use super::client::GitLabClient;
use super::types::{
    CommitAction, CommitResponse, CreateCommitRequest, CreateMergeRequest, JobResponse,
    MergeRequestResponse, PipelineResponse, VariableRequest,
};

const PAGE_SIZE: &str = "100";

/// GitLab project acting as both SCM provider and CI backend (GitLab CI).
pub struct GitLabProvider {
    pub client: GitLabClient,
    pub project_path: String,
}

impl GitLabProvider {
    /// Creates a new GitLab provider for the specified project.
    ///
    /// # Arguments
    ///
    /// * `base_url` - GitLab instance base URL (e.g., <https://gitlab.com>)
    /// * `project_path` - Project path (e.g., "group/project")
    /// * `token` - Optional authentication token
    ///
    /// # Errors
    ///
    /// Returns an error if the REST endpoint URL cannot be constructed.
    pub fn new(base_url: &str, project_path: String, token: Option<Token>) -> Result<Self> {
        let client = GitLabClient::new(base_url, token)?;

        Ok(Self {
            client,
            project_path,
        })
    }

    fn endpoint(&self, path: &str) -> Result<url::Url> {
        self.client.endpoint(&self.project_path, path)
    }

    async fn commit(
        &self,
        action: &'static str,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<String> {
        let request = CreateCommitRequest {
            branch,
            commit_message: message,
            actions: vec![CommitAction {
                action,
                file_path: path,
                content,
            }],
        };

        let commit: CommitResponse = self
            .client
            .send(Method::POST, self.endpoint("repository/commits")?, &request)
            .await?;

        info!("Committed {path} to {branch} in {} ({})", self.project_path, commit.id);
        Ok(commit.id)
    }

    /// Polls a merge request until GitLab has finished computing whether it
    /// can be merged. Returns the first conclusive status.
    pub async fn wait_for_mergeable(&self, iid: u64, policy: &PollPolicy) -> Option<MergeStatus> {
        let description = format!("merge request !{iid} in {}", self.project_path);

        wait_for(policy, &description, move || async move {
            match self.get_merge_request_status(iid).await? {
                MergeStatus::Checking => Ok::<_, E2eError>(None),
                status => Ok(Some(status)),
            }
        })
        .await
    }

    /// Fetches the jobs of a pipeline together with their logs.
    pub async fn list_jobs_with_logs(&self, pipeline_id: u64) -> Result<Vec<Job>> {
        let mut jobs = self.list_jobs(pipeline_id).await?;
        for job in &mut jobs {
            job.log = Some(self.get_job_log(job.id).await?);
        }
        Ok(jobs)
    }
}

#[async_trait]
impl PipelineSource for GitLabProvider {
    fn name(&self) -> &'static str {
        "GitLab"
    }

    async fn list_pipelines(&self, filter: &PipelineFilter) -> Result<Vec<Pipeline>> {
        let mut url = self.endpoint("pipelines")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("per_page", PAGE_SIZE)
                .append_pair("order_by", "id")
                .append_pair("sort", "desc");
            if let Some(ref_) = &filter.ref_ {
                query.append_pair("ref", ref_);
            }
            if let Some(sha) = &filter.sha {
                query.append_pair("sha", sha);
            }
        }

        let pipelines: Vec<PipelineResponse> = self.client.get(url).await?;
        debug!("Listed {} pipelines in {}", pipelines.len(), self.project_path);

        Ok(pipelines.into_iter().map(Pipeline::from).collect())
    }

    async fn get_pipeline(&self, id: u64) -> Result<Pipeline> {
        let pipeline: PipelineResponse = self
            .client
            .get(self.endpoint(&format!("pipelines/{id}"))?)
            .await?;
        Ok(pipeline.into())
    }

    async fn cancel_pipeline(&self, id: u64) -> Result<()> {
        self.client
            .send_empty(Method::POST, self.endpoint(&format!("pipelines/{id}/cancel"))?)
            .await
    }

    async fn list_jobs(&self, pipeline_id: u64) -> Result<Vec<Job>> {
        let mut url = self.endpoint(&format!("pipelines/{pipeline_id}/jobs"))?;
        url.query_pairs_mut().append_pair("per_page", PAGE_SIZE);

        let jobs: Vec<JobResponse> = self.client.get(url).await?;
        Ok(jobs.into_iter().map(Job::from).collect())
    }

    async fn get_job_log(&self, job_id: u64) -> Result<String> {
        self.client
            .get_text(self.endpoint(&format!("jobs/{job_id}/trace"))?)
            .await
    }
}

#[async_trait]
impl ScmProvider for GitLabProvider {
    async fn create_branch(&self, branch: &str, from_ref: &str) -> Result<()> {
        let mut url = self.endpoint("repository/branches")?;
        url.query_pairs_mut()
            .append_pair("branch", branch)
            .append_pair("ref", from_ref);

        self.client.send_empty(Method::POST, url).await?;
        info!("Created branch {branch} from {from_ref} in {}", self.project_path);
        Ok(())
    }

    async fn create_commit(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<String> {
        self.commit("create", branch, path, content, message).await
    }

    async fn edit_file(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<String> {
        self.commit("update", branch, path, content, message).await
    }

    async fn get_file(&self, branch: &str, path: &str) -> Result<String> {
        let mut url = self.endpoint(&format!(
            "repository/files/{}/raw",
            urlencoding::encode(path)
        ))?;
        url.query_pairs_mut().append_pair("ref", branch);

        self.client.get_text(url).await
    }

    async fn create_merge_request(
        &self,
        source_branch: &str,
        target_branch: &str,
        title: &str,
    ) -> Result<MergeRequest> {
        let request = CreateMergeRequest {
            source_branch,
            target_branch,
            title,
        };

        let merge_request: MergeRequestResponse = self
            .client
            .send(Method::POST, self.endpoint("merge_requests")?, &request)
            .await?;

        info!(
            "Opened merge request !{} ({source_branch} -> {target_branch})",
            merge_request.iid
        );
        Ok(merge_request.into())
    }

    async fn merge_merge_request(&self, id: u64) -> Result<()> {
        self.client
            .send_empty(Method::PUT, self.endpoint(&format!("merge_requests/{id}/merge"))?)
            .await?;
        info!("Merged merge request !{id} in {}", self.project_path);
        Ok(())
    }

    async fn get_merge_request_status(&self, id: u64) -> Result<MergeStatus> {
        let merge_request: MergeRequestResponse = self
            .client
            .get(self.endpoint(&format!("merge_requests/{id}"))?)
            .await?;
        Ok(merge_request.status())
    }

    async fn set_repo_variable(&self, key: &str, value: &str) -> Result<()> {
        let request = VariableRequest { key, value };

        let created: Result<serde_json::Value> = self
            .client
            .send(Method::POST, self.endpoint("variables")?, &request)
            .await;

        match created {
            Ok(_) => Ok(()),
            // GitLab answers 400 "has already been taken" for existing keys
            Err(E2eError::Api { status: 400, .. }) => {
                debug!("Variable {key} exists in {}, updating it", self.project_path);
                let _: serde_json::Value = self
                    .client
                    .send(
                        Method::PUT,
                        self.endpoint(&format!("variables/{}", urlencoding::encode(key)))?,
                        &request,
                    )
                    .await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
