use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::Token;
use crate::error::{check_status, E2eError, Result};
use crate::model::{Job, Pipeline};
use crate::providers::{PipelineFilter, PipelineSource};

use super::types::{BuildsResponse, JenkinsBuild, RunDescription, BUILD_TREE};

/// Jenkins JSON API client bound to a single job. Builds are exposed as
/// pipelines and Pipeline stages as jobs.
pub struct JenkinsClient {
    client: Client,
    job_url: Url,
    username: Option<String>,
    token: Option<Token>,
}

impl JenkinsClient {
    /// Create a client for `job`, a job path whose folders are separated by
    /// `/` (e.g. `team/my-app`).
    pub fn new(
        base_url: &str,
        job: &str,
        username: Option<String>,
        token: Option<Token>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tssc-e2e/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| E2eError::Config(format!("Failed to create HTTP client: {e}")))?;

        let job_path: String = job
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| format!("job/{}/", urlencoding::encode(segment)))
            .collect();
        if job_path.is_empty() {
            return Err(E2eError::Config("Jenkins job path is empty".into()));
        }

        let base = format!("{}/", base_url.trim_end_matches('/'));
        let job_url = Url::parse(&base)
            .and_then(|url| url.join(&job_path))
            .map_err(|e| E2eError::Config(format!("Invalid Jenkins URL: {e}")))?;

        Ok(Self {
            client,
            job_url,
            username,
            token,
        })
    }

    fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        match (&self.username, &self.token) {
            (Some(username), Some(token)) => request.basic_auth(username, Some(token.as_str())),
            _ => request,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.job_url
            .join(path)
            .map_err(|e| E2eError::Config(format!("Invalid endpoint `{path}`: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.auth_request(self.client.get(url)).send().await?;
        Ok(check_status(response).await?.json().await?)
    }
}

#[async_trait]
impl PipelineSource for JenkinsClient {
    fn name(&self) -> &'static str {
        "Jenkins"
    }

    async fn list_pipelines(&self, filter: &PipelineFilter) -> Result<Vec<Pipeline>> {
        let mut url = self.endpoint("api/json")?;
        url.query_pairs_mut()
            .append_pair("tree", &format!("builds[{BUILD_TREE}]"));

        let response: BuildsResponse = self.get(url).await?;
        debug!("Listed {} builds of {}", response.builds.len(), self.job_url);

        Ok(response
            .builds
            .into_iter()
            .map(Pipeline::from)
            .filter(|pipeline| filter.matches(pipeline))
            .collect())
    }

    async fn get_pipeline(&self, id: u64) -> Result<Pipeline> {
        let mut url = self.endpoint(&format!("{id}/api/json"))?;
        url.query_pairs_mut().append_pair("tree", BUILD_TREE);

        let build: JenkinsBuild = self.get(url).await.map_err(|e| match e {
            E2eError::Api { status: 404, .. } => {
                E2eError::NotFound(format!("build #{id} of {}", self.job_url))
            }
            other => other,
        })?;
        Ok(build.into())
    }

    async fn cancel_pipeline(&self, id: u64) -> Result<()> {
        let url = self.endpoint(&format!("{id}/stop"))?;
        let response = self.auth_request(self.client.post(url)).send().await?;
        check_status(response).await?;
        info!("Stopped build #{id} of {}", self.job_url);
        Ok(())
    }

    async fn list_jobs(&self, pipeline_id: u64) -> Result<Vec<Job>> {
        let description: RunDescription = self
            .get(self.endpoint(&format!("{pipeline_id}/wfapi/describe"))?)
            .await?;

        Ok(description
            .stages
            .into_iter()
            .map(|stage| stage.into_job(pipeline_id))
            .collect())
    }

    /// Jenkins has one console per build, so `job_id` is a build number.
    async fn get_job_log(&self, job_id: u64) -> Result<String> {
        let url = self.endpoint(&format!("{job_id}/consoleText"))?;
        let response = self.auth_request(self.client.get(url)).send().await?;
        Ok(check_status(response).await?.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PipelineStatus;
    use mockito::Matcher;

    fn client(server: &mockito::Server) -> JenkinsClient {
        JenkinsClient::new(
            &server.url(),
            "team/app",
            Some("admin".into()),
            Some(Token::from("api-token")),
        )
        .unwrap()
    }

    #[test]
    fn folders_become_nested_job_segments() {
        let client = JenkinsClient::new("https://jenkins.example.com/", "team/app", None, None)
            .unwrap();

        assert_eq!(
            client.endpoint("12/consoleText").unwrap().as_str(),
            "https://jenkins.example.com/job/team/job/app/12/consoleText"
        );
    }

    #[test]
    fn empty_job_path_is_rejected() {
        let result = JenkinsClient::new("https://jenkins.example.com", "/", None, None);
        assert!(matches!(result, Err(E2eError::Config(_))));
    }

    #[tokio::test]
    async fn list_pipelines_filters_by_branch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/job/team/job/app/api/json")
            .match_query(Matcher::Any)
            .match_header("authorization", Matcher::Regex("^Basic ".into()))
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "builds": [
                        {
                            "number": 2, "result": null, "building": true, "timestamp": 0,
                            "actions": [{"lastBuiltRevision": {"SHA1": "bbb", "branch": [{"name": "origin/main"}]}}]
                        },
                        {
                            "number": 1, "result": "SUCCESS", "building": false, "timestamp": 0,
                            "actions": [{"lastBuiltRevision": {"SHA1": "aaa", "branch": [{"name": "origin/dev"}]}}]
                        }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let builds = client(&server)
            .list_pipelines(&PipelineFilter::by_ref("main"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(builds.len(), 1);
        assert_eq!(builds[0].id, 2);
        assert_eq!(builds[0].status, PipelineStatus::Running);
    }

    #[tokio::test]
    async fn job_log_is_console_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/team/job/app/7/consoleText")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("+ cosign sign --key k8s://ns/key\nFinished: SUCCESS\n")
            .create_async()
            .await;

        let log = client(&server).get_job_log(7).await.unwrap();
        assert!(log.contains("cosign sign"));
    }

    #[tokio::test]
    async fn stages_are_listed_as_jobs() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/team/job/app/7/wfapi/describe")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"id":"7","stages":[
                    {"id":"6","name":"build-container","status":"SUCCESS"},
                    {"id":"14","name":"acs-image-check","status":"IN_PROGRESS"}
                ]}"#,
            )
            .create_async()
            .await;

        let jobs = client(&server).list_jobs(7).await.unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].name, "acs-image-check");
        assert_eq!(jobs[1].status, PipelineStatus::Running);
    }

    #[tokio::test]
    async fn unknown_build_number_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/team/job/app/99/api/json")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let result = client(&server).get_pipeline(99).await;
        assert!(matches!(result, Err(E2eError::NotFound(_))));
    }

    #[tokio::test]
    async fn missing_build_is_an_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/job/team/job/app/99/stop")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let result = client(&server).cancel_pipeline(99).await;
        assert!(matches!(result, Err(E2eError::Api { status: 404, .. })));
    }
}
