use log::info;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::Token;
use crate::error::{check_status, E2eError, Result};
use crate::model::{PortalTask, PortalTaskStatus};
use crate::poll::{wait_for, PollPolicy};

/// What to scaffold: a template reference plus the form values it expects.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOptions {
    /// e.g. `template:default/go`
    pub template_ref: String,
    pub values: serde_json::Value,
}

#[derive(Deserialize)]
struct CreatedTask {
    id: String,
}

/// Client for the Developer Hub (Backstage) scaffolder API.
pub struct DeveloperHubClient {
    client: Client,
    tasks_url: Url,
    token: Option<Token>,
}

impl DeveloperHubClient {
    pub fn new(base_url: &str, token: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tssc-e2e/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| E2eError::Config(format!("Failed to create HTTP client: {e}")))?;

        let tasks_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .and_then(|url| url.join("api/scaffolder/v2/tasks"))
            .map_err(|e| E2eError::Config(format!("Invalid Developer Hub URL: {e}")))?;

        Ok(Self {
            client,
            tasks_url,
            token,
        })
    }

    fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.as_str()),
            None => request,
        }
    }

    fn task_url(&self, id: &str) -> Result<Url> {
        let mut url = self.tasks_url.clone();
        url.path_segments_mut()
            .map_err(|()| E2eError::Config(format!("Invalid task URL base {}", self.tasks_url)))?
            .push(id);
        Ok(url)
    }

    /// Starts a scaffolder task and returns its id.
    pub async fn create_task(&self, options: &TaskOptions) -> Result<String> {
        let response = self
            .auth_request(self.client.post(self.tasks_url.clone()).json(options))
            .send()
            .await?;
        let created: CreatedTask = check_status(response).await?.json().await?;

        info!(
            "Started scaffolder task {} from {}",
            created.id, options.template_ref
        );
        Ok(created.id)
    }

    pub async fn get_task_status(&self, id: &str) -> Result<PortalTask> {
        let response = self
            .auth_request(self.client.get(self.task_url(id)?))
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// Polls the task until the scaffolder reports a terminal state.
    pub async fn wait_for_task(&self, id: &str, policy: &PollPolicy) -> Option<PortalTask> {
        wait_for(policy, &format!("scaffolder task {id}"), move || async move {
            let task = self.get_task_status(id).await?;
            Ok::<_, E2eError>(task.status.is_terminal().then_some(task))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::time::Duration;

    fn client(server: &mockito::Server) -> DeveloperHubClient {
        DeveloperHubClient::new(&server.url(), Some(Token::from("rhdh-token"))).unwrap()
    }

    #[tokio::test]
    async fn create_task_posts_template_and_values() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/scaffolder/v2/tasks")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer rhdh-token")
            .match_body(Matcher::Json(serde_json::json!({
                "templateRef": "template:default/go",
                "values": {"name": "app-x1y2z"}
            })))
            .with_status(201)
            .with_body(r#"{"id":"6b8c1f0e-task"}"#)
            .create_async()
            .await;

        let id = client(&server)
            .create_task(&TaskOptions {
                template_ref: "template:default/go".into(),
                values: serde_json::json!({"name": "app-x1y2z"}),
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(id, "6b8c1f0e-task");
    }

    #[tokio::test]
    async fn get_task_status_reads_state() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/scaffolder/v2/tasks/6b8c1f0e-task")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"id":"6b8c1f0e-task","spec":{},"status":"failed","createdAt":"2024-05-01T10:00:00Z"}"#)
            .create_async()
            .await;

        let task = client(&server).get_task_status("6b8c1f0e-task").await.unwrap();
        assert_eq!(task.status, PortalTaskStatus::Failed);
    }

    #[tokio::test]
    async fn wait_for_task_returns_terminal_task() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/scaffolder/v2/tasks/done")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"id":"done","status":"completed"}"#)
            .create_async()
            .await;

        let policy = PollPolicy::bounded(Duration::from_millis(10), Duration::from_secs(5));
        let task = client(&server).wait_for_task("done", &policy).await;

        assert_eq!(task.map(|t| t.status), Some(PortalTaskStatus::Completed));
    }

    #[tokio::test]
    async fn wait_for_task_gives_up_on_open_task() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/scaffolder/v2/tasks/stuck")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"id":"stuck","status":"processing"}"#)
            .create_async()
            .await;

        let policy = PollPolicy::bounded(Duration::from_millis(20), Duration::from_millis(100));
        let task = client(&server).wait_for_task("stuck", &policy).await;

        assert_eq!(task, None);
    }
}
