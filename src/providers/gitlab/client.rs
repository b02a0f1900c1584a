use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::auth::Token;
use crate::error::{check_status, E2eError, Result};

/// Thin wrapper over GitLab's REST v4 API.
pub struct GitLabClient {
    client: Client,
    api_url: Url,
    token: Option<Token>,
}

impl GitLabClient {
    pub fn new(base_url: &str, token: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tssc-e2e/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| E2eError::Config(format!("Failed to create HTTP client: {e}")))?;

        let api_url = Url::parse(base_url)
            .map_err(|e| E2eError::Config(format!("Invalid base URL: {e}")))?
            .join("api/v4/")
            .map_err(|e| E2eError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
        })
    }

    /// Helper to build authenticated requests
    pub fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    /// Construct project base URL
    pub fn project_url(&self, project_id: &str) -> Result<Url> {
        self.api_url
            .join(&format!("projects/{}/", urlencoding::encode(project_id)))
            .map_err(|e| E2eError::Config(format!("Invalid project URL: {e}")))
    }

    /// Resolves `path` relative to the project's API URL.
    pub fn endpoint(&self, project_id: &str, path: &str) -> Result<Url> {
        self.project_url(project_id)?
            .join(path)
            .map_err(|e| E2eError::Config(format!("Invalid endpoint `{path}`: {e}")))
    }

    pub async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.auth_request(self.client.get(url)).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    pub async fn get_text(&self, url: Url) -> Result<String> {
        let response = self.auth_request(self.client.get(url)).send().await?;
        Ok(check_status(response).await?.text().await?)
    }

    pub async fn send<T, B>(&self, method: Method, url: Url, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .auth_request(self.client.request(method, url).json(body))
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// Sends a request without body and discards the response payload.
    pub async fn send_empty(&self, method: Method, url: Url) -> Result<()> {
        let response = self
            .auth_request(self.client.request(method, url))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}
