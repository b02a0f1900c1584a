use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::auth::Token;
use crate::error::{check_status, E2eError, Result};

const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";

/// GitHub REST API client scoped to one repository.
#[derive(Clone)]
pub struct GitHubClient {
    /// HTTP client
    client: reqwest::Client,
    /// Base URL for GitHub API
    base_url: String,
    /// Repository owner
    owner: String,
    /// Repository name
    repo: String,
}

impl GitHubClient {
    /// Create a new GitHub API client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - GitHub API base URL (e.g., "https://api.github.com")
    /// * `owner` - Repository owner/organization
    /// * `repo` - Repository name
    /// * `token` - Optional GitHub personal access token
    pub fn new(base_url: &str, owner: String, repo: String, token: Option<Token>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("tssc-e2e"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
                .map_err(|e| E2eError::Config(format!("Invalid GitHub token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| E2eError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            owner,
            repo,
        })
    }

    /// URL of `path` below `/repos/{owner}/{repo}/`.
    pub fn repo_url(&self, path: &str) -> Result<Url> {
        let url = format!("{}/repos/{}/{}/{path}", self.base_url, self.owner, self.repo);
        Url::parse(&url).map_err(|e| E2eError::Config(format!("Invalid GitHub URL {url}: {e}")))
    }

    pub async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.client.get(url).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// Fetches a body as text, asking for the raw media type so file
    /// contents come back undecoded.
    pub async fn get_text(&self, url: Url) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, RAW_MEDIA_TYPE)
            .send()
            .await?;
        Ok(check_status(response).await?.text().await?)
    }

    pub async fn send<T, B>(&self, method: Method, url: Url, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.client.request(method, url).json(body).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// Sends a request and ignores the response body (GitHub often answers
    /// 202/204 without one).
    pub async fn send_empty<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<()> {
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        check_status(request.send().await?).await?;
        Ok(())
    }
}
