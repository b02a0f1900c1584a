use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A manifest or log did not contain a line the caller depends on.
    /// Never retried.
    #[error("Pattern `{pattern}` not found")]
    PatternNotFound { pattern: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, E2eError>;

/// Turns a non-success HTTP response into `E2eError::Api`, passing successful
/// responses through untouched.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());

    Err(E2eError::Api {
        status: status.as_u16(),
        message,
    })
}
