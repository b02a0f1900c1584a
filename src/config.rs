use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::poll::PollPolicy;

/// Configuration file structure for tssc-e2e.
///
/// Loaded once at startup and handed to each component by reference.
/// Nothing reads configuration from ambient state after that.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub gitlab: GitLabConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub jenkins: JenkinsConfig,

    #[serde(default)]
    pub kubernetes: KubernetesConfig,

    #[serde(default)]
    pub developer_hub: DeveloperHubConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub verification: VerificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitLabConfig {
    /// GitLab personal access token
    pub token: Option<String>,

    /// GitLab instance base URL
    #[serde(default = "default_gitlab_base_url")]
    pub base_url: String,

    /// Project path of the generated source repository (e.g., 'group/project')
    pub project_path: Option<String>,

    /// Project path of the matching GitOps repository
    pub gitops_project_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitHubConfig {
    /// GitHub personal access token
    pub token: Option<String>,

    /// GitHub API base URL
    #[serde(default = "default_github_base_url")]
    pub base_url: String,

    /// GitHub repository path (e.g., 'owner/repo')
    pub repo_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JenkinsConfig {
    /// Jenkins controller URL
    pub url: Option<String>,

    pub username: Option<String>,

    /// Jenkins API token
    pub token: Option<String>,

    /// Job path, folders separated by '/' (e.g., 'team/my-app')
    pub job: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KubernetesConfig {
    /// Namespace where PipelineRuns and TaskRuns are created
    #[serde(default = "default_pipelines_namespace")]
    pub namespace: String,

    /// Namespace holding Argo CD Application objects
    #[serde(default = "default_argocd_namespace")]
    pub argocd_namespace: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeveloperHubConfig {
    /// Developer Hub (Backstage) base URL
    pub url: Option<String>,

    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PollingConfig {
    /// Seconds between two checks
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound when waiting for something to be created; 0 waits forever
    #[serde(default)]
    pub creation_timeout_secs: u64,

    /// Upper bound when waiting for something to finish; 0 waits forever
    #[serde(default = "default_completion_timeout_secs")]
    pub completion_timeout_secs: u64,

    /// Random extra delay added to each sleep, in milliseconds
    #[serde(default)]
    pub jitter_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VerificationConfig {
    /// Extra or overriding `task name -> command pattern` entries
    #[serde(default)]
    pub required_commands: IndexMap<String, String>,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_gitlab_base_url(),
            project_path: None,
            gitops_project_path: None,
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_github_base_url(),
            repo_path: None,
        }
    }
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            namespace: default_pipelines_namespace(),
            argocd_namespace: default_argocd_namespace(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            creation_timeout_secs: 0,
            completion_timeout_secs: default_completion_timeout_secs(),
            jitter_ms: 0,
        }
    }
}

impl PollingConfig {
    /// Policy for waiting on something to appear (a pipeline, a run).
    pub fn creation_policy(&self) -> PollPolicy {
        self.policy(self.creation_timeout_secs)
    }

    /// Policy for waiting on something to reach a terminal state.
    pub fn completion_policy(&self) -> PollPolicy {
        self.policy(self.completion_timeout_secs)
    }

    fn policy(&self, timeout_secs: u64) -> PollPolicy {
        let interval = Duration::from_secs(self.interval_secs);
        let policy = match timeout_secs {
            0 => PollPolicy::forever(interval),
            secs => PollPolicy::bounded(interval, Duration::from_secs(secs)),
        };
        policy.with_jitter(Duration::from_millis(self.jitter_ms))
    }
}

fn default_gitlab_base_url() -> String {
    "https://gitlab.com".to_string()
}

fn default_github_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_pipelines_namespace() -> String {
    "tssc-app-ci".to_string()
}

fn default_argocd_namespace() -> String {
    "tssc-gitops".to_string()
}

fn default_interval_secs() -> u64 {
    10
}

fn default_completion_timeout_secs() -> u64 {
    1800
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./tssc-e2e.toml
    /// 3. ./tssc-e2e.json
    /// 4. ./tssc-e2e.yaml
    /// 5. ./tssc-e2e.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            if !path.exists() {
                return Ok(Self::default());
            }
            return Self::load_from_path(path);
        }

        let candidates = [
            "tssc-e2e.toml",
            "tssc-e2e.json",
            "tssc-e2e.yaml",
            "tssc-e2e.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .map_err(anyhow::Error::from)
                .or_else(|_| serde_json::from_str(&contents).map_err(anyhow::Error::from))
                .or_else(|_| serde_yaml::from_str(&contents).map_err(anyhow::Error::from))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}
