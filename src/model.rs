use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a CI pipeline, normalized across backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Created,
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
    Manual,
    Unknown,
}

impl PipelineStatus {
    /// A pipeline in a terminal state will not change anymore. `Skipped` and
    /// `Manual` are not terminal: both can still be started.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }

    /// Maps the status strings used by GitLab (and, lowercased, by most
    /// other backends) onto `PipelineStatus`.
    pub fn from_gitlab(status: &str) -> Self {
        match status {
            "created" => Self::Created,
            "waiting_for_resource" | "preparing" | "pending" | "scheduled" => Self::Pending,
            // `canceling` pipelines still have jobs shutting down
            "running" | "canceling" => Self::Running,
            "success" => Self::Success,
            "failed" => Self::Failed,
            "canceled" => Self::Canceled,
            "skipped" => Self::Skipped,
            "manual" => Self::Manual,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Created => "created",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Skipped => "skipped",
            Self::Manual => "manual",
            Self::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

/// Snapshot of a pipeline as reported by the CI backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    #[serde(rename = "ref")]
    pub ref_: String,
    pub sha: String,
    pub status: PipelineStatus,
    pub created_at: DateTime<Utc>,
    pub web_url: Option<String>,
}

/// A job (GitLab job, GitHub Actions job, Jenkins stage) inside a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub pipeline_id: u64,
    pub name: String,
    pub stage: Option<String>,
    pub status: PipelineStatus,
    /// Filled in lazily from the backend's log endpoint
    pub log: Option<String>,
}

/// Summary of a Tekton PipelineRun.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub name: String,
    pub namespace: String,
    pub status: PipelineStatus,
    pub created_at: Option<DateTime<Utc>>,
}

/// A step of a Tekton TaskRun as declared in its resolved task spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub script: Option<String>,
    pub command: Vec<String>,
    pub args: Vec<String>,
}

/// Snapshot of a Tekton TaskRun.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub name: String,
    /// Value of the `tekton.dev/pipelineTask` label
    pub pipeline_task: Option<String>,
    /// Pod the task was scheduled on; `None` means it never ran
    pub pod_name: Option<String>,
    pub status: PipelineStatus,
    pub steps: Vec<Step>,
}

impl TaskRun {
    /// All step scripts, commands and arguments joined by newlines.
    pub fn step_text(&self) -> String {
        self.steps
            .iter()
            .flat_map(|step| {
                step.script
                    .iter()
                    .cloned()
                    .chain(std::iter::once(step.command.join(" ")))
                    .chain(std::iter::once(step.args.join(" ")))
            })
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Whether a merge request can be merged right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    Mergeable,
    Conflict,
    Checking,
}

impl MergeStatus {
    pub fn from_gitlab(status: &str) -> Self {
        match status {
            "can_be_merged" | "mergeable" => Self::Mergeable,
            "cannot_be_merged" | "conflict" | "broken_status" => Self::Conflict,
            _ => Self::Checking,
        }
    }
}

/// A merge request (GitLab) or pull request (GitHub).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRequest {
    /// Project-scoped number (GitLab iid, GitHub PR number)
    pub id: u64,
    pub source_branch: String,
    pub target_branch: String,
    pub merge_status: MergeStatus,
    pub web_url: Option<String>,
}

/// State of a Developer Hub scaffolder task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortalTaskStatus {
    Open,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl PortalTaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// A scaffolder task started from a software template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalTask {
    pub id: String,
    pub status: PortalTaskStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_are_exactly_success_failed_canceled() {
        let terminal: Vec<_> = [
            PipelineStatus::Created,
            PipelineStatus::Pending,
            PipelineStatus::Running,
            PipelineStatus::Success,
            PipelineStatus::Failed,
            PipelineStatus::Canceled,
            PipelineStatus::Skipped,
            PipelineStatus::Manual,
            PipelineStatus::Unknown,
        ]
        .into_iter()
        .filter(|s| s.is_terminal())
        .collect();

        assert_eq!(
            terminal,
            vec![
                PipelineStatus::Success,
                PipelineStatus::Failed,
                PipelineStatus::Canceled
            ]
        );
    }

    #[test]
    fn gitlab_statuses_map_to_normalized_ones() {
        assert_eq!(PipelineStatus::from_gitlab("running"), PipelineStatus::Running);
        assert_eq!(
            PipelineStatus::from_gitlab("waiting_for_resource"),
            PipelineStatus::Pending
        );
        assert_eq!(PipelineStatus::from_gitlab("canceled"), PipelineStatus::Canceled);
        assert_eq!(PipelineStatus::from_gitlab("canceling"), PipelineStatus::Running);
        assert!(!PipelineStatus::from_gitlab("canceling").is_terminal());
        assert_eq!(PipelineStatus::from_gitlab("weird"), PipelineStatus::Unknown);
    }

    #[test]
    fn portal_task_terminal_states() {
        assert!(!PortalTaskStatus::Open.is_terminal());
        assert!(!PortalTaskStatus::Processing.is_terminal());
        assert!(PortalTaskStatus::Completed.is_terminal());
        assert!(PortalTaskStatus::Cancelled.is_terminal());

        let status: PortalTaskStatus = serde_json::from_str("\"processing\"").unwrap();
        assert_eq!(status, PortalTaskStatus::Processing);
    }

    #[test]
    fn merge_status_from_gitlab() {
        assert_eq!(MergeStatus::from_gitlab("can_be_merged"), MergeStatus::Mergeable);
        assert_eq!(MergeStatus::from_gitlab("cannot_be_merged"), MergeStatus::Conflict);
        assert_eq!(MergeStatus::from_gitlab("unchecked"), MergeStatus::Checking);
        assert_eq!(
            MergeStatus::from_gitlab("cannot_be_merged_recheck"),
            MergeStatus::Checking
        );
    }

    #[test]
    fn step_text_joins_scripts_commands_and_args() {
        let run = TaskRun {
            name: "app-on-push-build-container".into(),
            pipeline_task: Some("build-container".into()),
            pod_name: Some("app-on-push-build-container-pod".into()),
            status: PipelineStatus::Success,
            steps: vec![
                Step {
                    name: "build".into(),
                    script: Some("buildah bud -t $IMAGE .".into()),
                    ..Step::default()
                },
                Step {
                    name: "sign".into(),
                    script: None,
                    command: vec!["cosign".into(), "sign".into()],
                    args: vec!["--key".into(), "k8s://ns/key".into()],
                },
            ],
        };

        let text = run.step_text();
        assert_eq!(
            text,
            "buildah bud -t $IMAGE .\ncosign sign\n--key k8s://ns/key"
        );
    }
}
