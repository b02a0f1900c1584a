use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{MergeRequest, MergeStatus, Pipeline, PipelineRun, PipelineStatus, PortalTask};
use crate::verify::{ExecutedTask, Mismatch};

/// Machine-readable outcome of one CLI check, printed as JSON.
#[derive(Debug, Serialize)]
pub struct Verdict {
    pub provider: String,
    pub check: String,
    /// Project, repository, job or application the check ran against
    pub target: String,
    pub passed: bool,
    pub message: String,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Pipeline>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_run: Option<PipelineRun>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<Mismatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_status: Option<MergeStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_request: Option<MergeRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portal_task: Option<PortalTask>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub name: String,
    pub task: Option<String>,
    pub scheduled: bool,
}

impl TaskSummary {
    pub fn of<T: ExecutedTask>(run: &T) -> Self {
        Self {
            name: run.display_name().to_owned(),
            task: run.label().map(ToOwned::to_owned),
            scheduled: run.was_scheduled(),
        }
    }
}

impl Verdict {
    pub fn new(provider: &str, check: &str, target: &str) -> Self {
        Self {
            provider: provider.to_owned(),
            check: check.to_owned(),
            target: target.to_owned(),
            passed: false,
            message: String::new(),
            checked_at: Utc::now(),
            pipeline: None,
            pipeline_run: None,
            tasks: Vec::new(),
            mismatches: Vec::new(),
            commit_sha: None,
            merge_status: None,
            merge_request: None,
            portal_task: None,
        }
    }

    pub fn pass(mut self, message: impl Into<String>) -> Self {
        self.passed = true;
        self.message = message.into();
        self
    }

    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.passed = false;
        self.message = message.into();
        self
    }

    /// Passes when the pipeline finished successfully, fails otherwise
    /// (including when the wait ran out of time).
    pub fn with_pipeline_result(self, pipeline: Option<Pipeline>, what: &str) -> Self {
        match pipeline {
            Some(p) if p.status == PipelineStatus::Success => {
                let message = format!("{what} {} succeeded", p.id);
                Self {
                    pipeline: Some(p),
                    ..self
                }
                .pass(message)
            }
            Some(p) => {
                let message = format!("{what} {} finished as {}", p.id, p.status);
                Self {
                    pipeline: Some(p),
                    ..self
                }
                .fail(message)
            }
            None => self.fail(format!("timed out waiting for {what}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pipeline(status: PipelineStatus) -> Pipeline {
        Pipeline {
            id: 42,
            ref_: "main".into(),
            sha: "abc123".into(),
            status,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            web_url: None,
        }
    }

    #[test]
    fn successful_pipeline_passes() {
        let verdict = Verdict::new("gitlab", "wait-pipeline", "group/app")
            .with_pipeline_result(Some(pipeline(PipelineStatus::Success)), "pipeline");

        assert!(verdict.passed);
        assert_eq!(verdict.message, "pipeline 42 succeeded");
    }

    #[test]
    fn failed_or_missing_pipeline_fails() {
        let failed = Verdict::new("gitlab", "wait-pipeline", "group/app")
            .with_pipeline_result(Some(pipeline(PipelineStatus::Canceled)), "pipeline");
        assert!(!failed.passed);
        assert_eq!(failed.message, "pipeline 42 finished as canceled");

        let timed_out = Verdict::new("gitlab", "wait-pipeline", "group/app")
            .with_pipeline_result(None, "pipeline");
        assert!(!timed_out.passed);
        assert!(timed_out.pipeline.is_none());
    }

    #[test]
    fn empty_sections_are_omitted_from_json() {
        let verdict = Verdict::new("tekton", "wait-argo", "app-development").pass("healthy");
        let json = serde_json::to_value(&verdict).unwrap();

        assert_eq!(json["passed"], true);
        assert!(json.get("mismatches").is_none());
        assert!(json.get("pipeline").is_none());
    }
}
