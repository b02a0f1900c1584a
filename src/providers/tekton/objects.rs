//! Conversions from untyped Tekton and Argo CD objects into the crate's model.

use chrono::{DateTime, Utc};
use kube::core::DynamicObject;
use kube::discovery::ApiResource;
use kube::ResourceExt;
use serde_json::Value;

use crate::model::{PipelineRun, PipelineStatus, Step, TaskRun};

pub const PIPELINE_TASK_LABEL: &str = "tekton.dev/pipelineTask";
pub const PIPELINE_RUN_LABEL: &str = "tekton.dev/pipelineRun";
pub const REPOSITORY_LABEL: &str = "pipelinesascode.tekton.dev/url-repository";
pub const EVENT_TYPE_LABEL: &str = "pipelinesascode.tekton.dev/event-type";

fn api_resource(group: &str, version: &str, kind: &str, plural: &str) -> ApiResource {
    ApiResource {
        group: group.to_string(),
        version: version.to_string(),
        api_version: format!("{group}/{version}"),
        kind: kind.to_string(),
        plural: plural.to_string(),
    }
}

pub fn pipeline_run_resource() -> ApiResource {
    api_resource("tekton.dev", "v1", "PipelineRun", "pipelineruns")
}

pub fn task_run_resource() -> ApiResource {
    api_resource("tekton.dev", "v1", "TaskRun", "taskruns")
}

pub fn application_resource() -> ApiResource {
    api_resource("argoproj.io", "v1alpha1", "Application", "applications")
}

/// Reads the `Succeeded` condition Tekton keeps on runs.
pub fn succeeded_condition(status: &Value) -> PipelineStatus {
    let Some(conditions) = status.get("conditions").and_then(Value::as_array) else {
        return PipelineStatus::Pending;
    };
    let Some(condition) = conditions
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some("Succeeded"))
    else {
        return PipelineStatus::Pending;
    };

    let reason = condition.get("reason").and_then(Value::as_str);
    match (condition.get("status").and_then(Value::as_str), reason) {
        (Some("True"), _) => PipelineStatus::Success,
        (_, Some("Cancelled" | "CancelledRunFinally" | "StoppedRunFinally")) => {
            PipelineStatus::Canceled
        }
        (Some("False"), _) => PipelineStatus::Failed,
        (Some("Unknown"), Some("Pending" | "PipelineRunPending")) => PipelineStatus::Pending,
        (Some("Unknown"), _) => PipelineStatus::Running,
        _ => PipelineStatus::Unknown,
    }
}

/// Object creation time. Goes through serde so it does not depend on the
/// time library behind `k8s_openapi`'s `Time`.
fn creation_time(object: &DynamicObject) -> Option<DateTime<Utc>> {
    let value = serde_json::to_value(&object.metadata.creation_timestamp).ok()?;
    DateTime::parse_from_rfc3339(value.as_str()?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

pub fn to_pipeline_run(object: &DynamicObject) -> PipelineRun {
    PipelineRun {
        name: object.name_any(),
        namespace: object.namespace().unwrap_or_default(),
        status: succeeded_condition(&object.data["status"]),
        created_at: creation_time(object),
    }
}

fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn to_step(step: &Value) -> Step {
    Step {
        name: step["name"].as_str().unwrap_or_default().to_owned(),
        script: step["script"].as_str().map(str::to_owned),
        command: strings(&step["command"]),
        args: strings(&step["args"]),
    }
}

pub fn to_task_run(object: &DynamicObject) -> TaskRun {
    let status = &object.data["status"];
    let steps = status["taskSpec"]["steps"]
        .as_array()
        .map(|steps| steps.iter().map(to_step).collect())
        .unwrap_or_default();

    TaskRun {
        name: object.name_any(),
        pipeline_task: object.labels().get(PIPELINE_TASK_LABEL).cloned(),
        pod_name: status["podName"]
            .as_str()
            .filter(|pod| !pod.is_empty())
            .map(str::to_owned),
        status: succeeded_condition(status),
        steps,
    }
}

/// Argo CD reports an application ready once it is both `Healthy` and `Synced`.
pub fn application_ready(object: &DynamicObject) -> bool {
    let status = &object.data["status"];
    status["health"]["status"].as_str() == Some("Healthy")
        && status["sync"]["status"].as_str() == Some("Synced")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> DynamicObject {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn task_run_reads_label_pod_and_steps() {
        let run = to_task_run(&object(json!({
            "apiVersion": "tekton.dev/v1",
            "kind": "TaskRun",
            "metadata": {
                "name": "app-on-push-abcde-build-container",
                "namespace": "tssc-app-ci",
                "labels": {
                    "tekton.dev/pipelineTask": "build-container",
                    "tekton.dev/pipelineRun": "app-on-push-abcde"
                }
            },
            "status": {
                "podName": "app-on-push-abcde-build-container-pod",
                "conditions": [{"type": "Succeeded", "status": "True", "reason": "Succeeded"}],
                "taskSpec": {
                    "steps": [
                        {"name": "build", "script": "buildah bud ."},
                        {"name": "sign", "command": ["cosign"], "args": ["sign", "$(params.IMAGE)"]}
                    ]
                }
            }
        })));

        assert_eq!(run.pipeline_task.as_deref(), Some("build-container"));
        assert_eq!(
            run.pod_name.as_deref(),
            Some("app-on-push-abcde-build-container-pod")
        );
        assert_eq!(run.status, PipelineStatus::Success);
        assert_eq!(run.steps.len(), 2);
        assert_eq!(run.steps[1].args, vec!["sign", "$(params.IMAGE)"]);
    }

    #[test]
    fn task_run_without_pod_never_ran() {
        let run = to_task_run(&object(json!({
            "apiVersion": "tekton.dev/v1",
            "kind": "TaskRun",
            "metadata": {"name": "skipped"},
            "status": {"podName": ""}
        })));

        assert_eq!(run.pod_name, None);
        assert_eq!(run.status, PipelineStatus::Pending);
        assert!(run.steps.is_empty());
    }

    #[test]
    fn succeeded_condition_covers_run_states() {
        let status = |s: &str, reason: &str| {
            json!({"conditions": [{"type": "Succeeded", "status": s, "reason": reason}]})
        };

        assert_eq!(
            succeeded_condition(&status("Unknown", "Running")),
            PipelineStatus::Running
        );
        assert_eq!(
            succeeded_condition(&status("False", "Failed")),
            PipelineStatus::Failed
        );
        assert_eq!(
            succeeded_condition(&status("False", "Cancelled")),
            PipelineStatus::Canceled
        );
        assert_eq!(
            succeeded_condition(&status("Unknown", "PipelineRunPending")),
            PipelineStatus::Pending
        );
        assert_eq!(succeeded_condition(&json!({})), PipelineStatus::Pending);
    }

    #[test]
    fn pipeline_run_keeps_creation_time() {
        let run = to_pipeline_run(&object(json!({
            "apiVersion": "tekton.dev/v1",
            "kind": "PipelineRun",
            "metadata": {
                "name": "app-on-push-abcde",
                "namespace": "tssc-app-ci",
                "creationTimestamp": "2024-05-01T10:00:00Z"
            },
            "status": {"conditions": [{"type": "Succeeded", "status": "Unknown", "reason": "Running"}]}
        })));

        assert_eq!(run.namespace, "tssc-app-ci");
        assert_eq!(run.status, PipelineStatus::Running);
        assert_eq!(
            run.created_at.map(|t| t.timestamp()),
            Some(1_714_557_600)
        );
    }

    #[test]
    fn application_needs_health_and_sync() {
        let app = |health: &str, sync: &str| {
            object(json!({
                "apiVersion": "argoproj.io/v1alpha1",
                "kind": "Application",
                "metadata": {"name": "app-development"},
                "status": {"health": {"status": health}, "sync": {"status": sync}}
            }))
        };

        assert!(application_ready(&app("Healthy", "Synced")));
        assert!(!application_ready(&app("Healthy", "OutOfSync")));
        assert!(!application_ready(&app("Progressing", "Synced")));
    }
}
