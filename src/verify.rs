use std::borrow::Cow;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use log::{error, info};
use regex::Regex;
use serde::Serialize;

use crate::model::{Job, PipelineStatus, TaskRun};

/// Tasks whose execution must show a specific tool being invoked.
pub const DEFAULT_REQUIRED_COMMANDS: &[(&str, &str)] = &[
    ("build-container", "cosign"),
    ("acs-image-check", "roxctl"),
    ("acs-image-scan", "roxctl"),
    ("acs-deploy-check", "roxctl"),
];

/// Something that ran as part of a pipeline and can be checked against an
/// `ExpectedTaskSet`.
pub trait ExecutedTask {
    /// Name the task has in the pipeline definition.
    fn label(&self) -> Option<&str>;

    /// Name used in diagnostics.
    fn display_name(&self) -> &str;

    /// Whether the task was ever given somewhere to run.
    fn was_scheduled(&self) -> bool;

    /// Text searched for required commands.
    fn executed_text(&self) -> Cow<'_, str>;
}

impl ExecutedTask for TaskRun {
    fn label(&self) -> Option<&str> {
        self.pipeline_task.as_deref()
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn was_scheduled(&self) -> bool {
        self.pod_name.is_some()
    }

    fn executed_text(&self) -> Cow<'_, str> {
        Cow::Owned(self.step_text())
    }
}

impl ExecutedTask for Job {
    fn label(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn was_scheduled(&self) -> bool {
        !matches!(
            self.status,
            PipelineStatus::Created
                | PipelineStatus::Pending
                | PipelineStatus::Skipped
                | PipelineStatus::Manual
        )
    }

    fn executed_text(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.log.as_deref().unwrap_or_default())
    }
}

/// The tasks a scenario expects to run, and the command each of them must
/// have executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedTaskSet {
    tasks: IndexSet<String>,
    required_commands: IndexMap<String, String>,
}

impl ExpectedTaskSet {
    /// Expected tasks with the default required-command table.
    pub fn new<I, S>(tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let required_commands = DEFAULT_REQUIRED_COMMANDS
            .iter()
            .map(|(task, pattern)| ((*task).to_owned(), (*pattern).to_owned()))
            .collect();

        Self {
            tasks: tasks.into_iter().map(Into::into).collect(),
            required_commands,
        }
    }

    /// Adds or replaces the command pattern required for `task`.
    pub fn require(mut self, task: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.required_commands.insert(task.into(), pattern.into());
        self
    }

    pub fn with_overrides(self, overrides: &IndexMap<String, String>) -> Self {
        overrides
            .iter()
            .fold(self, |set, (task, pattern)| set.require(task.as_str(), pattern.as_str()))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, task: &str) -> bool {
        self.tasks.contains(task)
    }

    /// Required-command entries that apply, i.e. whose task is expected.
    pub fn applicable_commands(&self) -> impl Iterator<Item = (&str, &str)> {
        self.required_commands
            .iter()
            .filter(|(task, _)| self.tasks.contains(task.as_str()))
            .map(|(task, pattern)| (task.as_str(), pattern.as_str()))
    }
}

/// One discrepancy between what ran and what was expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    Count { expected: usize, observed: usize },
    UnexpectedTask { run: String, label: Option<String> },
    NeverScheduled { run: String },
    MissingTask { task: String },
    MissingCommand { task: String, pattern: String },
    InvalidPattern { task: String, pattern: String },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count { expected, observed } => {
                write!(f, "expected {expected} tasks, observed {observed}")
            }
            Self::UnexpectedTask { run, label } => write!(
                f,
                "{run} runs task `{}` which is not expected",
                label.as_deref().unwrap_or("<unlabeled>")
            ),
            Self::NeverScheduled { run } => write!(f, "{run} was never scheduled"),
            Self::MissingTask { task } => write!(f, "no run found for task `{task}`"),
            Self::MissingCommand { task, pattern } => {
                write!(f, "task `{task}` did not execute `{pattern}`")
            }
            Self::InvalidPattern { task, pattern } => {
                write!(f, "pattern `{pattern}` for task `{task}` is not a valid regex")
            }
        }
    }
}

/// Collects every mismatch between `runs` and `expected`. Nothing stops at
/// the first problem.
pub fn inspect<T: ExecutedTask>(runs: &[T], expected: &ExpectedTaskSet) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();

    if runs.len() != expected.len() {
        mismatches.push(Mismatch::Count {
            expected: expected.len(),
            observed: runs.len(),
        });
    }

    for run in runs {
        let known = run.label().is_some_and(|label| expected.contains(label));
        if !known {
            mismatches.push(Mismatch::UnexpectedTask {
                run: run.display_name().to_owned(),
                label: run.label().map(ToOwned::to_owned),
            });
        }

        if !run.was_scheduled() {
            mismatches.push(Mismatch::NeverScheduled {
                run: run.display_name().to_owned(),
            });
        }
    }

    for (task, pattern) in expected.applicable_commands() {
        let Some(run) = runs.iter().find(|run| run.label() == Some(task)) else {
            mismatches.push(Mismatch::MissingTask {
                task: task.to_owned(),
            });
            continue;
        };

        let Ok(regex) = Regex::new(pattern) else {
            mismatches.push(Mismatch::InvalidPattern {
                task: task.to_owned(),
                pattern: pattern.to_owned(),
            });
            continue;
        };

        if !regex.is_match(&run.executed_text()) {
            mismatches.push(Mismatch::MissingCommand {
                task: task.to_owned(),
                pattern: pattern.to_owned(),
            });
        }
    }

    mismatches
}

/// Checks `runs` against `expected`, logging every mismatch, and returns a
/// single verdict.
pub fn verify<T: ExecutedTask>(runs: &[T], expected: &ExpectedTaskSet) -> bool {
    report(&inspect(runs, expected), expected)
}

/// Logs mismatches already collected by [`inspect`] and folds them into the
/// aggregate verdict.
pub fn report(mismatches: &[Mismatch], expected: &ExpectedTaskSet) -> bool {
    for mismatch in mismatches {
        error!("Task verification: {mismatch}");
    }

    if mismatches.is_empty() {
        info!("All {} expected tasks ran as expected", expected.len());
        true
    } else {
        error!(
            "Task verification failed with {} mismatch(es)",
            mismatches.len()
        );
        false
    }
}
