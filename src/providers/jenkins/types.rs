use chrono::DateTime;
use log::warn;
use serde::Deserialize;

use crate::model::{Job, Pipeline, PipelineStatus};

/// Tree query used when listing builds, so Jenkins only serializes what we map.
pub const BUILD_TREE: &str =
    "number,result,building,timestamp,url,actions[lastBuiltRevision[SHA1,branch[name]]]";

#[derive(Debug, Deserialize)]
pub struct BuildsResponse {
    #[serde(default)]
    pub builds: Vec<JenkinsBuild>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JenkinsBuild {
    pub number: u64,
    /// `null` until the build finishes
    pub result: Option<String>,
    #[serde(default)]
    pub building: bool,
    /// Start time in milliseconds since the epoch
    pub timestamp: i64,
    pub url: Option<String>,
    #[serde(default)]
    pub actions: Vec<Option<BuildAction>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildAction {
    pub last_built_revision: Option<Revision>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Revision {
    #[serde(rename = "SHA1")]
    pub sha1: String,
    #[serde(default)]
    pub branch: Vec<BranchName>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchName {
    pub name: String,
}

impl JenkinsBuild {
    pub fn status(&self) -> PipelineStatus {
        if self.building {
            return PipelineStatus::Running;
        }
        match self.result.as_deref() {
            Some("SUCCESS") => PipelineStatus::Success,
            Some("FAILURE" | "UNSTABLE") => PipelineStatus::Failed,
            // A NOT_BUILT build is finished and will never run
            Some("ABORTED" | "NOT_BUILT") => PipelineStatus::Canceled,
            Some(_) => PipelineStatus::Unknown,
            None => PipelineStatus::Pending,
        }
    }

    fn revision(&self) -> Option<&Revision> {
        self.actions
            .iter()
            .flatten()
            .find_map(|action| action.last_built_revision.as_ref())
    }
}

/// `origin/main` and `refs/remotes/origin/main` both become `main`.
fn short_branch(name: &str) -> &str {
    let name = name.strip_prefix("refs/remotes/").unwrap_or(name);
    name.split_once('/').map_or(name, |(_, branch)| branch)
}

impl From<JenkinsBuild> for Pipeline {
    fn from(build: JenkinsBuild) -> Self {
        let status = build.status();
        let (ref_, sha) = match build.revision() {
            Some(revision) => (
                revision
                    .branch
                    .first()
                    .map(|b| short_branch(&b.name).to_owned())
                    .unwrap_or_default(),
                revision.sha1.clone(),
            ),
            None => (String::new(), String::new()),
        };

        Self {
            id: build.number,
            ref_,
            sha,
            status,
            created_at: DateTime::from_timestamp_millis(build.timestamp).unwrap_or_default(),
            web_url: build.url,
        }
    }
}

/// Response of the Pipeline Stage View `wfapi/describe` endpoint.
#[derive(Debug, Deserialize)]
pub struct RunDescription {
    #[serde(default)]
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Stage {
    pub id: String,
    pub name: String,
    pub status: String,
}

impl Stage {
    pub fn into_job(self, build_number: u64) -> Job {
        let status = match self.status.as_str() {
            "SUCCESS" => PipelineStatus::Success,
            "FAILED" | "UNSTABLE" => PipelineStatus::Failed,
            "ABORTED" => PipelineStatus::Canceled,
            "IN_PROGRESS" => PipelineStatus::Running,
            "PAUSED_PENDING_INPUT" => PipelineStatus::Manual,
            "NOT_EXECUTED" => PipelineStatus::Skipped,
            _ => PipelineStatus::Unknown,
        };

        // Flow node ids are numeric
        let id = self.id.parse().unwrap_or_else(|_| {
            warn!(
                "Stage {} of build #{build_number} has non-numeric id {:?}, using 0",
                self.name, self.id
            );
            0
        });

        Job {
            id,
            pipeline_id: build_number,
            name: self.name,
            stage: None,
            status,
            log: None,
        }
    }
}
