use log::{info, warn};

use crate::error::{E2eError, Result};
use crate::model::{Pipeline, PipelineStatus};
use crate::poll::{wait_for, PollPolicy};
use crate::providers::{PipelineFilter, PipelineSource};

/// Returns the pipeline that ran for `ref_` at commit `sha`.
pub fn find_pipeline<'a>(pipelines: &'a [Pipeline], ref_: &str, sha: &str) -> Option<&'a Pipeline> {
    pipelines.iter().find(|p| p.ref_ == ref_ && p.sha == sha)
}

/// Returns the pipeline with the highest id. Ids grow with creation order,
/// so this is the most recently created one regardless of list order.
pub fn find_latest(pipelines: &[Pipeline]) -> Option<&Pipeline> {
    pipelines.iter().max_by_key(|p| p.id)
}

/// Returns the earliest created pipeline, lower id first on equal timestamps.
pub fn find_oldest(pipelines: &[Pipeline]) -> Option<&Pipeline> {
    pipelines.iter().min_by_key(|p| (p.created_at, p.id))
}

/// Locates pipelines on a backend and waits for them to be created and to
/// finish.
pub struct PipelineResolver<'a, S: PipelineSource + ?Sized> {
    source: &'a S,
    creation: PollPolicy,
    completion: PollPolicy,
}

impl<'a, S: PipelineSource + ?Sized> PipelineResolver<'a, S> {
    /// `creation` bounds the wait for a pipeline to show up (usually
    /// unbounded), `completion` the wait for it to reach a terminal status.
    pub fn new(source: &'a S, creation: PollPolicy, completion: PollPolicy) -> Self {
        Self {
            source,
            creation,
            completion,
        }
    }

    /// Polls until a pipeline for (`ref_`, `sha`) exists.
    pub async fn find_pipeline(&self, ref_: &str, sha: &str) -> Option<Pipeline> {
        let filter = PipelineFilter::by_ref_and_sha(ref_, sha);
        let description = format!(
            "{} pipeline for {ref_}@{}",
            self.source.name(),
            short_sha(sha)
        );

        let source = self.source;
        let filter = &filter;
        wait_for(&self.creation, &description, move || async move {
            let pipelines = source.list_pipelines(filter).await?;
            Ok::<_, E2eError>(find_pipeline(&pipelines, ref_, sha).cloned())
        })
        .await
    }

    /// Polls until pipeline `id` reaches success, failed or canceled.
    pub async fn wait_for_completion(&self, id: u64) -> Option<Pipeline> {
        let description = format!("{} pipeline {id} to finish", self.source.name());

        let source = self.source;
        wait_for(&self.completion, &description, move || async move {
            let pipeline = source.get_pipeline(id).await?;
            if pipeline.status.is_terminal() {
                Ok::<_, E2eError>(Some(pipeline))
            } else {
                info!("Pipeline {id} is {}", pipeline.status);
                Ok(None)
            }
        })
        .await
    }

    /// Waits for the pipeline of (`ref_`, `sha`) to appear, then for it to
    /// finish.
    pub async fn wait_for_pipeline_result(&self, ref_: &str, sha: &str) -> Option<Pipeline> {
        let pipeline = self.find_pipeline(ref_, sha).await?;
        info!(
            "Found {} pipeline {} for {ref_}@{} ({})",
            self.source.name(),
            pipeline.id,
            short_sha(sha),
            pipeline.status
        );

        if pipeline.status.is_terminal() {
            return Some(pipeline);
        }

        self.wait_for_completion(pipeline.id).await
    }

    /// Most recently created pipeline, optionally restricted to `ref_`.
    pub async fn latest(&self, ref_: Option<&str>) -> Result<Option<Pipeline>> {
        let filter = PipelineFilter {
            ref_: ref_.map(ToOwned::to_owned),
            sha: None,
        };
        let pipelines = self.source.list_pipelines(&filter).await?;
        Ok(find_latest(&pipelines).cloned())
    }

    /// Cancels the oldest pipeline on `ref_` that is still active and
    /// returns it. Used to drop the stale run triggered by repository
    /// creation before a test pushes its own commit.
    pub async fn cancel_oldest(&self, ref_: &str) -> Result<Option<Pipeline>> {
        let pipelines: Vec<Pipeline> = self
            .source
            .list_pipelines(&PipelineFilter::by_ref(ref_))
            .await?
            .into_iter()
            .filter(|p| !p.status.is_terminal())
            .collect();

        let Some(oldest) = find_oldest(&pipelines).cloned() else {
            warn!("No active {} pipeline on {ref_} to cancel", self.source.name());
            return Ok(None);
        };

        info!("Canceling {} pipeline {} on {ref_}", self.source.name(), oldest.id);
        self.source.cancel_pipeline(oldest.id).await?;

        Ok(Some(Pipeline {
            status: PipelineStatus::Canceled,
            ..oldest
        }))
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Job;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    fn pipeline(id: u64, ref_: &str, sha: &str, status: PipelineStatus, minute: u32) -> Pipeline {
        Pipeline {
            id,
            ref_: ref_.into(),
            sha: sha.into(),
            status,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
            web_url: None,
        }
    }

    /// Replays scripted listings and statuses; the last entry repeats.
    #[derive(Default)]
    struct ScriptedSource {
        listings: Mutex<VecDeque<Result<Vec<Pipeline>>>>,
        statuses: Mutex<VecDeque<PipelineStatus>>,
        canceled: Mutex<Vec<u64>>,
        filters: Mutex<Vec<PipelineFilter>>,
    }

    impl ScriptedSource {
        fn with_listings(listings: Vec<Result<Vec<Pipeline>>>) -> Self {
            Self {
                listings: Mutex::new(listings.into()),
                ..Self::default()
            }
        }

        fn with_statuses(statuses: Vec<PipelineStatus>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl PipelineSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn list_pipelines(&self, filter: &PipelineFilter) -> Result<Vec<Pipeline>> {
            self.filters.lock().unwrap().push(filter.clone());
            let mut listings = self.listings.lock().unwrap();
            let next = if listings.len() > 1 {
                listings.pop_front().unwrap()
            } else {
                match listings.front() {
                    Some(Ok(pipelines)) => Ok(pipelines.clone()),
                    Some(Err(_)) | None => Ok(Vec::new()),
                }
            };
            next.map(|pipelines| pipelines.into_iter().filter(|p| filter.matches(p)).collect())
        }

        async fn get_pipeline(&self, id: u64) -> Result<Pipeline> {
            let mut statuses = self.statuses.lock().unwrap();
            let status = if statuses.len() > 1 {
                statuses.pop_front().unwrap()
            } else {
                *statuses.front().unwrap()
            };
            Ok(pipeline(id, "main", "abc", status, 0))
        }

        async fn cancel_pipeline(&self, id: u64) -> Result<()> {
            self.canceled.lock().unwrap().push(id);
            Ok(())
        }

        async fn list_jobs(&self, _pipeline_id: u64) -> Result<Vec<Job>> {
            Ok(Vec::new())
        }

        async fn get_job_log(&self, _job_id: u64) -> Result<String> {
            Ok(String::new())
        }
    }

    fn fast() -> PollPolicy {
        PollPolicy::bounded(Duration::from_secs(5), Duration::from_secs(60))
    }

    #[test]
    fn latest_is_max_id_regardless_of_order() {
        let pipelines = vec![
            pipeline(12, "main", "a", PipelineStatus::Success, 3),
            pipeline(40, "main", "b", PipelineStatus::Running, 1),
            pipeline(7, "main", "c", PipelineStatus::Failed, 9),
        ];
        assert_eq!(find_latest(&pipelines).map(|p| p.id), Some(40));

        let mut reversed = pipelines.clone();
        reversed.reverse();
        assert_eq!(find_latest(&reversed).map(|p| p.id), Some(40));

        assert!(find_latest(&[]).is_none());
    }

    #[test]
    fn oldest_is_min_creation_time() {
        let pipelines = vec![
            pipeline(12, "main", "a", PipelineStatus::Running, 3),
            pipeline(40, "main", "b", PipelineStatus::Running, 1),
            pipeline(39, "main", "c", PipelineStatus::Running, 1),
        ];
        assert_eq!(find_oldest(&pipelines).map(|p| p.id), Some(39));
    }

    #[test]
    fn find_pipeline_matches_sha_among_same_ref() {
        let pipelines = vec![
            pipeline(1, "main", "aaa", PipelineStatus::Success, 0),
            pipeline(2, "main", "bbb", PipelineStatus::Running, 1),
            pipeline(3, "feature", "bbb", PipelineStatus::Running, 2),
        ];

        assert_eq!(find_pipeline(&pipelines, "main", "bbb").map(|p| p.id), Some(2));
        assert_eq!(find_pipeline(&pipelines, "feature", "bbb").map(|p| p.id), Some(3));
        assert!(find_pipeline(&pipelines, "main", "ccc").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_polling_until_matching_sha_shows_up() {
        let source = ScriptedSource::with_listings(vec![
            Ok(vec![pipeline(1, "main", "old", PipelineStatus::Success, 0)]),
            Err(E2eError::Api {
                status: 502,
                message: "Bad Gateway".into(),
            }),
            Ok(vec![
                pipeline(1, "main", "old", PipelineStatus::Success, 0),
                pipeline(2, "main", "new", PipelineStatus::Created, 1),
            ]),
        ]);
        let resolver = PipelineResolver::new(
            &source,
            PollPolicy::forever(Duration::from_secs(10)),
            fast(),
        );

        let found = resolver.find_pipeline("main", "new").await;
        assert_eq!(found.map(|p| p.id), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_asks_the_backend_for_the_commit() {
        let source = ScriptedSource::with_listings(vec![Ok(vec![pipeline(
            5,
            "main",
            "abc",
            PipelineStatus::Running,
            0,
        )])]);
        let resolver = PipelineResolver::new(&source, fast(), fast());

        let found = resolver.find_pipeline("main", "abc").await;
        assert_eq!(found.map(|p| p.id), Some(5));

        let filters = source.filters.lock().unwrap();
        assert_eq!(
            filters.first(),
            Some(&PipelineFilter::by_ref_and_sha("main", "abc"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_creation_wait_gives_up() {
        let source = ScriptedSource::with_listings(vec![Ok(vec![pipeline(
            1,
            "main",
            "old",
            PipelineStatus::Success,
            0,
        )])]);
        let resolver = PipelineResolver::new(&source, fast(), fast());

        assert!(resolver.find_pipeline("main", "new").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn completion_waits_for_terminal_status() {
        let source = ScriptedSource::with_statuses(vec![
            PipelineStatus::Created,
            PipelineStatus::Pending,
            PipelineStatus::Running,
            PipelineStatus::Manual,
            PipelineStatus::Failed,
        ]);
        let resolver = PipelineResolver::new(&source, fast(), fast());

        let finished = resolver.wait_for_completion(5).await.unwrap();
        assert_eq!(finished.status, PipelineStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_times_out_on_stuck_pipeline() {
        let source = ScriptedSource::with_statuses(vec![PipelineStatus::Running]);
        let resolver = PipelineResolver::new(&source, fast(), fast());

        assert!(resolver.wait_for_completion(5).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn pipeline_result_chains_creation_and_completion() {
        let source = ScriptedSource {
            listings: Mutex::new(
                vec![Ok(vec![pipeline(9, "main", "abc", PipelineStatus::Running, 0)])].into(),
            ),
            statuses: Mutex::new(vec![PipelineStatus::Running, PipelineStatus::Success].into()),
            canceled: Mutex::default(),
            filters: Mutex::default(),
        };
        let resolver = PipelineResolver::new(&source, fast(), fast());

        let result = resolver.wait_for_pipeline_result("main", "abc").await.unwrap();
        assert_eq!(result.id, 9);
        assert_eq!(result.status, PipelineStatus::Success);
    }

    #[tokio::test]
    async fn cancel_oldest_skips_finished_pipelines() {
        let source = ScriptedSource::with_listings(vec![Ok(vec![
            pipeline(1, "main", "a", PipelineStatus::Success, 0),
            pipeline(2, "main", "b", PipelineStatus::Running, 1),
            pipeline(3, "main", "c", PipelineStatus::Pending, 2),
        ])]);
        let resolver = PipelineResolver::new(&source, fast(), fast());

        let canceled = resolver.cancel_oldest("main").await.unwrap().unwrap();
        assert_eq!(canceled.id, 2);
        assert_eq!(canceled.status, PipelineStatus::Canceled);
        assert_eq!(*source.canceled.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn cancel_oldest_without_active_pipeline_is_noop() {
        let source = ScriptedSource::with_listings(vec![Ok(vec![pipeline(
            1,
            "main",
            "a",
            PipelineStatus::Success,
            0,
        )])]);
        let resolver = PipelineResolver::new(&source, fast(), fast());

        assert!(resolver.cancel_oldest("main").await.unwrap().is_none());
        assert!(source.canceled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn latest_respects_ref_filter() {
        let source = ScriptedSource::with_listings(vec![Ok(vec![
            pipeline(4, "main", "a", PipelineStatus::Success, 0),
            pipeline(8, "feature", "b", PipelineStatus::Success, 1),
        ])]);
        let resolver = PipelineResolver::new(&source, fast(), fast());

        assert_eq!(resolver.latest(Some("main")).await.unwrap().map(|p| p.id), Some(4));
        assert_eq!(resolver.latest(None).await.unwrap().map(|p| p.id), Some(8));
    }
}
