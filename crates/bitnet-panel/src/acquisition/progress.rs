//! Per-job download progress.
//!
//! Every download gets its own record keyed by job id, so polling a job id
//! never observes another download. The most recently started job is also
//! remembered for clients that poll without an id. Finished records expire
//! after a TTL; running ones are kept until they finish.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

pub type JobId = String;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadProgress {
    pub job_id: Option<JobId>,
    pub model_name: String,
    pub progress: u8,
    pub status: String,
    pub error: Option<String>,
    pub is_downloading: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DownloadProgress {
    /// The record reported before any download has started.
    pub fn idle() -> Self {
        Self {
            job_id: None,
            model_name: String::new(),
            progress: 0,
            status: String::new(),
            error: None,
            is_downloading: false,
            started_at: None,
            finished_at: None,
        }
    }
}

pub struct ProgressTracker {
    jobs: DashMap<JobId, DownloadProgress>,
    latest: ArcSwapOption<JobId>,
    ttl: ChronoDuration,
}

impl ProgressTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            jobs: DashMap::new(),
            latest: ArcSwapOption::empty(),
            ttl: ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::days(1)),
        }
    }

    pub fn begin(&self, model_name: &str) -> JobId {
        let job_id = Uuid::new_v4().to_string();
        self.jobs.insert(
            job_id.clone(),
            DownloadProgress {
                job_id: Some(job_id.clone()),
                model_name: model_name.to_string(),
                progress: 0,
                status: "Starting download...".to_string(),
                error: None,
                is_downloading: true,
                started_at: Some(Utc::now()),
                finished_at: None,
            },
        );
        self.latest.store(Some(Arc::new(job_id.clone())));
        crate::metrics::inc_downloads();
        job_id
    }

    /// Raise the job's percentage. Lower values than the current one are ignored.
    pub fn advance(&self, job_id: &str, progress: u8, status: &str) {
        if let Some(mut record) = self.jobs.get_mut(job_id) {
            if !record.is_downloading {
                return;
            }
            record.progress = record.progress.max(progress.min(99));
            if record.status != status {
                record.status = status.to_string();
            }
        }
    }

    pub fn complete(&self, job_id: &str) {
        self.finish(job_id, |record| {
            record.progress = 100;
            record.status = "Download completed".to_string();
            record.error = None;
        });
    }

    /// Percentage is left where the failure happened.
    pub fn fail(&self, job_id: &str, error: &str) {
        self.finish(job_id, |record| {
            record.status = format!("Error: {}", error);
            record.error = Some(error.to_string());
        });
    }

    fn finish(&self, job_id: &str, apply: impl FnOnce(&mut DownloadProgress)) {
        if let Some(mut record) = self.jobs.get_mut(job_id) {
            if !record.is_downloading {
                return;
            }
            apply(&mut record);
            record.is_downloading = false;
            record.finished_at = Some(Utc::now());
            crate::metrics::dec_downloads();
        }
    }

    pub fn get(&self, job_id: &str) -> Option<DownloadProgress> {
        self.jobs.get(job_id).map(|r| r.clone())
    }

    /// Most recently started job, or the idle record.
    pub fn latest(&self) -> DownloadProgress {
        self.latest
            .load_full()
            .and_then(|job_id| self.get(&job_id))
            .unwrap_or_else(DownloadProgress::idle)
    }

    /// Drop finished records older than the TTL. Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.jobs.len();
        let ttl = self.ttl;
        self.jobs.retain(|_, record| match record.finished_at {
            Some(finished) => now - finished < ttl,
            None => true,
        });
        let removed = before.saturating_sub(self.jobs.len());
        if removed > 0 {
            debug!("Expired {} download progress record(s)", removed);
        }
        removed
    }

    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                tracker.sweep(Utc::now());
            }
        })
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tracker() -> ProgressTracker {
        ProgressTracker::new(Duration::from_secs(600))
    }

    #[test]
    fn test_idle_before_any_download() {
        let tracker = tracker();
        assert_eq!(tracker.latest(), DownloadProgress::idle());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_completion_sets_full_progress() {
        let tracker = tracker();
        let job = tracker.begin("microsoft/bitnet-b1.58-2B-4T");
        tracker.advance(&job, 10, "Downloading model files...");
        tracker.complete(&job);

        let record = tracker.get(&job).unwrap();
        assert_eq!(record.progress, 100);
        assert_eq!(record.status, "Download completed");
        assert!(record.error.is_none());
        assert!(!record.is_downloading);
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn test_failure_keeps_progress_short_of_full() {
        let tracker = tracker();
        let job = tracker.begin("example/model-a");
        tracker.advance(&job, 40, "Downloading model files...");
        tracker.fail(&job, "hub returned 404");

        let record = tracker.get(&job).unwrap();
        assert_eq!(record.progress, 40);
        assert_eq!(record.error.as_deref(), Some("hub returned 404"));
        assert_eq!(record.status, "Error: hub returned 404");

        // finished jobs ignore late updates
        tracker.complete(&job);
        assert_eq!(tracker.get(&job).unwrap().progress, 40);
    }

    #[test]
    fn test_latest_follows_newest_job_but_ids_stay_separate() {
        let tracker = tracker();
        let first = tracker.begin("example/model-a");
        let second = tracker.begin("example/model-b");
        tracker.advance(&first, 50, "Downloading model files...");

        assert_eq!(tracker.latest().model_name, "example/model-b");
        assert_eq!(tracker.get(&first).unwrap().progress, 50);
        assert_eq!(tracker.get(&second).unwrap().progress, 0);
    }

    #[test]
    fn test_sweep_expires_only_finished_jobs() {
        let tracker = ProgressTracker::new(Duration::from_secs(60));
        let done = tracker.begin("a/done");
        let running = tracker.begin("a/running");
        tracker.complete(&done);

        assert_eq!(tracker.sweep(Utc::now()), 0);
        let later = Utc::now() + ChronoDuration::seconds(120);
        assert_eq!(tracker.sweep(later), 1);
        assert!(tracker.get(&done).is_none());
        assert!(tracker.get(&running).is_some());
    }

    #[test]
    fn test_latest_falls_back_to_idle_after_expiry() {
        let tracker = ProgressTracker::new(Duration::from_secs(1));
        let job = tracker.begin("a/b");
        tracker.complete(&job);
        tracker.sweep(Utc::now() + ChronoDuration::seconds(5));
        assert_eq!(tracker.latest(), DownloadProgress::idle());
    }

    proptest! {
        #[test]
        fn progress_is_monotonic_and_bounded(steps in proptest::collection::vec(0u8..=255, 1..40)) {
            let tracker = tracker();
            let job = tracker.begin("a/b");
            let mut last = 0;
            for step in steps {
                tracker.advance(&job, step, "Downloading model files...");
                let now = tracker.get(&job).unwrap().progress;
                prop_assert!(now >= last);
                prop_assert!(now <= 100);
                last = now;
            }
        }
    }
}
