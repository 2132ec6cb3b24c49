//! Download jobs: hub transfer, environment setup, then activation.

use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::hub::{HubClient, HubModelId};
use super::progress::{JobId, ProgressTracker};
use super::setup::EnvironmentSetup;
use crate::error::{PanelError, PanelResult};
use crate::model_runtime::{LoadedModel, RuntimeManager};
use crate::model_store::ModelStore;

pub const STATUS_DOWNLOADING: &str = "Downloading model files...";
pub const STATUS_SETUP: &str = "Setting up environment...";
pub const REASON_CANCELLED: &str = "Download cancelled";

const TRANSFER_START: u8 = 10;
const TRANSFER_END: u8 = 70;

/// Percentage for `received` of `total` bytes of file `index` out of `count`.
fn transfer_progress(index: usize, count: usize, received: u64, total: Option<u64>) -> u8 {
    let span = (TRANSFER_END - TRANSFER_START) as f64;
    let count = count.max(1) as f64;
    let within = match total {
        Some(total) if total > 0 => (received as f64 / total as f64).min(1.0),
        _ => 0.0,
    };
    let pct = TRANSFER_START as f64 + span * (index as f64 + within) / count;
    pct.floor().min(TRANSFER_END as f64) as u8
}

/// Fails a job whose future is dropped before it finishes, e.g. when the
/// client of a foreground download disconnects. No-op once the job is done.
struct JobGuard<'a> {
    tracker: &'a ProgressTracker,
    job: &'a str,
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        let running = self
            .tracker
            .get(self.job)
            .map(|record| record.is_downloading)
            .unwrap_or(false);
        if running {
            warn!("Download job {} dropped before finishing", self.job);
            self.tracker.fail(self.job, REASON_CANCELLED);
        }
    }
}

/// Message recorded on the job, without the error's display prefix.
fn failure_reason(e: &PanelError) -> String {
    match e {
        PanelError::Acquisition(reason) => reason.clone(),
        other => other.to_string(),
    }
}

pub struct ModelDownloader {
    hub: HubClient,
    store: ModelStore,
    tracker: Arc<ProgressTracker>,
    runtime: Arc<RuntimeManager>,
    setup: EnvironmentSetup,
    namespace: String,
}

impl ModelDownloader {
    pub fn new(
        hub: HubClient,
        store: ModelStore,
        tracker: Arc<ProgressTracker>,
        runtime: Arc<RuntimeManager>,
        setup: EnvironmentSetup,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            hub,
            store,
            tracker,
            runtime,
            setup,
            namespace: namespace.into(),
        }
    }

    pub fn parse_id(&self, raw: &str) -> PanelResult<HubModelId> {
        HubModelId::parse(raw, &self.namespace)
    }

    /// Start a download on a background task. Invalid identifiers are
    /// rejected here, before any job exists.
    pub fn start(self: &Arc<Self>, raw: &str) -> PanelResult<(JobId, HubModelId)> {
        let id = self.parse_id(raw)?;
        let job = self.tracker.begin(&id.to_string());
        info!("Download job {} started for {}", job, id);

        let this = Arc::clone(self);
        let task_job = job.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            let _ = this.execute(&task_job, &task_id).await;
        });
        Ok((job, id))
    }

    /// Run a download within the caller's task and return its outcome.
    /// Dropping the returned future fails the job.
    pub async fn download(&self, raw: &str) -> PanelResult<(JobId, Arc<LoadedModel>)> {
        let id = self.parse_id(raw)?;
        let job = self.tracker.begin(&id.to_string());
        info!("Download job {} running in foreground for {}", job, id);
        let model = self.execute(&job, &id).await?;
        Ok((job, model))
    }

    async fn execute(&self, job: &str, id: &HubModelId) -> PanelResult<Arc<LoadedModel>> {
        let _guard = JobGuard {
            tracker: &self.tracker,
            job,
        };
        match self.run(job, id).await {
            Ok(model) => {
                self.tracker.complete(job);
                info!("Download job {} completed: {}", job, id);
                Ok(model)
            }
            Err(e) => {
                error!("Download job {} for {} failed: {}", job, id, e);
                self.tracker.fail(job, &failure_reason(&e));
                Err(e)
            }
        }
    }

    async fn run(&self, job: &str, id: &HubModelId) -> PanelResult<Arc<LoadedModel>> {
        self.tracker.advance(job, TRANSFER_START, STATUS_DOWNLOADING);

        let files = self.hub.list_files(id).await?;
        let dir = self.store.entry_dir(id.name());
        tokio::fs::create_dir_all(&dir).await?;
        info!("Fetching {} file(s) from {} into {}", files.len(), id, dir.display());

        self.transfer(job, id, &files, &dir).await?;

        self.tracker.advance(job, TRANSFER_END, STATUS_SETUP);
        self.setup.run(&dir).await;

        self.runtime.load(id.name(), &dir)
    }

    async fn transfer(&self, job: &str, id: &HubModelId, files: &[String], dir: &Path) -> PanelResult<()> {
        let count = files.len();
        for (index, file) in files.iter().enumerate() {
            let dest = dir.join(file);
            self.hub
                .download_file(id, file, &dest, |received, total| {
                    let pct = transfer_progress(index, count, received, total);
                    self.tracker.advance(job, pct, STATUS_DOWNLOADING);
                })
                .await?;
            let pct = transfer_progress(index + 1, count, 0, None);
            self.tracker.advance(job, pct, STATUS_DOWNLOADING);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model_runtime::ModelFormat;
    use std::time::Duration;

    struct Fixture {
        _root: tempfile::TempDir,
        downloader: Arc<ModelDownloader>,
        tracker: Arc<ProgressTracker>,
        runtime: Arc<RuntimeManager>,
        store: ModelStore,
    }

    fn fixture(endpoint: &str) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let store = ModelStore::open(root.path()).unwrap();
        let tracker = Arc::new(ProgressTracker::new(Duration::from_secs(600)));
        let runtime = Arc::new(RuntimeManager::new(&Config::default()));
        let downloader = Arc::new(ModelDownloader::new(
            HubClient::new(endpoint, None),
            store.clone(),
            tracker.clone(),
            runtime.clone(),
            EnvironmentSetup::new(Vec::new(), "i2_s"),
            "microsoft",
        ));
        Fixture {
            _root: root,
            downloader,
            tracker,
            runtime,
            store,
        }
    }

    #[test]
    fn test_transfer_progress_stays_in_band() {
        assert_eq!(transfer_progress(0, 2, 0, None), 10);
        assert_eq!(transfer_progress(0, 2, 50, Some(100)), 25);
        assert_eq!(transfer_progress(1, 2, 0, Some(100)), 40);
        assert_eq!(transfer_progress(2, 2, 0, None), 70);
        assert_eq!(transfer_progress(0, 0, 10, Some(5)), 70);
    }

    #[tokio::test]
    async fn test_foreground_download_loads_model() {
        let mut server = mockito::Server::new_async().await;
        let _listing = server
            .mock("GET", "/api/models/example/model-a")
            .with_body(r#"{"siblings":[{"rfilename":"ggml-model-i2_s.gguf"}]}"#)
            .create_async()
            .await;
        let _file = server
            .mock("GET", "/example/model-a/resolve/main/ggml-model-i2_s.gguf")
            .with_body("GGUF")
            .create_async()
            .await;

        let f = fixture(&server.url());
        let (job, model) = f.downloader.download("example/model-a").await.unwrap();

        let record = f.tracker.get(&job).unwrap();
        assert_eq!(record.progress, 100);
        assert!(record.error.is_none());
        assert_eq!(model.name, "model-a");
        assert_eq!(f.runtime.snapshot().unwrap().format, ModelFormat::QuantizedBinary);
        assert!(f.store.entry_dir("model-a").join("ggml-model-i2_s.gguf").is_file());
    }

    #[tokio::test]
    async fn test_failed_download_keeps_current_model() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/models/example/gone")
            .with_status(404)
            .create_async()
            .await;

        let f = fixture(&server.url());
        let existing = f.store.entry_dir("existing");
        std::fs::create_dir_all(&existing).unwrap();
        std::fs::write(existing.join("m.gguf"), b"GGUF").unwrap();
        f.runtime.load("existing", &existing).unwrap();

        let err = f.downloader.download("example/gone").await.unwrap_err();
        assert!(matches!(err, PanelError::Acquisition(_)));

        let record = f.tracker.latest();
        assert!(record.progress < 100);
        assert_eq!(
            record.status,
            "Error: Repository example/gone not found on the hub"
        );
        assert_eq!(
            record.error.as_deref(),
            Some("Repository example/gone not found on the hub")
        );
        assert_eq!(f.runtime.current().unwrap().name, "existing");
    }

    #[tokio::test]
    async fn test_dropped_foreground_download_fails_job() {
        // accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hub = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let f = fixture(&format!("http://{}", addr));
        let outcome = tokio::time::timeout(
            Duration::from_millis(200),
            f.downloader.download("example/model-a"),
        )
        .await;
        assert!(outcome.is_err(), "download should still be waiting on the hub");

        let record = f.tracker.latest();
        assert!(!record.is_downloading);
        assert_eq!(record.error.as_deref(), Some(REASON_CANCELLED));
        assert_eq!(record.status, format!("Error: {}", REASON_CANCELLED));
        assert!(record.finished_at.is_some());

        let much_later = chrono::Utc::now() + chrono::Duration::days(365);
        assert_eq!(f.tracker.sweep(much_later), 1);
        assert!(f.tracker.is_empty());
    }

    #[tokio::test]
    async fn test_finished_job_is_untouched_by_guard() {
        let f = fixture("http://127.0.0.1:9");
        let job = f.tracker.begin("example/model-a");
        f.tracker.complete(&job);
        drop(JobGuard {
            tracker: &f.tracker,
            job: &job,
        });
        let record = f.tracker.get(&job).unwrap();
        assert_eq!(record.progress, 100);
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_invalid_id_creates_no_job() {
        let f = fixture("http://127.0.0.1:9");
        let err = f.downloader.start("a/b/c").unwrap_err();
        assert!(matches!(err, PanelError::InvalidModelId(_)));
        assert!(f.tracker.is_empty());
    }
}
