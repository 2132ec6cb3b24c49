//! Getting models into the store: hub downloads with per-job progress,
//! the optional environment setup step, and direct uploads.
pub mod downloader;
pub mod hub;
pub mod part_file;
pub mod progress;
pub mod setup;
pub mod upload;
pub use downloader::ModelDownloader;
pub use hub::{HubClient, HubModelId};
pub use progress::{DownloadProgress, JobId, ProgressTracker};
pub use setup::{EnvironmentSetup, SetupOutcome};
pub use upload::UploadWriter;
