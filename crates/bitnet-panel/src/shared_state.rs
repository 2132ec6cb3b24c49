//! Shared state handed to every handler.
//!
//! Components are built once at startup and shared through `Arc`s; handlers
//! clone the cheap `PanelState` handle.

use std::sync::Arc;
use std::time::Duration;

use crate::{
    acquisition::{EnvironmentSetup, HubClient, ModelDownloader, ProgressTracker},
    config::Config,
    error::PanelResult,
    model_runtime::RuntimeManager,
    model_store::ModelStore,
};

#[derive(Clone)]
pub struct PanelState {
    pub config: Arc<Config>,
    pub store: ModelStore,
    pub tracker: Arc<ProgressTracker>,
    pub runtime: Arc<RuntimeManager>,
    pub downloader: Arc<ModelDownloader>,
}

impl PanelState {
    /// Open the model store and wire the components together.
    pub fn new(config: Config) -> PanelResult<Self> {
        let store = ModelStore::open(config.models_dir.clone())?;
        let tracker = Arc::new(ProgressTracker::new(Duration::from_secs(
            config.progress_ttl_seconds,
        )));
        let runtime = Arc::new(RuntimeManager::new(&config));
        let downloader = Arc::new(ModelDownloader::new(
            HubClient::new(&config.hub_endpoint, config.hub_token.clone()),
            store.clone(),
            tracker.clone(),
            runtime.clone(),
            EnvironmentSetup::new(config.setup_command.clone(), config.quant_type.clone()),
            config.hub_namespace.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            store,
            tracker,
            runtime,
            downloader,
        })
    }

    /// Load a model that is already in the store by directory name.
    pub fn load_stored(&self, name: &str) -> PanelResult<()> {
        let dir = self.store.find(name)?;
        self.runtime.load(name, &dir)?;
        Ok(())
    }
}
