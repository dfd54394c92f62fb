use crate::config::Settings;
use crate::engine::MediaEngine;
use crate::flash::FlashSigner;
use crate::jobs::JobRegistry;
use crate::progress::ProgressTracker;
use crate::store::FileStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub engine: Arc<dyn MediaEngine>,
    pub progress: ProgressTracker,
    pub jobs: JobRegistry,
    pub store: FileStore,
    pub flash: FlashSigner,
}

impl AppState {
    pub fn new(settings: Settings, engine: Arc<dyn MediaEngine>) -> Self {
        let store = FileStore::new(settings.downloads_dir.clone(), settings.sentinel_name.clone());
        let (secret, _) = settings.session_secret();
        let flash = FlashSigner::new(secret);

        Self {
            settings,
            engine,
            progress: ProgressTracker::new(),
            jobs: JobRegistry::new(),
            store,
            flash,
        }
    }
}
