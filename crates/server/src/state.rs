//! Shared application state: the hot-swappable runtime pointer, the warmup
//! controller, and a shutdown notifier for `/v1/quit`.

use std::sync::Arc;

use tokio::sync::{Notify, RwLock};
use voicereader_jobs::{Runtime, WarmupController};

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RwLock<Arc<Runtime>>>,
    pub warmup: WarmupController,
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(runtime: Arc<Runtime>, warmup: WarmupController) -> Self {
        Self {
            runtime: Arc::new(RwLock::new(runtime)),
            warmup,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub async fn snapshot(&self) -> Arc<Runtime> {
        self.runtime.read().await.clone()
    }
}
