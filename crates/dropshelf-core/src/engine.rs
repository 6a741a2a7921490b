use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::Error;
use crate::import::{ImportOrchestrator, ImportResult};
use crate::watcher::{spawn_watcher, DetectedFile, DirectoryScanner, WatcherHandle, WatcherStatus};

/// Host-facing entry point: a watcher plus a bounded pool of import tasks.
///
/// Each discovered file is imported on its own task and acknowledged back to the
/// watcher as processed (success or duplicate) or failed.
pub struct ImportEngine {
    config: AppConfig,
    watcher: WatcherHandle,
    watcher_task: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl ImportEngine {
    /// Spawn the watcher and dispatcher. Must be called inside a tokio runtime.
    /// The watcher starts stopped; call [`start`](Self::start) to begin polling.
    pub fn spawn(config: AppConfig, orchestrator: Arc<ImportOrchestrator>) -> Self {
        let limit = config.import.max_concurrent.max(1);
        let (watcher, discovered, watcher_task) = spawn_watcher(&config.watch, limit * 4);
        let dispatcher = tokio::spawn(dispatch(
            discovered,
            orchestrator,
            watcher.clone(),
            Arc::new(Semaphore::new(limit)),
        ));
        info!(
            "Import engine ready for {} ({} concurrent imports)",
            config.watch.dir.display(),
            limit
        );

        Self {
            config,
            watcher,
            watcher_task,
            dispatcher,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn watcher(&self) -> &WatcherHandle {
        &self.watcher
    }

    pub async fn start(&self) -> Result<(), Error> {
        self.watcher.start().await
    }

    pub async fn stop(&self) -> Result<(), Error> {
        self.watcher.stop().await
    }

    pub async fn trigger_scan(&self) -> Result<usize, Error> {
        self.watcher.trigger_scan().await
    }

    pub async fn status(&self) -> Result<WatcherStatus, Error> {
        self.watcher.status().await
    }

    /// Clear every failed path so the next poll may pick it up again.
    pub async fn retry_failed(&self) -> Result<Vec<PathBuf>, Error> {
        let cleared = self.watcher.retry_failed().await?;
        if !cleared.is_empty() {
            info!("{} failed files queued for retry", cleared.len());
        }
        Ok(cleared)
    }

    /// Stop polling and release the watcher.
    ///
    /// Imports already running keep their own handles, finish, and acknowledge;
    /// the watcher task exits after the last of them.
    pub async fn shutdown(self) {
        if let Err(e) = self.watcher.stop().await {
            debug!("Watcher already gone: {}", e);
        }
        self.dispatcher.abort();
        if let Err(e) = self.dispatcher.await {
            if !e.is_cancelled() {
                warn!("Dispatcher ended abnormally: {}", e);
            }
        }
        drop(self.watcher);
        if let Err(e) = self.watcher_task.await {
            warn!("Watcher task ended abnormally: {}", e);
        }
        info!("Import engine stopped");
    }
}

async fn dispatch(
    mut discovered: mpsc::Receiver<DetectedFile>,
    orchestrator: Arc<ImportOrchestrator>,
    watcher: WatcherHandle,
    limit: Arc<Semaphore>,
) {
    while let Some(file) = discovered.recv().await {
        let Ok(permit) = Arc::clone(&limit).acquire_owned().await else {
            break;
        };
        let orchestrator = Arc::clone(&orchestrator);
        let watcher = watcher.clone();

        tokio::spawn(async move {
            let result = {
                let _permit = permit;
                orchestrator.import(&file).await
            };
            acknowledge(&watcher, &file, &result).await;
        });
    }
    debug!("Discovery channel closed, dispatcher exiting");
}

async fn acknowledge(watcher: &WatcherHandle, file: &DetectedFile, result: &ImportResult) {
    let ack = if result.success {
        watcher.mark_processed(file.path.clone()).await
    } else {
        let reason = result.error.clone().unwrap_or_default();
        watcher.mark_failed(file.path.clone(), reason).await
    };
    if let Err(e) = ack {
        warn!("Could not acknowledge {}: {}", file.path.display(), e);
    }
}

/// Import every supported file currently in the watched directory, one at a
/// time, without waiting for stability.
pub async fn import_existing(
    config: &AppConfig,
    orchestrator: &ImportOrchestrator,
) -> Result<Vec<(DetectedFile, ImportResult)>, Error> {
    let watch = config.watch.clone();
    let candidates = tokio::task::spawn_blocking(move || DirectoryScanner::new(&watch).list_candidates())
        .await
        .map_err(|e| Error::Other(format!("directory listing failed: {}", e)))?;
    info!("Found {} files to import", candidates.len());

    let mut outcomes = Vec::with_capacity(candidates.len());
    for file in candidates {
        let result = orchestrator.import(&file).await;
        outcomes.push((file, result));
    }
    Ok(outcomes)
}
