use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{self, JoinHandle};
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::scanner::DirectoryScanner;
use super::DetectedFile;
use crate::config::WatchConfig;
use crate::error::Error;

const COMMAND_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatcherStatus {
    pub is_running: bool,
    pub watched_dir: PathBuf,
    pub poll_interval_ms: u64,
    /// Paths in the processed registry (in flight or failed).
    pub processed_count: usize,
    /// Paths still waiting to become stable.
    pub pending_count: usize,
    pub failed_count: usize,
}

#[derive(Debug)]
enum WatcherCommand {
    Start,
    Stop,
    TriggerScan(oneshot::Sender<usize>),
    MarkProcessed(PathBuf),
    MarkFailed(PathBuf, String),
    RetryFailed(oneshot::Sender<Vec<PathBuf>>),
    Status(oneshot::Sender<WatcherStatus>),
}

/// Cloneable handle to the watcher task. Every registry change goes through it.
#[derive(Debug, Clone)]
pub struct WatcherHandle {
    tx: mpsc::Sender<WatcherCommand>,
}

/// Spawn the watcher task in the stopped state.
///
/// Returns the handle, the discovery stream and the task's join handle. The
/// task exits once every handle has been dropped.
pub fn spawn_watcher(
    config: &WatchConfig,
    discovery_capacity: usize,
) -> (WatcherHandle, mpsc::Receiver<DetectedFile>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
    let (discovered_tx, discovered_rx) = mpsc::channel(discovery_capacity.max(1));

    let actor = WatcherActor {
        scanner: Arc::new(Mutex::new(DirectoryScanner::new(config))),
        watched_dir: config.dir.clone(),
        poll_interval: config.poll_interval(),
        running: false,
        discovered: discovered_tx,
    };
    let join = tokio::spawn(actor.run(rx));
    (WatcherHandle { tx }, discovered_rx, join)
}

impl WatcherHandle {
    pub async fn start(&self) -> Result<(), Error> {
        self.send(WatcherCommand::Start).await
    }

    /// Halt future polls. Imports already dispatched keep running.
    pub async fn stop(&self) -> Result<(), Error> {
        self.send(WatcherCommand::Stop).await
    }

    /// Run one poll now, returning how many files it surfaced.
    pub async fn trigger_scan(&self) -> Result<usize, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(WatcherCommand::TriggerScan(reply)).await?;
        rx.await.map_err(|_| closed())
    }

    pub async fn mark_processed(&self, path: PathBuf) -> Result<(), Error> {
        self.send(WatcherCommand::MarkProcessed(path)).await
    }

    pub async fn mark_failed(&self, path: PathBuf, error: impl Into<String>) -> Result<(), Error> {
        self.send(WatcherCommand::MarkFailed(path, error.into()))
            .await
    }

    /// Make every failed path eligible for rediscovery.
    pub async fn retry_failed(&self) -> Result<Vec<PathBuf>, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(WatcherCommand::RetryFailed(reply)).await?;
        rx.await.map_err(|_| closed())
    }

    pub async fn status(&self) -> Result<WatcherStatus, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(WatcherCommand::Status(reply)).await?;
        rx.await.map_err(|_| closed())
    }

    async fn send(&self, cmd: WatcherCommand) -> Result<(), Error> {
        self.tx.send(cmd).await.map_err(|_| closed())
    }
}

fn closed() -> Error {
    Error::Watcher("watcher task has shut down".to_string())
}

struct WatcherActor {
    scanner: Arc<Mutex<DirectoryScanner>>,
    watched_dir: PathBuf,
    poll_interval: Duration,
    running: bool,
    discovered: mpsc::Sender<DetectedFile>,
}

impl WatcherActor {
    async fn run(mut self, mut rx: mpsc::Receiver<WatcherCommand>) {
        let mut ticker = new_ticker(self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick(), if self.running => {
                    self.poll().await;
                }
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd, &mut ticker).await,
                    None => break,
                },
            }
        }
        debug!("Watcher for {} exited", self.watched_dir.display());
    }

    async fn handle(&mut self, cmd: WatcherCommand, ticker: &mut Interval) {
        match cmd {
            WatcherCommand::Start => {
                if !self.running {
                    info!(
                        "Watching {} every {}ms",
                        self.watched_dir.display(),
                        self.poll_interval.as_millis()
                    );
                    self.running = true;
                    *ticker = new_ticker(self.poll_interval);
                }
            }
            WatcherCommand::Stop => {
                if self.running {
                    info!("Stopped watching {}", self.watched_dir.display());
                }
                self.running = false;
            }
            WatcherCommand::TriggerScan(reply) => {
                let count = self.poll().await;
                let _ = reply.send(count);
            }
            WatcherCommand::MarkProcessed(path) => {
                if self.lock().registry_mut().mark_processed(&path) {
                    debug!("Marked {} processed", path.display());
                }
            }
            WatcherCommand::MarkFailed(path, error) => {
                debug!("Marked {} failed: {}", path.display(), error);
                self.lock().registry_mut().mark_failed(&path, error);
            }
            WatcherCommand::RetryFailed(reply) => {
                let cleared = self.lock().registry_mut().retry_failed();
                if !cleared.is_empty() {
                    info!("{} failed imports cleared for retry", cleared.len());
                }
                let _ = reply.send(cleared);
            }
            WatcherCommand::Status(reply) => {
                let status = {
                    let scanner = self.lock();
                    WatcherStatus {
                        is_running: self.running,
                        watched_dir: self.watched_dir.clone(),
                        poll_interval_ms: self.poll_interval.as_millis() as u64,
                        processed_count: scanner.registry().len(),
                        pending_count: scanner.tracker().len(),
                        failed_count: scanner.registry().failed_count(),
                    }
                };
                let _ = reply.send(status);
            }
        }
    }

    /// Walk the directory on the blocking pool and forward what became stable.
    async fn poll(&mut self) -> usize {
        let scanner = Arc::clone(&self.scanner);
        let result = task::spawn_blocking(move || {
            let mut guard = scanner.lock().unwrap_or_else(PoisonError::into_inner);
            guard.scan(Instant::now())
        })
        .await;

        let detected = match result {
            Ok(detected) => detected,
            Err(e) => {
                error!("Scan of {} failed: {}", self.watched_dir.display(), e);
                return 0;
            }
        };

        let count = detected.len();
        for file in detected {
            info!("Detected {} ({} bytes)", file.file_name, file.file_size_bytes);
            let path = file.path.clone();
            if self.discovered.send(file).await.is_err() {
                warn!("No consumer for discovery of {}", path.display());
                self.lock()
                    .registry_mut()
                    .mark_failed(&path, "no consumer for discovery");
            }
        }
        count
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryScanner> {
        self.scanner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn new_ticker(period: Duration) -> Interval {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn fast_config(dir: &std::path::Path) -> WatchConfig {
        let mut config = WatchConfig::new(dir);
        config.poll_interval_ms = 20;
        config.stable_duration_ms = 0;
        config
    }

    #[tokio::test]
    async fn test_trigger_scan_and_acknowledgements() {
        let tmp = tempdir().unwrap();
        let book = tmp.path().join("book.epub");
        fs::write(&book, b"content").unwrap();

        let (handle, mut discovered, _join) = spawn_watcher(&fast_config(tmp.path()), 8);

        // First sighting seeds the tracker, second reports it stable
        assert_eq!(handle.trigger_scan().await.unwrap(), 0);
        assert_eq!(handle.trigger_scan().await.unwrap(), 1);
        let file = discovered.recv().await.unwrap();
        assert_eq!(file.path, book);

        let status = handle.status().await.unwrap();
        assert!(!status.is_running);
        assert_eq!(status.processed_count, 1);
        assert_eq!(status.pending_count, 0);

        handle.mark_failed(book.clone(), "boom").await.unwrap();
        assert_eq!(handle.trigger_scan().await.unwrap(), 0);
        assert_eq!(handle.status().await.unwrap().failed_count, 1);

        let cleared = handle.retry_failed().await.unwrap();
        assert_eq!(cleared, vec![book.clone()]);
        handle.trigger_scan().await.unwrap();
        assert_eq!(handle.trigger_scan().await.unwrap(), 1);
        discovered.recv().await.unwrap();

        handle.mark_processed(book).await.unwrap();
        assert_eq!(handle.status().await.unwrap().processed_count, 0);
    }

    #[tokio::test]
    async fn test_start_polls_until_stopped() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), b"hello").unwrap();

        let (handle, mut discovered, _join) = spawn_watcher(&fast_config(tmp.path()), 8);
        handle.start().await.unwrap();
        let file = time::timeout(Duration::from_secs(5), discovered.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.file_name, "a.txt");
        assert!(handle.status().await.unwrap().is_running);

        handle.stop().await.unwrap();
        assert!(!handle.status().await.unwrap().is_running);
    }
}
