//! Folder watcher: cold-start replay, then live `notify` events handled on
//! one observer thread.

use crate::automation::engine::RuleEngine;
use crate::primitives::WATCH_POLL_INTERVAL_MS;
use crate::types::GemdError;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Watcher options.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Replay files already present before watching.
    pub instantiate_build: bool,
    pub poll_interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            instantiate_build: false,
            poll_interval: Duration::from_millis(WATCH_POLL_INTERVAL_MS),
        }
    }
}

/// Feeds new paths in the files and gemd folders to a [`RuleEngine`].
///
/// Handler calls run serially on the observer thread. Failures are logged
/// by the engine and collected until [`FolderWatcher::stop`]. Removing an
/// input clears its record, so a file dropped again fires its rule again.
#[derive(Debug)]
pub struct FolderWatcher {
    engine: Arc<Mutex<RuleEngine>>,
    options: WatchOptions,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Vec<GemdError>>>,
}

impl FolderWatcher {
    #[must_use]
    pub fn new(engine: RuleEngine, options: WatchOptions) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            options,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// The engine, shared with the observer thread while running.
    #[must_use]
    pub fn engine(&self) -> Arc<Mutex<RuleEngine>> {
        Arc::clone(&self.engine)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Replay if configured, then start live monitoring.
    ///
    /// Replay completes before the observer is installed, so replayed files
    /// are never interleaved with live events. Returns the files written by
    /// the replay.
    pub fn start(&mut self) -> Result<Vec<PathBuf>, GemdError> {
        if self.thread.is_some() {
            return Ok(Vec::new());
        }
        let replayed = if self.options.instantiate_build {
            self.engine.lock().replay()?
        } else {
            Vec::new()
        };

        let (files_folder, gemd_folder) = {
            let engine = self.engine.lock();
            (engine.files_folder().to_path_buf(), engine.gemd_folder().to_path_buf())
        };

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if tx.send(res).is_err() {
                    debug!("Observer gone, watch event dropped");
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| GemdError::WatchError(e.to_string()))?;
        watcher
            .watch(&files_folder, RecursiveMode::Recursive)
            .map_err(|e| GemdError::WatchError(format!("{}: {}", files_folder.display(), e)))?;
        if !gemd_folder.starts_with(&files_folder) {
            watcher
                .watch(&gemd_folder, RecursiveMode::NonRecursive)
                .map_err(|e| GemdError::WatchError(format!("{}: {}", gemd_folder.display(), e)))?;
        }

        self.stop.store(false, Ordering::SeqCst);
        let engine = Arc::clone(&self.engine);
        let stop = Arc::clone(&self.stop);
        let poll = self.options.poll_interval;
        let thread = std::thread::Builder::new()
            .name("gemdflow-watcher".to_string())
            .spawn(move || {
                // Dropping the watcher ends event delivery.
                let _watcher = watcher;
                observe(&engine, &rx, &stop, poll, &files_folder, &gemd_folder)
            })
            .map_err(|e| GemdError::WatchError(e.to_string()))?;
        self.thread = Some(thread);
        info!(replayed = replayed.len(), "Watcher started");
        Ok(replayed)
    }

    /// Stop the observer thread and return the failures it saw.
    pub fn stop(&mut self) -> Result<Vec<GemdError>, GemdError> {
        let Some(thread) = self.thread.take() else {
            return Ok(Vec::new());
        };
        self.stop.store(true, Ordering::SeqCst);
        let failures = thread
            .join()
            .map_err(|_| GemdError::WatchError("observer thread panicked".to_string()))?;
        info!(failures = failures.len(), "Watcher stopped");
        Ok(failures)
    }
}

impl Drop for FolderWatcher {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.stop();
        }
    }
}

fn observe(
    engine: &Mutex<RuleEngine>,
    rx: &mpsc::Receiver<notify::Result<Event>>,
    stop: &AtomicBool,
    poll: Duration,
    files_folder: &Path,
    gemd_folder: &Path,
) -> Vec<GemdError> {
    let mut failures = Vec::new();
    while !stop.load(Ordering::SeqCst) {
        let event = match rx.recv_timeout(poll) {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                warn!(error = %e, "Watch event error");
                continue;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if event.kind.is_remove() {
            for path in event.paths.iter().filter(|p| p.starts_with(files_folder)) {
                if engine.lock().forget(path) {
                    debug!(file = %path.display(), "Input removed");
                }
            }
            continue;
        }
        if !event.kind.is_create() {
            continue;
        }
        for path in event.paths {
            if path.starts_with(gemd_folder) {
                engine.lock().handle_gemd_path(&path);
            } else if path.starts_with(files_folder) {
                debug!(file = %path.display(), "New input");
                if let Err(e) = engine.lock().handle_files_path(&path) {
                    failures.push(e);
                }
            }
        }
    }
    failures
}
