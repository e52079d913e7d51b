//! Upload worker queue.
//!
//! - Small pool of worker threads, each with its own store connection
//! - Requests in over a bounded flume channel, results out over an unbounded one
//! - The UI thread polls results without blocking and reloads the grid

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use flume::{Receiver, Sender};
use tracing::{debug, error, trace, warn};

use crate::catalog::Library;
use crate::config::AppPaths;
use crate::media::{HeaderProbe, MediaDecoder};
use crate::models::{MediaRecord, UNASSIGNED_POSITION};

const DEFAULT_WORKERS: usize = 2;
const MAX_WORKERS: usize = 4;
const MAX_QUEUE_SIZE: usize = 64;
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// An upload to run off the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportRequest {
    Image {
        campus_id: i64,
        path: PathBuf,
        /// Defaults to the file stem.
        name: Option<String>,
        position: i64,
    },
    Video {
        campus_id: i64,
        path: PathBuf,
        position: i64,
    },
}

impl ImportRequest {
    pub fn image(campus_id: i64, path: impl Into<PathBuf>) -> Self {
        Self::Image {
            campus_id,
            path: path.into(),
            name: None,
            position: UNASSIGNED_POSITION,
        }
    }

    pub fn video(campus_id: i64, path: impl Into<PathBuf>) -> Self {
        Self::Video {
            campus_id,
            path: path.into(),
            position: UNASSIGNED_POSITION,
        }
    }

    pub fn campus_id(&self) -> i64 {
        match self {
            Self::Image { campus_id, .. } | Self::Video { campus_id, .. } => *campus_id,
        }
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Image { path, .. } | Self::Video { path, .. } => path,
        }
    }
}

/// Outcome of one request, sent back to the polling thread.
#[derive(Debug, Clone)]
pub struct ImportResult {
    pub request: ImportRequest,
    /// The stored record, or the error message.
    pub outcome: std::result::Result<MediaRecord, String>,
}

impl ImportResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

pub struct ImportQueue {
    request_tx: Option<Sender<ImportRequest>>,
    result_rx: Receiver<ImportResult>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    /// Queued plus in-flight requests.
    pending: Arc<AtomicUsize>,
}

impl ImportQueue {
    fn start(workers: usize, paths: AppPaths, decoder: Arc<dyn MediaDecoder>) -> Result<Self> {
        let num_workers = workers.clamp(1, MAX_WORKERS);

        let (request_tx, request_rx) = flume::bounded(MAX_QUEUE_SIZE);
        let (result_tx, result_rx) = flume::unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let pending = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let rx = request_rx.clone();
            let tx = result_tx.clone();
            let shutdown = Arc::clone(&shutdown);
            let pending = Arc::clone(&pending);
            let paths = paths.clone();
            let decoder = Arc::clone(&decoder);

            let handle = thread::Builder::new()
                .name(format!("import-worker-{}", worker_id))
                .spawn(move || {
                    worker_loop(worker_id, rx, tx, shutdown, pending, paths, decoder);
                })
                .context("Failed to spawn import worker")?;
            handles.push(handle);
        }

        debug!(num_workers, "Started import worker queue");

        Ok(Self {
            request_tx: Some(request_tx),
            result_rx,
            workers: handles,
            shutdown,
            pending,
        })
    }

    /// Queues a request. Returns false when the queue is full or shut down.
    pub fn submit(&self, request: ImportRequest) -> bool {
        let Some(tx) = self.request_tx.as_ref() else {
            return false;
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        match tx.try_send(request) {
            Ok(()) => true,
            Err(flume::TrySendError::Full(request)) => {
                warn!(path = ?request.path(), "Import queue full, dropping request");
                self.pending.fetch_sub(1, Ordering::SeqCst);
                false
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                error!("Import queue disconnected");
                self.pending.fetch_sub(1, Ordering::SeqCst);
                false
            }
        }
    }

    /// Completed imports (non-blocking).
    pub fn poll_results(&self) -> Vec<ImportResult> {
        self.result_rx.try_iter().collect()
    }

    /// Waits up to `timeout` for the next result.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ImportResult> {
        self.result_rx.recv_timeout(timeout).ok()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.pending_count() > 0
    }

    /// Stops taking requests and joins the workers. Requests still queued
    /// are dropped; one already being processed runs to completion.
    pub fn shutdown(&mut self) {
        debug!("Shutting down import queue");
        self.shutdown.store(true, Ordering::SeqCst);
        self.request_tx = None;

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("Import worker panicked");
            }
        }
        debug!("Import queue shutdown complete");
    }
}

impl Drop for ImportQueue {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown();
        }
    }
}

fn worker_loop(
    worker_id: usize,
    rx: Receiver<ImportRequest>,
    tx: Sender<ImportResult>,
    shutdown: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
    paths: AppPaths,
    decoder: Arc<dyn MediaDecoder>,
) {
    debug!(worker_id, "Import worker started");

    let library = match Library::open(paths, decoder) {
        Ok(library) => Some(library),
        Err(e) => {
            error!(worker_id, "Import worker could not open the catalog: {}", e);
            None
        }
    };

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(request) => {
                let outcome = match library.as_ref() {
                    Some(library) => process_request(library, &request),
                    None => Err("catalog unavailable".to_string()),
                };
                if let Err(e) = &outcome {
                    warn!(worker_id, path = ?request.path(), "Import failed: {}", e);
                }

                pending.fetch_sub(1, Ordering::SeqCst);
                if let Err(e) = tx.send(ImportResult { request, outcome }) {
                    warn!(worker_id, error = ?e, "Failed to send import result");
                }
            }
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(worker_id, "Import worker stopped");
}

fn process_request(
    library: &Library,
    request: &ImportRequest,
) -> std::result::Result<MediaRecord, String> {
    trace!(?request, "Processing import request");

    let record = match request {
        ImportRequest::Image {
            campus_id,
            path,
            name,
            position,
        } => library
            .upload_image(*campus_id, path, name.as_deref(), *position)
            .map(MediaRecord::from),
        ImportRequest::Video {
            campus_id,
            path,
            position,
        } => library
            .upload_video(*campus_id, path, *position)
            .map(MediaRecord::from),
    };
    record.map_err(|e| e.to_string())
}

/// Builder for [`ImportQueue`].
pub struct ImportQueueBuilder {
    workers: usize,
    paths: AppPaths,
    decoder: Arc<dyn MediaDecoder>,
}

impl ImportQueueBuilder {
    pub fn new(paths: AppPaths) -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            paths,
            decoder: Arc::new(HeaderProbe),
        }
    }

    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count;
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn MediaDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn build(self) -> Result<ImportQueue> {
        ImportQueue::start(self.workers, self.paths, self.decoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{library, write_mp4, write_png};
    use crate::models::MediaKind;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(10);

    fn collect(queue: &ImportQueue, count: usize) -> Vec<ImportResult> {
        (0..count)
            .map(|_| queue.recv_timeout(WAIT).expect("import result"))
            .collect()
    }

    #[test]
    fn test_image_imports_are_stored() {
        let temp = TempDir::new().unwrap();
        let library = library(&temp);
        let campus = library.create_campus("Pics", MediaKind::Image).unwrap();

        let queue = ImportQueueBuilder::new(library.paths().clone())
            .workers(1)
            .build()
            .unwrap();
        for name in ["a.png", "b.png", "c.png"] {
            assert!(queue.submit(ImportRequest::image(campus.id, write_png(temp.path(), name))));
        }

        let results = collect(&queue, 3);
        assert!(results.iter().all(ImportResult::is_ok));
        assert_eq!(queue.pending_count(), 0);

        let mut positions: Vec<i64> = library
            .list_images(campus.id)
            .unwrap()
            .iter()
            .map(|i| i.position)
            .collect();
        positions.sort_unstable();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn test_failures_are_reported() {
        let temp = TempDir::new().unwrap();
        let library = library(&temp);
        let campus = library.create_campus("Pics", MediaKind::Image).unwrap();

        let queue = ImportQueueBuilder::new(library.paths().clone())
            .workers(1)
            .build()
            .unwrap();
        queue.submit(ImportRequest::image(campus.id, temp.path().join("missing.png")));
        queue.submit(ImportRequest::video(campus.id, write_mp4(temp.path(), "a.mp4")));

        let results = collect(&queue, 2);
        assert!(results.iter().all(|r| !r.is_ok()));
        assert!(library.list_images(campus.id).unwrap().is_empty());
        // The video never landed in the wrong campus, so nothing was copied
        assert_eq!(
            std::fs::read_dir(library.paths().videos_dir()).unwrap().count(),
            0
        );
    }

    #[test]
    fn test_video_imports_with_several_workers() {
        let temp = TempDir::new().unwrap();
        let library = library(&temp);
        let campus = library.create_campus("Clips", MediaKind::Video).unwrap();

        let mut queue = ImportQueueBuilder::new(library.paths().clone())
            .workers(3)
            .build()
            .unwrap();
        for i in 0..4 {
            let source = write_mp4(temp.path(), &format!("clip{i}.mp4"));
            assert!(queue.submit(ImportRequest::Video {
                campus_id: campus.id,
                path: source,
                position: 10 + i,
            }));
        }

        let results = collect(&queue, 4);
        assert!(results.iter().all(ImportResult::is_ok));
        queue.shutdown();
        assert!(!queue.submit(ImportRequest::video(campus.id, "late.mp4")));

        let mut positions: Vec<i64> = library
            .list_videos(campus.id)
            .unwrap()
            .iter()
            .map(|v| v.position)
            .collect();
        positions.sort_unstable();
        assert_eq!(positions, vec![10, 11, 12, 13]);
        assert!(queue.poll_results().is_empty());
    }
}
