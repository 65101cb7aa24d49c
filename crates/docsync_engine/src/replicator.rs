//! Async driver routing frames to per-collection workers.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::registry::StoreRegistry;
use crate::transport::FrameSource;
use docsync_protocol::Frame;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Counters for one replication run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationStats {
    /// Frames read from the source.
    pub frames: u64,
    /// Collections that received at least one frame.
    pub collections: usize,
}

struct Worker {
    tx: mpsc::Sender<Frame>,
    handle: JoinHandle<EngineResult<()>>,
}

/// Reads frames from a source and applies them through a registry.
///
/// Each collection gets its own worker task, so batches for one collection
/// apply in delivery order while different collections proceed
/// independently.
pub struct Replicator {
    registry: Arc<StoreRegistry>,
    config: EngineConfig,
}

impl Replicator {
    /// Creates a replicator over `registry`.
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        let config = registry.config().clone();
        Self { registry, config }
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    /// Drains `source` until it is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the source's error, or the first error a collection worker
    /// stopped with. Workers already running are drained before returning.
    ///
    /// Whatever the outcome, a batch left unfinished on any collection this
    /// run touched is aborted, so observers resume and the next run can
    /// open a new batch.
    pub async fn run<S: FrameSource>(&self, mut source: S) -> EngineResult<ReplicationStats> {
        let mut workers: HashMap<String, Worker> = HashMap::new();
        let mut touched: BTreeSet<String> = BTreeSet::new();
        let mut stats = ReplicationStats::default();

        let outcome = loop {
            let frame = match source.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            };
            stats.frames += 1;

            let collection = frame.collection().to_string();
            touched.insert(collection.clone());
            let worker = workers
                .entry(collection.clone())
                .or_insert_with(|| self.spawn_worker(&collection));
            if worker.tx.send(frame).await.is_err() {
                // The worker only drops its receiver after failing.
                if let Some(worker) = workers.remove(&collection) {
                    break Err(join_worker(&collection, worker.handle).await);
                }
            }
        };

        stats.collections = touched.len();
        let mut first_error = outcome.err();
        for (collection, worker) in workers {
            drop(worker.tx);
            if let Err(err) = flatten(&collection, worker.handle.await) {
                first_error.get_or_insert(err);
            }
        }
        for collection in &touched {
            self.registry.abort_open_batch(collection);
        }
        debug!(frames = stats.frames, collections = stats.collections, "replication finished");
        match first_error {
            Some(err) => Err(err),
            None => Ok(stats),
        }
    }

    fn spawn_worker(&self, collection: &str) -> Worker {
        let (tx, mut rx) = mpsc::channel::<Frame>(self.config.worker_queue_capacity.max(1));
        let registry = Arc::clone(&self.registry);
        let name = collection.to_string();
        debug!(collection, "starting collection worker");

        let handle = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(err) = registry.dispatch(frame) {
                    error!(collection = %name, error = %err, "collection worker aborted");
                    return Err(err);
                }
            }
            Ok(())
        });
        Worker { tx, handle }
    }
}

impl std::fmt::Debug for Replicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

async fn join_worker(collection: &str, handle: JoinHandle<EngineResult<()>>) -> EngineError {
    match flatten(collection, handle.await) {
        Err(err) => err,
        Ok(()) => EngineError::WorkerStopped {
            collection: collection.to_string(),
            message: "worker exited early".into(),
        },
    }
}

fn flatten(
    collection: &str,
    joined: Result<EngineResult<()>, tokio::task::JoinError>,
) -> EngineResult<()> {
    joined.map_err(|e| EngineError::WorkerStopped {
        collection: collection.to_string(),
        message: e.to_string(),
    })?
}
