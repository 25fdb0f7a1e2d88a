//! Concurrent build pool (§5 / §9): "a typical configuration starts one
//! worker per logical CPU for index construction; each worker consumes
//! jobs from a bounded queue." `BuildPool` fans `Index::insert_node` calls
//! out across a bounded channel and a handful of `task-manager`-tracked
//! workers, and implements the shutdown contract ("drains the worker
//! queue, then persists a snapshot, then releases the Commit Log") as a
//! single `shutdown` call.

use std::path::Path;
use std::sync::Arc;

use task_manager::TaskManager;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};

use crate::commit_log::CommitLogSink;
use crate::distance::Metric;
use crate::error::Error;
use crate::hnsw::{index::Index, NodeId};
use crate::provider::VectorProvider;

struct Job {
    id: NodeId,
    done: oneshot::Sender<Result<(), Error>>,
}

/// A bounded worker pool that serializes `insert_node` calls for a shared
/// `Index` across `workers` tokio tasks pulling from one queue.
pub struct BuildPool {
    sender: mpsc::Sender<Job>,
    manager: TaskManager,
}

impl BuildPool {
    /// Spawn `workers` tasks (one per logical CPU is the typical
    /// configuration per §5), each pulling jobs from a channel of
    /// `queue_capacity` and applying them to the shared `index`.
    pub async fn spawn<D, P, S>(index: Arc<Index<D, P, S>>, workers: usize, queue_capacity: usize) -> Self
    where
        D: Metric + 'static,
        P: VectorProvider + 'static,
        S: CommitLogSink + 'static,
    {
        let (sender, receiver) = mpsc::channel::<Job>(queue_capacity.max(1));
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let manager = TaskManager::new();

        for worker_id in 0..workers.max(1) {
            let index = index.clone();
            let receiver = receiver.clone();
            manager
                .spawn_task_loop(
                    move |guard| async move {
                        loop {
                            let job = {
                                let mut receiver = receiver.lock().await;
                                tokio::select! {
                                    biased;
                                    _ = guard.is_cancelled() => None,
                                    job = receiver.recv() => job,
                                }
                            };
                            match job {
                                Some(Job { id, done }) => {
                                    let result = index.insert_node(id);
                                    let _ = done.send(result);
                                }
                                None => break,
                            }
                        }
                    },
                    format!("hnsw-build-worker-{worker_id}"),
                )
                .await;
        }

        Self { sender, manager }
    }

    /// Enqueue `id` for insertion, resolving once a worker has applied it
    /// (or with the error the insertion failed with).
    pub async fn insert(&self, id: NodeId) -> Result<(), Error> {
        let (done, rx) = oneshot::channel();
        self.sender
            .send(Job { id, done })
            .await
            .map_err(|_| Error::InvalidArgument("build pool is shut down".to_string()))?;
        rx.await
            .map_err(|_| Error::InvalidArgument("build pool worker dropped the job".to_string()))?
    }

    pub fn task_count(&self) -> usize {
        self.manager.task_count()
    }

    /// Drain the queue, persist a snapshot to `snapshot_path`, then cancel
    /// all workers and wait for them to finish — §5's shutdown contract.
    /// The commit log itself is released by dropping `index`'s sink when
    /// the caller drops its last handle to the index.
    pub async fn shutdown<D, P, S>(
        self,
        index: &Index<D, P, S>,
        snapshot_path: impl AsRef<Path>,
    ) -> std::io::Result<()>
    where
        D: Metric,
        P: VectorProvider,
        S: CommitLogSink,
    {
        drop(self.sender);
        self.manager.cancel_all();
        self.manager.wait().await;

        let bytes = crate::snapshot::encode(index, true)?;
        std::fs::write(snapshot_path, bytes)
    }
}
