//! Migration Worker Pool: a fixed pool of workers executing individual file
//! moves, plus the dispatcher loop that pulls from the Move Queue and hands
//! work to them.
//!
//! Built on `std::thread` with a fixed pool fed by a `crossbeam-channel`
//! rendezvous channel rather than one thread per call - a zero-capacity
//! channel means a dispatcher `send` blocks until a worker is free, which
//! bounds the number of migrations running concurrently to the size of the
//! pool.

use crate::copier::CopyPrimitive;
use crate::decision::now_secs;
use crate::fswalk::absolute_path;
use crate::model::{MoveRequest, TierRoots};
use crate::queue::{MoveQueue, RetryQueue};
use crate::store::MetadataStore;
use crossbeam_channel::RecvTimeoutError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const MQ_DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);
const TASK_RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Executes a single migration: copy-primitive invocation, parent directory
/// creation, and the Metadata Store update on success.
pub fn migrate_one(
    store: &MetadataStore,
    roots: &TierRoots,
    copier: &dyn CopyPrimitive,
    request: &MoveRequest,
) -> bool {
    let src = absolute_path(roots.path_for(request.source_tier), &request.relative_path);
    let dest = absolute_path(roots.path_for(request.target_tier), &request.relative_path);

    if copier.is_dry_run() {
        // Dry run: log what would happen, create no directories, mutate no
        // store entry. The store must keep reflecting where the file
        // actually is, not where a real migration would have put it.
        let _ = copier.copy_move(&src, &dest);
        return true;
    }

    if !src.exists() {
        // A request whose source no longer exists (e.g. it was already moved
        // by a prior, duplicate enqueue) is tolerated as success.
        tracing::debug!(path = %request.relative_path, "source missing, treating duplicate move as success");
        let _ = store.mutate(&request.relative_path, |existing| {
            existing.map(|mut record| {
                record.tier = request.target_tier;
                record.last_tier_move = Some(now_secs());
                record
            })
        });
        return true;
    }

    if let Some(parent) = dest.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            tracing::warn!(path = %request.relative_path, error = %err, "failed to create destination directory");
            return false;
        }
    }

    match copier.copy_move(&src, &dest) {
        Ok(()) => {
            let mutated = store.mutate(&request.relative_path, |existing| {
                existing.map(|mut record| {
                    record.tier = request.target_tier;
                    record.last_tier_move = Some(now_secs());
                    record
                })
            });
            match mutated {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::debug!(path = %request.relative_path, "no metadata record to update after move");
                }
                Err(err) => {
                    tracing::error!(path = %request.relative_path, error = %err, "failed to persist tier update");
                }
            }
            if let Err(err) = store.flush() {
                tracing::error!(error = %err, "failed to flush metadata store after move");
            }
            tracing::info!(path = %request.relative_path, from = %request.source_tier, to = %request.target_tier, "migration succeeded");
            true
        }
        Err(err) => {
            tracing::warn!(path = %request.relative_path, error = %err, "migration failed, queueing for retry");
            false
        }
    }
}

/// Handles to the dispatcher thread and the fixed worker pool, returned
/// together so the Supervisor can join all of them at shutdown.
pub struct MigrationPool {
    pub dispatcher: JoinHandle<()>,
    pub workers: Vec<JoinHandle<()>>,
}

/// Spawns the dispatcher loop plus `io_threads` workers.
pub fn spawn_pool(
    io_threads: usize,
    store: MetadataStore,
    roots: Arc<TierRoots>,
    copier: Arc<dyn CopyPrimitive>,
    move_queue: MoveQueue,
    retry_queue: RetryQueue,
    shutdown: Arc<AtomicBool>,
) -> MigrationPool {
    // Rendezvous channel: a dispatcher `send` only completes once a worker is
    // ready to `recv`, bounding in-flight migrations at `io_threads`.
    let (task_tx, task_rx) = crossbeam_channel::bounded::<MoveRequest>(0);

    let mut workers = Vec::with_capacity(io_threads);
    for worker_id in 0..io_threads {
        let store = store.clone();
        let roots = Arc::clone(&roots);
        let copier = Arc::clone(&copier);
        let retry_queue = retry_queue.clone();
        let task_rx = task_rx.clone();
        let shutdown = Arc::clone(&shutdown);

        let handle = std::thread::Builder::new()
            .name(format!("tiering-worker-{worker_id}"))
            .spawn(move || worker_loop(&store, &roots, copier.as_ref(), &task_rx, &retry_queue, &shutdown))
            .expect("failed to spawn migration worker thread");
        workers.push(handle);
    }

    let dispatcher = {
        let shutdown = Arc::clone(&shutdown);
        std::thread::Builder::new()
            .name("tiering-dispatcher".to_string())
            .spawn(move || dispatcher_loop(&move_queue, &task_tx, &shutdown))
            .expect("failed to spawn dispatcher thread")
    };

    MigrationPool { dispatcher, workers }
}

/// Blocks on the Move Queue with a 1s timeout, then hands each dequeued
/// request to the next free worker.
fn dispatcher_loop(
    move_queue: &MoveQueue,
    task_tx: &crossbeam_channel::Sender<MoveRequest>,
    shutdown: &AtomicBool,
) {
    loop {
        match move_queue.dequeue_timeout(MQ_DEQUEUE_TIMEOUT) {
            Some(request) => {
                // A blocking send here is fine even under shutdown: it only
                // blocks while at least one worker is still alive to receive
                // it, and crossbeam's rendezvous send returns an error the
                // instant every worker has dropped its receiver, rather than
                // blocking on a channel nothing can ever drain.
                if task_tx.send(request).is_err() {
                    return;
                }
            }
            None => {
                if shutdown.load(Ordering::Acquire) {
                    tracing::info!("dispatcher stopping: shutdown observed and move queue empty");
                    return;
                }
            }
        }
    }
}

/// One worker's loop body: repeatedly take a task with a timeout and execute
/// it; failures go to the Retry Queue. Multiple workers racing on the same
/// rendezvous receiver form a work-stealing pool.
fn worker_loop(
    store: &MetadataStore,
    roots: &TierRoots,
    copier: &dyn CopyPrimitive,
    task_rx: &crossbeam_channel::Receiver<MoveRequest>,
    retry_queue: &RetryQueue,
    shutdown: &AtomicBool,
) {
    loop {
        let request = match task_rx.recv_timeout(TASK_RECV_TIMEOUT) {
            Ok(request) => request,
            Err(RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::Acquire) {
                    return;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => return,
        };

        // The copy primitive's subprocess is allowed to run to completion
        // even mid-shutdown: killing it mid-copy risks leaving the file
        // present in both tiers for no benefit, since the Maintenance
        // Reconciler corrects that on its next pass anyway.
        let succeeded = migrate_one(store, roots, copier, &request);
        if !succeeded {
            retry_queue.enqueue(request);
        }
    }
}
