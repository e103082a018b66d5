//! Supervisor: owns the engine's four background loops (decision, migration
//! dispatch/workers, retry drain, maintenance) and the shutdown signal tying
//! them together.
//!
//! Shutdown is driven by the synchronous `ctrlc` crate rather than an async
//! runtime's signal future, since every loop here runs on a plain OS thread.

use crate::config::TieringConfig;
use crate::copier::{CopyPrimitive, DryRunCopier, SubprocessCopier};
use crate::decision;
use crate::model::TierRoots;
use crate::queue::{MoveQueue, RetryQueue};
use crate::reconciler;
use crate::store::MetadataStore;
use crate::worker::{self, MigrationPool};
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Cap on retries before a failed migration is logged and permanently
/// dropped rather than requeued.
const MAX_RETRIES: u32 = 3;
const RQ_DEQUEUE_TIMEOUT: Duration = Duration::from_secs(60);
const RETRY_REQUEUE_DELAY: Duration = Duration::from_secs(1);
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Pause before retrying a Decision Engine or Maintenance Reconciler pass
/// that panicked, so a persistent fault doesn't spin the loop.
const DECISION_FAULT_BACKOFF: Duration = Duration::from_secs(5);
const MAINTENANCE_FAULT_BACKOFF: Duration = Duration::from_secs(3_600);

/// A running engine: the join handles for every background thread plus the
/// shutdown flag that stops them.
pub struct Supervisor {
    shutdown: Arc<AtomicBool>,
    decision_loop: JoinHandle<()>,
    retry_loop: JoinHandle<()>,
    maintenance_loop: JoinHandle<()>,
    migration_pool: MigrationPool,
    store: MetadataStore,
}

impl Supervisor {
    /// Builds the copy primitive, wires the queues, and spawns all four
    /// loops. Does not install a signal handler itself - call
    /// [`install_signal_handler`] separately, or drive `shutdown` yourself
    /// (tests do the latter).
    pub fn spawn(
        config: TieringConfig,
        store: MetadataStore,
        roots: TierRoots,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let roots = Arc::new(roots);
        let copier: Arc<dyn CopyPrimitive> = if config.dry_run {
            Arc::new(DryRunCopier)
        } else {
            Arc::new(SubprocessCopier::new(config.copy_primitive.clone()))
        };

        let move_queue = MoveQueue::new(1024);
        let retry_queue = RetryQueue::new(1024);

        let migration_pool = worker::spawn_pool(
            config.io_threads,
            store.clone(),
            Arc::clone(&roots),
            Arc::clone(&copier),
            move_queue.clone(),
            retry_queue.clone(),
            Arc::clone(&shutdown),
        );

        let decision_loop = {
            let store = store.clone();
            let roots = Arc::clone(&roots);
            let config = config.clone();
            let move_queue = move_queue.clone();
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new()
                .name("tiering-decision".to_string())
                .spawn(move || decision_loop(&store, &roots, &config, &move_queue, &shutdown))
                .expect("failed to spawn decision engine thread")
        };

        let retry_loop = {
            let move_queue = move_queue.clone();
            let retry_queue = retry_queue.clone();
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new()
                .name("tiering-retry".to_string())
                .spawn(move || retry_drain_loop(&move_queue, &retry_queue, &shutdown))
                .expect("failed to spawn retry drain thread")
        };

        let maintenance_loop = {
            let store = store.clone();
            let roots = Arc::clone(&roots);
            let config = config.clone();
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new()
                .name("tiering-maintenance".to_string())
                .spawn(move || maintenance_loop(&store, &roots, &config, &shutdown))
                .expect("failed to spawn maintenance reconciler thread")
        };

        Supervisor {
            shutdown,
            decision_loop,
            retry_loop,
            maintenance_loop,
            migration_pool,
            store,
        }
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Signals shutdown and blocks until every background thread has exited
    /// in dependency order: the dispatcher stops first so no more work
    /// enters the pool, then the workers drain in flight, then the periodic
    /// loops exit, then the Metadata Store is flushed one last time.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Release);
        tracing::info!("shutdown requested, waiting for background loops to exit");

        let _ = self.migration_pool.dispatcher.join();
        for worker in self.migration_pool.workers {
            let _ = worker.join();
        }
        let _ = self.decision_loop.join();
        let _ = self.retry_loop.join();
        let _ = self.maintenance_loop.join();

        if let Err(err) = self.store.flush() {
            tracing::error!(error = %err, "failed to flush metadata store during shutdown");
        }
        tracing::info!("shutdown complete");
    }
}

/// Installs a `ctrlc` handler that flips `shutdown` on SIGINT/SIGTERM. The
/// handler itself must stay cheap and non-blocking; it only sets the flag,
/// the loops themselves observe it on their next timeout.
pub fn install_signal_handler(shutdown: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        tracing::info!("received shutdown signal");
        shutdown.store(true, Ordering::Release);
    })
}

fn decision_loop(
    store: &MetadataStore,
    roots: &TierRoots,
    config: &TieringConfig,
    move_queue: &MoveQueue,
    shutdown: &AtomicBool,
) {
    while !shutdown.load(Ordering::Acquire) {
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            decision::run_pass(store, roots, config, move_queue);
        }));
        if result.is_err() {
            tracing::error!("decision engine pass panicked, backing off before retrying");
            sleep_interruptible(DECISION_FAULT_BACKOFF, shutdown);
            continue;
        }
        sleep_interruptible(config.tiering_interval(), shutdown);
    }
    tracing::info!("decision engine loop stopped");
}

fn maintenance_loop(
    store: &MetadataStore,
    roots: &TierRoots,
    config: &TieringConfig,
    shutdown: &AtomicBool,
) {
    while !shutdown.load(Ordering::Acquire) {
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            reconciler::run_pass(store, roots);
        }));
        if result.is_err() {
            tracing::error!("maintenance reconciler pass panicked, retrying after backoff");
            sleep_interruptible(MAINTENANCE_FAULT_BACKOFF, shutdown);
            continue;
        }
        sleep_interruptible(config.maintenance_interval(), shutdown);
    }
    tracing::info!("maintenance reconciler loop stopped");
}

/// Drains the Retry Queue: a request under the retry cap is bumped and
/// requeued onto the Move Queue after a short delay; a request at the cap is
/// logged as a permanent failure and dropped.
fn retry_drain_loop(move_queue: &MoveQueue, retry_queue: &RetryQueue, shutdown: &AtomicBool) {
    retry_drain_loop_with_timeout(move_queue, retry_queue, shutdown, RQ_DEQUEUE_TIMEOUT)
}

fn retry_drain_loop_with_timeout(
    move_queue: &MoveQueue,
    retry_queue: &RetryQueue,
    shutdown: &AtomicBool,
    dequeue_timeout: Duration,
) {
    loop {
        match retry_queue.dequeue_timeout(dequeue_timeout) {
            Some(mut request) => {
                if request.retries >= MAX_RETRIES {
                    tracing::error!(
                        path = %request.relative_path,
                        retries = request.retries,
                        "migration permanently failed after exhausting retries"
                    );
                    continue;
                }
                request.retries += 1;
                tracing::warn!(
                    path = %request.relative_path,
                    attempt = request.retries,
                    "requeueing failed migration for retry"
                );
                sleep_interruptible(RETRY_REQUEUE_DELAY, shutdown);
                move_queue.enqueue(request);
            }
            None => {
                if shutdown.load(Ordering::Acquire) && retry_queue.is_empty() {
                    tracing::info!("retry drain loop stopping: shutdown observed and retry queue empty");
                    return;
                }
            }
        }
    }
}

/// Sleeps for up to `duration`, waking early in `SHUTDOWN_POLL_INTERVAL`
/// increments to observe `shutdown` promptly rather than blocking the full
/// interval.
fn sleep_interruptible(duration: Duration, shutdown: &AtomicBool) {
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if shutdown.load(Ordering::Acquire) {
            return;
        }
        let slice = remaining.min(SHUTDOWN_POLL_INTERVAL);
        std::thread::sleep(slice);
        remaining -= slice;
    }
}
