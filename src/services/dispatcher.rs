//! The worker pool driving jobs through their pipelines.
//!
//! Each worker is an independent task looping on `reserve_next_runnable`
//! with exponential backoff when the queue is empty. A reserved job is run
//! to a terminal state without yielding the reservation. A supervisor task
//! restarts crashed workers and reopens reservations whose worker died; a
//! reaper drops terminal jobs and played queue entries past retention.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::WorkerSettings;
use crate::services::pipeline::{Pipeline, PipelineContext, PipelineOutcome};
use crate::services::providers::cancel_pair;
use crate::services::queue_store::QueueStore;

const BACKOFF_START: Duration = Duration::from_millis(100);
const BACKOFF_CAP: Duration = Duration::from_secs(2);
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(500);
const SUPERVISOR_INTERVAL: Duration = Duration::from_secs(15);

pub struct Dispatcher {
    ctx: Arc<PipelineContext>,
    queue: Arc<QueueStore>,
    settings: WorkerSettings,
}

/// Handle over the running pool; dropping it does not stop the workers, call
/// [`DispatcherHandle::shutdown`] for that.
pub struct DispatcherHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl DispatcherHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

impl Dispatcher {
    pub fn new(ctx: Arc<PipelineContext>, queue: Arc<QueueStore>, settings: WorkerSettings) -> Self {
        Self {
            ctx,
            queue,
            settings,
        }
    }

    /// Recover orphaned jobs from a previous process, then launch the
    /// worker, supervisor and reaper tasks.
    pub async fn start(self) -> crate::error::Result<DispatcherHandle> {
        self.ctx.jobs.recover_orphaned_jobs().await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        for worker_id in 0..self.settings.concurrency {
            tasks.push(spawn_supervised_worker(
                worker_id,
                self.ctx.clone(),
                shutdown_rx.clone(),
            ));
        }

        tasks.push(spawn_reservation_supervisor(
            self.ctx.clone(),
            self.settings.clone(),
            shutdown_rx.clone(),
        ));
        tasks.push(spawn_reaper(
            self.ctx.clone(),
            self.queue.clone(),
            self.settings.clone(),
            shutdown_rx,
        ));

        tracing::info!(workers = self.settings.concurrency, "dispatcher started");
        Ok(DispatcherHandle { shutdown_tx, tasks })
    }
}

/// Keep one worker slot alive: respawn the loop if it ever panics.
fn spawn_supervised_worker(
    worker_id: usize,
    ctx: Arc<PipelineContext>,
    shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let ctx = ctx.clone();
            let rx = shutdown_rx.clone();
            let run = tokio::spawn(worker_loop(worker_id, ctx, rx));
            match run.await {
                Ok(()) => break,
                Err(e) if e.is_panic() => {
                    tracing::error!(worker = worker_id, "worker panicked, restarting");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    })
}

async fn worker_loop(
    worker_id: usize,
    ctx: Arc<PipelineContext>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::info!(worker = worker_id, "worker started");
    let mut backoff = BACKOFF_START;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match ctx.jobs.reserve_next_runnable().await {
            Ok(Some(job)) => {
                backoff = BACKOFF_START;
                run_job(worker_id, &ctx, job).await;
            }
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown_rx.changed() => {}
                }
                backoff = (backoff * 2).min(BACKOFF_CAP);
            }
            Err(e) => {
                tracing::error!(worker = worker_id, error = %e, "reservation failed");
                tokio::select! {
                    _ = tokio::time::sleep(BACKOFF_CAP) => {}
                    _ = shutdown_rx.changed() => {}
                }
            }
        }
    }

    tracing::info!(worker = worker_id, "worker stopped");
}

/// Execute one reserved job to a terminal state. A side task watches the
/// store for a cancellation request and trips the cancel signal the
/// providers select on.
async fn run_job(worker_id: usize, ctx: &Arc<PipelineContext>, job: crate::models::Job) {
    let job_id = job.id;
    tracing::info!(worker = worker_id, job_id = %job_id, kind = job.kind().as_str(), "job picked up");

    let (cancel_tx, cancel_rx) = cancel_pair();
    let monitor = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CANCEL_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                match ctx.jobs.cancel_requested(job_id).await {
                    Ok(true) => {
                        let _ = cancel_tx.send(true);
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "cancel poll failed");
                    }
                }
            }
        })
    };

    let outcome = Pipeline::new(ctx, job, cancel_rx).run().await;
    monitor.abort();

    match outcome {
        Ok(PipelineOutcome::Completed) => {
            tracing::info!(worker = worker_id, job_id = %job_id, "job completed");
        }
        Ok(PipelineOutcome::Cancelled) => {
            tracing::info!(worker = worker_id, job_id = %job_id, "job cancelled");
        }
        Ok(PipelineOutcome::Failed { step, kind, .. }) => {
            tracing::warn!(
                worker = worker_id,
                job_id = %job_id,
                step = step.name(),
                kind = kind.as_str(),
                "job failed"
            );
        }
        Ok(PipelineOutcome::ReservationLost) => {
            tracing::warn!(worker = worker_id, job_id = %job_id, "reservation lost mid-run");
        }
        Err(e) => {
            tracing::error!(worker = worker_id, job_id = %job_id, error = %e, "pipeline error");
        }
    }
}

/// Reopen reservations whose worker went away.
fn spawn_reservation_supervisor(
    ctx: Arc<PipelineContext>,
    settings: WorkerSettings,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SUPERVISOR_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = ctx
                        .jobs
                        .reopen_stale_reservations(settings.stale_reservation_after)
                        .await
                    {
                        tracing::error!(error = %e, "stale reservation sweep failed");
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }
    })
}

/// Retention sweep for terminal jobs and played queue entries.
fn spawn_reaper(
    ctx: Arc<PipelineContext>,
    queue: Arc<QueueStore>,
    settings: WorkerSettings,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = settings.job_retention.min(Duration::from_secs(3_600));
        let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = ctx.jobs.reap_terminal_jobs(settings.job_retention).await {
                        tracing::error!(error = %e, "job reaper failed");
                    }
                    if let Err(e) = queue.reap_played(settings.job_retention).await {
                        tracing::error!(error = %e, "queue reaper failed");
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }
    })
}
