//! Background refresh worker.
//!
//! Stale hits enqueue their revalidation here instead of spawning from the
//! request, so a refresh outlives the request that triggered it. The worker
//! spawns each job as its own task; a full queue drops the refresh.

use futures_util::future::BoxFuture;
use tokio::sync::{broadcast, mpsc};

/// A fire-and-forget refresh.
pub type RefreshJob = BoxFuture<'static, ()>;

/// Handle for submitting refresh jobs.
#[derive(Clone, Debug)]
pub struct RefreshQueue {
    tx: mpsc::Sender<RefreshJob>,
}

impl RefreshQueue {
    /// Start the worker. It stops when `shutdown` fires or every handle is
    /// dropped. Must be called within a Tokio runtime.
    pub fn spawn(capacity: usize, shutdown: Option<broadcast::Receiver<()>>) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_worker(rx, shutdown));
        Self { tx }
    }

    /// Queue a job. Returns `false` if the queue is full or the worker stopped.
    pub fn submit(&self, job: RefreshJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Refresh queue full, dropping background refresh");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Refresh worker stopped, dropping background refresh");
                false
            }
        }
    }
}

async fn run_worker(mut rx: mpsc::Receiver<RefreshJob>, shutdown: Option<broadcast::Receiver<()>>) {
    let shutdown = wait_for_shutdown(shutdown);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            job = rx.recv() => match job {
                Some(job) => {
                    tokio::spawn(job);
                }
                None => break,
            },
            _ = &mut shutdown => {
                tracing::info!("Refresh worker received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

async fn wait_for_shutdown(shutdown: Option<broadcast::Receiver<()>>) {
    match shutdown {
        Some(mut rx) => {
            let _ = rx.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}
