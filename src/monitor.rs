//! Supervised background task monitoring distributed-recovery / clone
//! progress (spec.md §5, design note §9 "Async/monitors").
//!
//! Grounded on `stats.rs`'s `stream_cluster`/`stream_node` polling
//! helpers, replacing the teacher's `async_stream` HTTP poll loop with a
//! cancellable recovery/clone poll loop.

use crate::error::{AdminError, Result};
use crate::session::InstanceSession;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Recovering { percent: Option<f32> },
    Done,
}

/// Shared cancellation handle (spec.md §5: "communicates cancellation via
/// a shared atomic flag and a wake-up mechanism").
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A function that checks whether recovery/clone has finished, returning
/// the observed progress. Implemented over `performance_schema` views by
/// the GR Probe in real use; injected here so the monitor has no direct
/// dependency on any one probe type.
pub type ProgressProbe = Box<dyn Fn() -> futures::future::BoxFuture<'static, Result<Progress>> + Send + Sync>;

/// Spawn the supervised monitor task. The caller `.await`s the returned
/// `JoinHandle` before the owning command returns (spec.md §5's ordering
/// guarantee); on cancellation the task issues `KILL QUERY` on
/// `kill_session` and exits.
pub fn spawn_monitor(
    probe: ProgressProbe,
    poll_interval: Duration,
    kill_session: Option<Arc<InstanceSession>>,
    kill_query_id: Option<u64>,
) -> (CancelHandle, mpsc::Receiver<Result<Progress>>, tokio::task::JoinHandle<()>) {
    let cancel = CancelHandle::new();
    let cancel_for_task = cancel.clone();
    let (tx, rx) = mpsc::channel(8);

    let handle = tokio::spawn(async move {
        loop {
            if cancel_for_task.is_cancelled() {
                if let (Some(session), Some(query_id)) = (&kill_session, kill_query_id) {
                    if let Err(e) = session.execute(&format!("KILL QUERY {query_id}")).await {
                        warn!(target: "monitor", "failed to KILL QUERY {query_id}: {e}");
                    }
                }
                let _ = tx.send(Err(AdminError::Cancelled)).await;
                return;
            }

            match probe().await {
                Ok(Progress::Done) => {
                    let _ = tx.send(Ok(Progress::Done)).await;
                    return;
                }
                Ok(progress) => {
                    trace!(target: "monitor", "poll: {:?}", progress);
                    if tx.send(Ok(progress)).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = cancel_for_task.notify.notified() => {}
            }
        }
    });

    (cancel, rx, handle)
}
