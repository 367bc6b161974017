//! ``src/controller/supervisor.rs``
//! ============================================================================
//! # TaskSupervisor: tracked, isolated handler tasks
//!
//! Every handler invocation runs as its own tokio task. The supervisor keeps
//! track of them for shutdown and turns an `Err` or a panic into a logged
//! `HandlerExecution` error, so a failing handler never reaches the read loop
//! or its siblings.

use std::{
    any::Any,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::FutureExt;
use tokio::time::timeout;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Span, debug, info, warn};

use super::handlers::HandlerResult;
use crate::error::DeckError;

/// Counters of finished invocations.
#[derive(Debug, Default)]
struct Outcomes {
    succeeded: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SupervisorStats {
    pub running: usize,
    pub succeeded: u64,
    pub failed: u64,
    pub panicked: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TaskSupervisor {
    tracker: TaskTracker,
    outcomes: Arc<Outcomes>,
}

impl TaskSupervisor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one handler invocation on its own task.
    ///
    /// `method` and `target` only label the log lines.
    pub fn spawn<F>(&self, method: &'static str, target: String, span: Span, work: F)
    where
        F: Future<Output = HandlerResult> + Send + 'static,
    {
        let outcomes: Arc<Outcomes> = Arc::clone(&self.outcomes);

        self.tracker.spawn(
            async move {
                match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(Ok(())) => {
                        outcomes.succeeded.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Err(err)) => {
                        outcomes.failed.fetch_add(1, Ordering::Relaxed);
                        DeckError::handler_execution(method, target, format!("{err:#}")).log();
                    }
                    Err(panic) => {
                        outcomes.panicked.fetch_add(1, Ordering::Relaxed);
                        let reason: String = format!("panicked: {}", panic_message(panic.as_ref()));
                        DeckError::handler_execution(method, target, reason).log();
                    }
                }
            }
            .instrument(span),
        );
    }

    #[must_use]
    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    #[must_use]
    pub fn stats(&self) -> SupervisorStats {
        SupervisorStats {
            running: self.tracker.len(),
            succeeded: self.outcomes.succeeded.load(Ordering::Relaxed),
            failed: self.outcomes.failed.load(Ordering::Relaxed),
            panicked: self.outcomes.panicked.load(Ordering::Relaxed),
        }
    }

    /// Wait until every task spawned so far has finished. The supervisor
    /// stays open for new work.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Close the supervisor and drain running tasks.
    ///
    /// Returns `false` when `deadline` elapsed before the drain finished.
    pub async fn shutdown(&self, deadline: Option<Duration>) -> bool {
        self.tracker.close();
        let running: usize = self.tracker.len();
        debug!(running, "Draining handler tasks");

        let drained: bool = match deadline {
            Some(limit) => timeout(limit, self.tracker.wait()).await.is_ok(),
            None => {
                self.tracker.wait().await;
                true
            }
        };

        if drained {
            info!(stats = ?self.stats(), "Handler tasks drained");
        } else {
            warn!(
                still_running = self.tracker.len(),
                "Shutdown deadline elapsed with handler tasks still running"
            );
        }
        drained
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(text) = panic.downcast_ref::<&'static str>() {
        text
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;

    fn always() -> bool {
        true
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_contained() {
        let supervisor: TaskSupervisor = TaskSupervisor::new();
        let ran: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

        supervisor.spawn("on_key_up", "ctx1".into(), Span::none(), async {
            HandlerResult::Err(anyhow!("boom"))
        });
        supervisor.spawn("on_key_up", "ctx2".into(), Span::none(), async {
            if always() {
                panic!("handler exploded");
            }
            HandlerResult::Ok(())
        });
        let counter: Arc<AtomicUsize> = Arc::clone(&ran);
        supervisor.spawn("on_key_up", "ctx3".into(), Span::none(), async move {
            counter.fetch_add(1, Ordering::SeqCst);
            HandlerResult::Ok(())
        });

        supervisor.wait_idle().await;

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(
            supervisor.stats(),
            SupervisorStats {
                running: 0,
                succeeded: 1,
                failed: 1,
                panicked: 1,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_deadline_bounds_the_drain() {
        let supervisor: TaskSupervisor = TaskSupervisor::new();
        supervisor.spawn("on_will_appear", "ctx1".into(), Span::none(), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            HandlerResult::Ok(())
        });

        assert!(!supervisor.shutdown(Some(Duration::from_millis(100))).await);
        assert_eq!(supervisor.running(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_without_deadline_waits_for_all() {
        let supervisor: TaskSupervisor = TaskSupervisor::new();
        for _ in 0..8 {
            supervisor.spawn("on_dial_rotate", "ctx".into(), Span::none(), async {
                tokio::task::yield_now().await;
                HandlerResult::Ok(())
            });
        }

        assert!(supervisor.shutdown(None).await);
        assert_eq!(supervisor.stats().succeeded, 8);
    }

    #[test]
    fn test_panic_message_variants() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let fixed: Box<dyn Any + Send> = Box::new("fixed");
        let other: Box<dyn Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(fixed.as_ref()), "fixed");
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
