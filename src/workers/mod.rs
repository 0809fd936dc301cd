//! Background workers driving the activity state machine.
//!
//! Each worker owns one reconciliation concern and runs on its own periodic
//! loop. Workers coordinate exclusively through persisted state transitions;
//! a tick either completes or leaves the store in a state any later tick
//! (on any node) can resume from. Tick errors are logged with a reference
//! id and swallowed; the next tick retries.

pub mod cleanup;
pub mod reply;
pub mod requeue;
pub mod retry_reply;
pub mod send;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::dispatch::HttpDispatcher;
use crate::error::Result;

pub use cleanup::CleanupWorker;
pub use requeue::RequeueWorker;
pub use retry_reply::RetryReplyWorker;
pub use send::SendWorker;

/// Shared handles a worker needs to do its job.
#[derive(Clone)]
pub struct WorkerContext {
    pub pool: SqlitePool,
    pub config: Arc<RelayConfig>,
    pub dispatcher: Arc<HttpDispatcher>,
}

/// Cooperative shutdown signal shared by all worker loops.
pub struct Shutdown {
    triggered: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            triggered: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Ask every worker loop to exit after its current tick.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// A periodic reconciliation job.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    fn period(&self) -> Duration;
    async fn tick(&self) -> Result<()>;
}

/// Run a worker on its own task until shutdown.
///
/// The interval serializes re-entry: a tick always finishes before the next
/// one fires, so a worker never overlaps itself. Different workers run
/// concurrently on separate tasks.
pub fn spawn(worker: Arc<dyn Worker>, shutdown: Arc<Shutdown>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(worker.period());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(worker = worker.name(), "worker started");

        while !shutdown.is_triggered() {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(error) = worker.tick().await {
                        error!(
                            worker = worker.name(),
                            reference = %Uuid::new_v4(),
                            %error,
                            "worker tick failed"
                        );
                    }
                }
                _ = shutdown.notified() => break,
            }
        }

        info!(worker = worker.name(), "worker stopped");
    })
}
