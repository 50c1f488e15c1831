//! Background scheduler
//!
//! Runs the periodic reachability probe and cache refresh on tokio's clock,
//! and accepts explicit reconnect/sync requests from the front end.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::coordinator::SyncCoordinator;
use crate::config::Config;
use crate::remote::RemoteStore;

/// Commands sent to the scheduler task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Probe now instead of waiting for the next tick
    Reconnect,
    /// Probe, drain and refresh now
    SyncNow,
    /// Stop the scheduler task
    Shutdown,
}

/// Timing for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub probe_interval: Duration,
    pub refresh_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(10),
            refresh_interval: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for SchedulerConfig {
    fn from(config: &Config) -> Self {
        Self {
            probe_interval: config.probe_interval(),
            refresh_interval: config.refresh_interval(),
        }
    }
}

/// Handle to control the scheduler task
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Queue a command; returns false once the task has stopped
    pub async fn send(&self, command: SchedulerCommand) -> bool {
        self.command_tx.send(command).await.is_ok()
    }

    /// Stop the task and wait for it to finish its current step
    pub async fn shutdown(self) {
        let _ = self.command_tx.send(SchedulerCommand::Shutdown).await;
        let _ = self.task.await;
    }
}

/// Spawn the scheduler task
///
/// The first probe runs immediately; refreshes start one interval later.
pub fn spawn_scheduler<R>(sync: Arc<SyncCoordinator<R>>, config: SchedulerConfig) -> SchedulerHandle
where
    R: RemoteStore + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(16);
    let task = tokio::spawn(scheduler_loop(sync, config, command_rx));
    SchedulerHandle { command_tx, task }
}

async fn scheduler_loop<R: RemoteStore>(
    sync: Arc<SyncCoordinator<R>>,
    config: SchedulerConfig,
    mut command_rx: mpsc::Receiver<SchedulerCommand>,
) {
    let mut probe_tick = interval(config.probe_interval);
    probe_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut refresh_tick = interval_at(
        Instant::now() + config.refresh_interval,
        config.refresh_interval,
    );
    refresh_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        probe_secs = config.probe_interval.as_secs(),
        refresh_secs = config.refresh_interval.as_secs(),
        "Sync scheduler started"
    );

    loop {
        tokio::select! {
            _ = probe_tick.tick() => {
                let outcome = sync.probe().await;
                debug!(?outcome, "Scheduled probe");
            }
            _ = refresh_tick.tick() => {
                let outcome = sync.refresh().await;
                debug!(?outcome, "Scheduled refresh");
            }
            cmd = command_rx.recv() => {
                match cmd {
                    Some(SchedulerCommand::Reconnect) => {
                        sync.probe().await;
                    }
                    Some(SchedulerCommand::SyncNow) => {
                        sync.sync_now().await;
                    }
                    Some(SchedulerCommand::Shutdown) | None => break,
                }
            }
        }
    }

    info!("Sync scheduler stopped");
}
