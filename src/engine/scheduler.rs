use anyhow::{bail, Context, Result};
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::lifecycle::{LifecycleEvent, LifecycleEvents};

use super::controller::{CycleOutcome, ReconciliationEngine};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Drives an engine from a periodic timer and host lifecycle events.
pub struct Scheduler {
    engine: ReconciliationEngine,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl Scheduler {
    pub fn new(engine: ReconciliationEngine) -> Self {
        Self {
            engine,
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Starts ticking. The first tick fires immediately.
    pub fn start(&mut self, lifecycle: LifecycleEvents) -> Result<()> {
        if self.handle.is_some() {
            bail!("scheduler already running");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(schedule_loop(
            self.engine.clone(),
            lifecycle,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Stops the loop, abandons any in-flight cycle and closes the day's
    /// running session.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle.await.context("scheduler task failed to join")?;
        }

        self.engine.shutdown().await
    }
}

async fn schedule_loop(
    engine: ReconciliationEngine,
    mut lifecycle: LifecycleEvents,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval(engine.config().poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut in_flight: Option<JoinHandle<CycleOutcome>> = None;
    let mut lifecycle_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => trigger_cycle(&engine, &mut in_flight, "tick"),
            notice = lifecycle.recv(), if lifecycle_open => match notice {
                Some(notice) => {
                    let result = match notice.event {
                        LifecycleEvent::Foreground => {
                            trigger_cycle(&engine, &mut in_flight, "foreground");
                            Ok(())
                        }
                        LifecycleEvent::Background => {
                            abandon_cycle(&mut in_flight).await;
                            let flushed = engine.flush().await;
                            if let Err(err) = &flushed {
                                log_warn!("flush on background failed: {err:#}");
                            }
                            flushed
                        }
                    };
                    notice.acknowledge(result);
                }
                None => {
                    log_debug!("lifecycle channel closed");
                    lifecycle_open = false;
                }
            },
            _ = cancel_token.cancelled() => {
                abandon_cycle(&mut in_flight).await;
                log_info!("scheduler shutting down");
                break;
            }
        }
    }
}

fn trigger_cycle(
    engine: &ReconciliationEngine,
    in_flight: &mut Option<JoinHandle<CycleOutcome>>,
    reason: &str,
) {
    if in_flight.as_ref().is_some_and(|handle| !handle.is_finished()) {
        log_debug!("{reason} trigger dropped: cycle still running");
        return;
    }

    let engine = engine.clone();
    *in_flight = Some(tokio::spawn(async move { engine.poll_cycle().await }));
}

async fn abandon_cycle(in_flight: &mut Option<JoinHandle<CycleOutcome>>) {
    let Some(handle) = in_flight.take() else {
        return;
    };

    if !handle.is_finished() {
        log_info!("abandoning in-flight poll cycle");
        handle.abort();
    }
    // Wait for the task to unwind so its single-flight token is released.
    let _ = handle.await;
}
