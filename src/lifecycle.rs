//! Host lifecycle → engine events.
//!
//! The host reports raw app phases as they change. Only crossings between the
//! foreground (`Active`) and the non-foreground phases produce events, so a
//! host that reports `Inactive` then `Background` triggers one flush, not two.

use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppPhase {
    Active,
    Inactive,
    Background,
}

impl AppPhase {
    pub fn is_foreground(self) -> bool {
        self == AppPhase::Active
    }
}

impl FromStr for AppPhase {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" | "foreground" => Ok(AppPhase::Active),
            "inactive" => Ok(AppPhase::Inactive),
            "background" => Ok(AppPhase::Background),
            other => Err(anyhow!("unknown app phase '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Foreground,
    Background,
}

/// One event plus an optional completion signal for hosts that must block
/// until the engine has handled it.
#[derive(Debug)]
pub struct LifecycleNotice {
    pub event: LifecycleEvent,
    ack: Option<oneshot::Sender<Result<()>>>,
}

impl LifecycleNotice {
    /// Reports how handling went. For `Background`, `Err` means the flush did
    /// not reach the store.
    pub fn acknowledge(self, result: Result<()>) {
        if let Some(ack) = self.ack {
            let _ = ack.send(result);
        }
    }
}

pub type LifecycleEvents = mpsc::UnboundedReceiver<LifecycleNotice>;

pub struct LifecycleMonitor {
    phase: Mutex<AppPhase>,
    tx: mpsc::UnboundedSender<LifecycleNotice>,
}

pub fn channel(initial: AppPhase) -> (LifecycleMonitor, LifecycleEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        LifecycleMonitor {
            phase: Mutex::new(initial),
            tx,
        },
        rx,
    )
}

impl LifecycleMonitor {
    pub fn phase(&self) -> AppPhase {
        *self.lock()
    }

    /// Records the new phase and forwards the resulting event, if any,
    /// without waiting for it to be handled.
    pub fn report(&self, next: AppPhase) -> Option<LifecycleEvent> {
        let event = self.transition(next)?;
        if self.tx.send(LifecycleNotice { event, ack: None }).is_err() {
            warn!("lifecycle event {event:?} dropped: scheduler is not running");
        }
        Some(event)
    }

    /// Like `report`, but returns only after the scheduler handled the event.
    /// For `Background` that means the state flush is durable; a failed flush
    /// comes back as `Err`.
    pub async fn report_and_wait(&self, next: AppPhase) -> Result<Option<LifecycleEvent>> {
        let Some(event) = self.transition(next) else {
            return Ok(None);
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .tx
            .send(LifecycleNotice {
                event,
                ack: Some(ack_tx),
            })
            .is_err()
        {
            bail!("scheduler is not running");
        }

        ack_rx
            .await
            .map_err(|_| anyhow!("scheduler stopped before handling {event:?}"))?
            .with_context(|| format!("{event:?} not handled"))?;
        Ok(Some(event))
    }

    fn transition(&self, next: AppPhase) -> Option<LifecycleEvent> {
        let mut phase = self.lock();
        let previous = *phase;
        *phase = next;

        let event = match (previous.is_foreground(), next.is_foreground()) {
            (true, false) => Some(LifecycleEvent::Background),
            (false, true) => Some(LifecycleEvent::Foreground),
            _ => None,
        };
        debug!("app phase {previous:?} -> {next:?} ({event:?})");
        event
    }

    fn lock(&self) -> MutexGuard<'_, AppPhase> {
        match self.phase.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_foreground_crossings_emit() {
        let (monitor, mut events) = channel(AppPhase::Active);

        assert_eq!(monitor.report(AppPhase::Inactive), Some(LifecycleEvent::Background));
        assert_eq!(monitor.report(AppPhase::Background), None);
        assert_eq!(monitor.phase(), AppPhase::Background);
        assert_eq!(monitor.report(AppPhase::Active), Some(LifecycleEvent::Foreground));
        assert_eq!(monitor.report(AppPhase::Active), None);

        assert_eq!(events.try_recv().unwrap().event, LifecycleEvent::Background);
        assert_eq!(events.try_recv().unwrap().event, LifecycleEvent::Foreground);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn parses_host_phase_names() {
        assert_eq!("Background".parse::<AppPhase>().unwrap(), AppPhase::Background);
        assert_eq!(" active\n".parse::<AppPhase>().unwrap(), AppPhase::Active);
        assert!("suspended".parse::<AppPhase>().is_err());
    }

    #[tokio::test]
    async fn report_and_wait_returns_after_ack() {
        let (monitor, mut events) = channel(AppPhase::Active);

        let handler = tokio::spawn(async move {
            let notice = events.recv().await.expect("notice");
            let event = notice.event;
            notice.acknowledge(Ok(()));
            event
        });

        let event = monitor.report_and_wait(AppPhase::Background).await.unwrap();
        assert_eq!(event, Some(LifecycleEvent::Background));
        assert_eq!(handler.await.unwrap(), LifecycleEvent::Background);
    }

    #[tokio::test]
    async fn report_and_wait_returns_handler_failure() {
        let (monitor, mut events) = channel(AppPhase::Active);

        tokio::spawn(async move {
            let notice = events.recv().await.expect("notice");
            notice.acknowledge(Err(anyhow!("store unavailable")));
        });

        let err = monitor.report_and_wait(AppPhase::Background).await.unwrap_err();
        assert!(format!("{err:#}").contains("store unavailable"));
        assert_eq!(monitor.phase(), AppPhase::Background);
    }

    #[tokio::test]
    async fn report_and_wait_fails_without_scheduler() {
        let (monitor, events) = channel(AppPhase::Active);
        drop(events);

        assert!(monitor.report_and_wait(AppPhase::Background).await.is_err());
    }
}
