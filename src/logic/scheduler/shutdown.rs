//! Shutdown Signal
//!
//! One-shot cancellation broadcast over a `watch` channel. The trigger side
//! is owned by whoever stops the agent; signals are cloned into every timer
//! loop and cycle.

use tokio::sync::watch;

/// Fires the shutdown signal
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Observes the shutdown signal
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    // None: detached signal that never fires
    rx: Option<watch::Receiver<bool>>,
}

/// Create a connected trigger/signal pair
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx: Some(rx) })
}

impl ShutdownTrigger {
    /// Fire the signal. Idempotent.
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: Some(self.tx.subscribe()),
        }
    }
}

impl ShutdownSignal {
    /// A signal that never fires (one-off cycles outside the scheduler)
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_triggered(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolve once the signal fires. Pends forever if the trigger is dropped
    /// without firing.
    pub async fn wait(&mut self) {
        let fired = match self.rx.as_mut() {
            Some(rx) => rx.wait_for(|fired| *fired).await.is_ok(),
            None => false,
        };
        if !fired {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fire_wakes_all_signals() {
        let (trigger, signal) = channel();
        let mut a = signal.clone();
        let mut b = trigger.signal();
        assert!(!a.is_triggered());

        trigger.fire();
        trigger.fire();

        a.wait().await;
        b.wait().await;
        assert!(signal.is_triggered());
        assert!(trigger.is_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_and_dropped_trigger_do_not_fire() {
        let mut never = ShutdownSignal::never();
        assert!(tokio::time::timeout(Duration::from_secs(60), never.wait()).await.is_err());

        let (trigger, mut signal) = channel();
        drop(trigger);
        assert!(tokio::time::timeout(Duration::from_secs(60), signal.wait()).await.is_err());
        assert!(!signal.is_triggered());
    }
}
