//! Checkpoint rendezvous and the shared stop signal.
//!
//! The automatic runner blocks at a checkpoint until an operator command
//! resolves it. Every wait races against the stop signal, and the race is
//! biased so a stop is always observed before a resolution that arrives in
//! the same instant.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};

/// Cooperative stop flag shared by every suspension point of a run.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Idempotent; wakes every pending wait.
    pub fn trigger(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Re-arm before a new run.
    pub fn reset(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }

    /// Resolve once the stop flag is set.
    pub async fn stopped(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }

    /// Sleep that a stop cuts short. Returns false when interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.stopped() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

/// What a checkpoint wait resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    Signal(T),
    Stopped,
}

/// A single-slot rendezvous: the runner opens the checkpoint and blocks,
/// an operator command sends exactly one signal through it.
#[derive(Debug)]
pub struct Checkpoint<T> {
    slot: Mutex<Option<(String, oneshot::Sender<T>)>>,
}

impl<T> Default for Checkpoint<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T: Send> Checkpoint<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The step currently waiting at this checkpoint, if any.
    pub fn pending_step(&self) -> Option<String> {
        self.slot
            .lock()
            .expect("checkpoint lock poisoned")
            .as_ref()
            .map(|(step, _)| step.clone())
    }

    /// Deliver a signal to the waiting runner. Returns false when nothing
    /// is waiting.
    pub fn resolve(&self, signal: T) -> bool {
        let sender = self
            .slot
            .lock()
            .expect("checkpoint lock poisoned")
            .take()
            .map(|(_, tx)| tx);
        match sender {
            Some(tx) => tx.send(signal).is_ok(),
            None => false,
        }
    }

    /// Drop any pending wait without a signal. The waiter sees a stop.
    pub fn cancel(&self) {
        self.slot.lock().expect("checkpoint lock poisoned").take();
    }

    /// Arm the slot without blocking. Arming before announcing the
    /// checkpoint means a resolver reacting to the announcement always
    /// finds a waiter.
    pub fn arm(&self, step_id: &str) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        let mut slot = self.slot.lock().expect("checkpoint lock poisoned");
        *slot = Some((step_id.to_string(), tx));
        rx
    }

    /// Block on an armed slot until resolved or stopped. The stop arm is
    /// checked first.
    pub async fn wait_armed(&self, rx: oneshot::Receiver<T>, stop: &StopSignal) -> Resolution<T> {
        tokio::select! {
            biased;
            _ = stop.stopped() => {
                self.cancel();
                Resolution::Stopped
            }
            signal = rx => match signal {
                Ok(s) => Resolution::Signal(s),
                // sender dropped without sending, treat as stop
                Err(_) => Resolution::Stopped,
            }
        }
    }
}
