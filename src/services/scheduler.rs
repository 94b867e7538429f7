//! Cooldown timer capability
//!
//! Timers are never cancelled. A timer that outlives its cooldown delivers a stale
//! generation, which the scan machine ignores.

use crate::domain::event::ScanEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

pub trait CooldownTimer: Send + Sync {
    /// Deliver `ScanEvent::CooldownElapsed(generation)` to `events_tx` after `after`
    fn schedule(&self, generation: u64, after: Duration, events_tx: mpsc::Sender<ScanEvent>);
}

/// Production timer backed by `tokio::time::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

impl CooldownTimer for TokioTimer {
    fn schedule(&self, generation: u64, after: Duration, events_tx: mpsc::Sender<ScanEvent>) {
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            debug!(generation = %generation, "cooldown_elapsed");
            // Receiver gone means the controller shut down
            let _ = events_tx.send(ScanEvent::CooldownElapsed(generation)).await;
        });
    }
}
