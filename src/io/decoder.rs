//! Decode stream adapter - thin facade over the external QR decoding engine
//!
//! The engine emits decoded text continuously from the camera stream. The adapter
//! walks the constraint tiers until the engine accepts one, and exposes
//! pause/resume/stop to the controller.

use crate::domain::error::{CaptureStartError, TierRejection};
use crate::domain::event::ScanEvent;
use crate::domain::types::{ConstraintSet, ConstraintTiers};
use crate::infra::metrics::Metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, trace, warn};

/// The engine refused a constraint set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRejected(pub String);

impl std::fmt::Display for StartRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External decoding engine capability
#[async_trait]
pub trait DecodeEngine: Send {
    /// Try to open the camera with `constraints` and start emitting into `sink`
    async fn try_start(
        &mut self,
        constraints: &ConstraintSet,
        sink: FrameSink,
    ) -> Result<(), StartRejected>;

    /// Stop processing frames, keep the device open
    fn pause(&mut self);

    fn resume(&mut self);

    /// Release the device
    async fn stop(&mut self) -> Result<(), String>;
}

/// Replaces the per-frame success/failure callbacks of the decoding engine
#[derive(Clone)]
pub struct FrameSink {
    events_tx: mpsc::Sender<ScanEvent>,
    metrics: Arc<Metrics>,
    stream: u64,
    last_drop_warn: Arc<parking_lot::Mutex<Option<Instant>>>,
}

impl FrameSink {
    /// `stream` tags lost-stream reports so a restarted capture ignores the old one
    pub fn new(events_tx: mpsc::Sender<ScanEvent>, metrics: Arc<Metrics>, stream: u64) -> Self {
        Self {
            events_tx,
            metrics,
            stream,
            last_drop_warn: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    /// A frame produced text. Never blocks the engine; drops when the queue is full.
    /// Returns false once the controller is gone.
    pub fn decoded(&self, text: String) -> bool {
        match self.events_tx.try_send(ScanEvent::Decoded(text)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.metrics.record_decode_dropped();
                // Rate-limit warning to 1 per second
                let mut last = self.last_drop_warn.lock();
                if last.map_or(true, |t| t.elapsed() > Duration::from_secs(1)) {
                    warn!("decode_event_dropped: queue full");
                    *last = Some(Instant::now());
                }
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// The engine stopped producing frames on its own. Unlike decodes this waits for
    /// queue space, since the operator has to be told.
    pub async fn stream_lost(&self, reason: String) {
        let event = ScanEvent::CaptureLost { stream: self.stream, reason };
        if self.events_tx.send(event).await.is_err() {
            debug!(stream = %self.stream, "capture_lost_unreported");
        }
    }

    /// A frame was scanned without yielding a code. Fires many times per second.
    pub fn frame_error(&self, reason: &str) {
        self.metrics.record_frame_error();
        trace!(reason = %reason, "decode_frame_miss");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Stopped,
    Running,
    Paused,
}

pub struct DecodeStreamAdapter {
    engine: Box<dyn DecodeEngine>,
    state: CaptureState,
    active_tier: Option<&'static str>,
}

impl DecodeStreamAdapter {
    pub fn new(engine: Box<dyn DecodeEngine>) -> Self {
        Self { engine, state: CaptureState::Stopped, active_tier: None }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn active_tier(&self) -> Option<&'static str> {
        self.active_tier
    }

    /// Try each tier in order; the first accepted one becomes active
    pub async fn start(
        &mut self,
        tiers: &ConstraintTiers,
        sink: FrameSink,
    ) -> Result<&'static str, CaptureStartError> {
        let mut rejections = Vec::with_capacity(tiers.len());

        for tier in tiers.iter() {
            match self.engine.try_start(tier, sink.clone()).await {
                Ok(()) => {
                    info!(
                        tier = %tier.name,
                        device = ?tier.device.as_ref().map(|d| d.as_str()),
                        facing = ?tier.facing.map(|f| f.as_str()),
                        resolution = ?tier.resolution.map(|r| r.to_string()),
                        "capture_started"
                    );
                    self.state = CaptureState::Running;
                    self.active_tier = Some(tier.name);
                    return Ok(tier.name);
                }
                Err(reason) => {
                    warn!(tier = %tier.name, reason = %reason, "capture_tier_rejected");
                    rejections.push(TierRejection { tier: tier.name, reason: reason.0 });
                }
            }
        }

        self.state = CaptureState::Stopped;
        self.active_tier = None;
        Err(CaptureStartError { rejections })
    }

    pub fn pause(&mut self) {
        if self.state == CaptureState::Running {
            self.engine.pause();
            self.state = CaptureState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == CaptureState::Paused {
            self.engine.resume();
            self.state = CaptureState::Running;
        }
    }

    /// Release the device. The adapter counts as stopped even if the engine failed.
    pub async fn stop(&mut self) -> Result<(), String> {
        let result = self.engine.stop().await;
        self.state = CaptureState::Stopped;
        self.active_tier = None;
        result
    }
}
