//! Scan controller - the single event loop of the scanner
//!
//! Owns the scan machine and every capability it drives. Decode events, validation
//! completions, cooldown expiries and operator commands all arrive on one queue, so
//! machine transitions never race each other.

use crate::domain::error::ScannerError;
use crate::domain::event::ScanEvent;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::console::DisplaySink;
use crate::io::decoder::{DecodeEngine, DecodeStreamAdapter, FrameSink};
use crate::io::ledger::ValidationClient;
use crate::services::negotiator::{CameraNegotiator, DeviceSelector, MediaPlatform};
use crate::services::presenter::{present, Presentable};
use crate::services::scan_machine::{Command, Phase, ScanMachine};
use crate::services::scheduler::CooldownTimer;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct ScanController {
    machine: ScanMachine,
    negotiator: CameraNegotiator,
    adapter: DecodeStreamAdapter,
    client: Arc<dyn ValidationClient>,
    timer: Arc<dyn CooldownTimer>,
    display: Box<dyn DisplaySink>,
    selector: Option<DeviceSelector>,
    events_tx: mpsc::Sender<ScanEvent>,
    metrics: Arc<Metrics>,
    /// Bumped on every capture start
    stream: u64,
}

impl ScanController {
    /// Create the controller and the receiving end of its event queue
    pub fn new(
        config: &Config,
        platform: Arc<dyn MediaPlatform>,
        engine: Box<dyn DecodeEngine>,
        client: Arc<dyn ValidationClient>,
        timer: Arc<dyn CooldownTimer>,
        display: Box<dyn DisplaySink>,
        metrics: Arc<Metrics>,
    ) -> (Self, mpsc::Receiver<ScanEvent>) {
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_size());
        let controller = Self {
            machine: ScanMachine::new(config.cooldown(), metrics.clone()),
            negotiator: CameraNegotiator::new(
                platform,
                config.rear_keywords(),
                config.preferred_resolution(),
            ),
            adapter: DecodeStreamAdapter::new(engine),
            client,
            timer,
            display,
            selector: None,
            events_tx,
            metrics,
            stream: 0,
        };
        (controller, events_rx)
    }

    /// Sender for other producers (operator console, signal handler)
    pub fn events_tx(&self) -> mpsc::Sender<ScanEvent> {
        self.events_tx.clone()
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    fn sink(&mut self) -> FrameSink {
        self.stream += 1;
        FrameSink::new(self.events_tx.clone(), self.metrics.clone(), self.stream)
    }

    /// Enumerate cameras, pick the preferred one and start capture.
    /// Failures are shown to the operator before being returned.
    pub async fn start(&mut self) -> Result<(), ScannerError> {
        let devices = match self.negotiator.list_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                error!(error = %e, "camera_enumeration_failed");
                self.display.show(&present(Presentable::EnumerationFailed(&e)));
                return Err(e.into());
            }
        };

        let selector = self.negotiator.selector(devices);
        if selector.is_visible() {
            self.display.show_devices(&selector);
        }
        let tiers = self.negotiator.build_constraint_tiers(selector.selected());
        info!(
            devices = %selector.options().len(),
            selected = ?selector.selected().map(|d| d.id.as_str()),
            tiers = ?tiers.names(),
            "camera_negotiated"
        );
        self.selector = Some(selector);

        let sink = self.sink();
        if let Err(e) = self.adapter.start(&tiers, sink).await {
            error!(error = %e, "camera_start_failed");
            self.display.show(&present(Presentable::CaptureFailed(&e)));
            return Err(e.into());
        }
        Ok(())
    }

    /// Consume events until shutdown or until every producer is gone
    pub async fn run(&mut self, mut events_rx: mpsc::Receiver<ScanEvent>) {
        info!(session_id = %self.machine.session().id(), "scan_controller_started");

        while let Some(event) = events_rx.recv().await {
            match event {
                ScanEvent::Decoded(text) => {
                    let commands = self.machine.on_decoded(&text);
                    self.execute(commands);
                }
                ScanEvent::ValidationFinished { result, latency } => {
                    let commands = self.machine.on_validation_finished(&result, latency);
                    self.execute(commands);
                }
                ScanEvent::CooldownElapsed(generation) => {
                    let commands = self.machine.on_cooldown_elapsed(generation);
                    self.execute(commands);
                }
                ScanEvent::CaptureLost { stream, reason } => {
                    self.capture_lost(stream, &reason).await;
                }
                ScanEvent::DeviceSelected(key) => self.switch_device(&key).await,
                ScanEvent::ListDevices => match &self.selector {
                    Some(selector) => self.display.show_devices(selector),
                    None => debug!("device_list_unavailable"),
                },
                ScanEvent::Shutdown => {
                    info!("scan_controller_shutdown_requested");
                    break;
                }
            }
        }

        if let Err(e) = self.adapter.stop().await {
            warn!(error = %e, "capture_stop_failed");
        }
        info!(
            session_id = %self.machine.session().id(),
            uptime_secs = %self.machine.session().uptime().as_secs(),
            "scan_controller_stopped"
        );
    }

    /// Run the machine's commands in order
    fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::PauseCapture => self.adapter.pause(),
                Command::ResumeCapture => self.adapter.resume(),
                Command::Display(payload) => self.display.show(&payload),
                Command::Validate { participant_id } => self.spawn_validation(participant_id),
                Command::ScheduleCooldown { generation, after } => {
                    self.timer.schedule(generation, after, self.events_tx.clone());
                }
            }
        }
    }

    /// One request per call; the completion comes back through the queue
    fn spawn_validation(&self, participant_id: String) {
        let client = self.client.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            let result = client.validate(&participant_id).await;
            let latency = start.elapsed();
            if events_tx.send(ScanEvent::ValidationFinished { result, latency }).await.is_err() {
                debug!(participant_id = %participant_id, "validation_result_discarded");
            }
        });
    }

    /// The decoder died under a running capture. Scanning stays stopped until the
    /// operator picks a camera or restarts.
    async fn capture_lost(&mut self, stream: u64, reason: &str) {
        if stream != self.stream {
            debug!(stream = %stream, current = %self.stream, "stale_capture_lost_ignored");
            return;
        }
        error!(stream = %stream, reason = %reason, phase = %self.machine.phase().as_str(), "capture_lost");
        if let Err(e) = self.adapter.stop().await {
            warn!(error = %e, "capture_stop_failed");
        }
        self.display.show(&present(Presentable::CaptureLost(reason)));
    }

    /// Restart capture on the chosen device. The old stream is stopped best-effort
    /// and the new one always starts fresh. If no tier is accepted, scanning stays
    /// stopped until the operator picks another device or restarts.
    async fn switch_device(&mut self, key: &str) {
        let Some(selector) = self.selector.as_mut() else {
            warn!(key = %key, "camera_selection_before_start");
            return;
        };
        let Some(device) = selector.select(key).cloned() else {
            return;
        };

        info!(device_id = %device.id, label = %device.label, "camera_switching");
        let tiers = self.negotiator.build_constraint_tiers(Some(&device));

        if let Err(e) = self.adapter.stop().await {
            warn!(error = %e, "capture_stop_failed");
        }

        let sink = self.sink();
        if let Err(e) = self.adapter.start(&tiers, sink).await {
            error!(device_id = %device.id, error = %e, "camera_start_failed");
            self.display.show(&present(Presentable::CaptureFailed(&e)));
            return;
        }

        let commands = self.machine.on_capture_restarted();
        self.execute(commands);
    }
}
