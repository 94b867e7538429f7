//! End-to-end scan flow through the controller with fake camera, ledger and timer

use async_trait::async_trait;
use parking_lot::Mutex;
use snack_scanner::domain::display::{DisplayPayload, Tone};
use snack_scanner::domain::error::{DeviceEnumerationError, NetworkError, ScannerError};
use snack_scanner::domain::types::{ConstraintSet, DeviceId, DeviceInfo};
use snack_scanner::domain::{BackendReply, ScanEvent};
use snack_scanner::infra::{Config, Metrics};
use snack_scanner::io::decoder::{DecodeEngine, FrameSink, StartRejected};
use snack_scanner::io::{DisplaySink, ValidationClient};
use snack_scanner::services::negotiator::{DeviceSelector, MediaPlatform};
use snack_scanner::services::presenter::GENERIC_CONNECTION_ERROR;
use snack_scanner::services::{CooldownTimer, Phase, ScanController};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const BADGE: &str = r#"{"id":"P123","nombre":"Ana"}"#;

struct FakePlatform(Result<Vec<DeviceInfo>, ()>);

#[async_trait]
impl MediaPlatform for FakePlatform {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceEnumerationError> {
        match &self.0 {
            Ok(devices) => Ok(devices.clone()),
            Err(()) => Err(DeviceEnumerationError::PermissionDenied { path: "/dev/video0".into() }),
        }
    }
}

#[derive(Default)]
struct CameraState {
    sink: Option<FrameSink>,
    started_with: Vec<ConstraintSet>,
    paused: bool,
    stops: usize,
}

#[derive(Clone, Default)]
struct FakeCamera(Arc<Mutex<CameraState>>);

impl FakeCamera {
    /// Simulate a frame, paused or not
    fn frame(&self, text: &str) {
        let sink = self.0.lock().sink.clone().expect("camera not started");
        sink.decoded(text.to_string());
    }

    fn paused(&self) -> bool {
        self.0.lock().paused
    }

    fn current_sink(&self) -> FrameSink {
        self.0.lock().sink.clone().expect("camera not started")
    }

    /// Simulate the decoder dying under a running capture
    async fn die(&self) {
        self.current_sink().stream_lost("decoder exited".to_string()).await;
    }
}

#[async_trait]
impl DecodeEngine for FakeCamera {
    async fn try_start(&mut self, constraints: &ConstraintSet, sink: FrameSink) -> Result<(), StartRejected> {
        let mut state = self.0.lock();
        state.started_with.push(constraints.clone());
        state.sink = Some(sink);
        state.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.0.lock().paused = true;
    }

    fn resume(&mut self) {
        self.0.lock().paused = false;
    }

    async fn stop(&mut self) -> Result<(), String> {
        let mut state = self.0.lock();
        state.stops += 1;
        state.sink = None;
        Err("device already released".to_string())
    }
}

/// Replies from a script, one per call; records every participant id
struct FakeLedger {
    replies: Mutex<Vec<Result<BackendReply, NetworkError>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeLedger {
    fn new(replies: Vec<Result<BackendReply, NetworkError>>) -> Arc<Self> {
        Arc::new(Self { replies: Mutex::new(replies), calls: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl ValidationClient for FakeLedger {
    async fn validate(&self, participant_id: &str) -> Result<BackendReply, NetworkError> {
        self.calls.lock().push(participant_id.to_string());
        let mut replies = self.replies.lock();
        if replies.is_empty() {
            Err(NetworkError::new("script exhausted"))
        } else {
            replies.remove(0)
        }
    }
}

/// Cooldowns fire only when the test says so
#[derive(Default)]
struct ManualTimer {
    pending: Mutex<Vec<(u64, mpsc::Sender<ScanEvent>)>>,
}

impl ManualTimer {
    async fn fire_all(&self) {
        let pending: Vec<_> = self.pending.lock().drain(..).collect();
        for (generation, tx) in pending {
            tx.send(ScanEvent::CooldownElapsed(generation)).await.unwrap();
        }
    }

    fn scheduled(&self) -> usize {
        self.pending.lock().len()
    }
}

impl CooldownTimer for ManualTimer {
    fn schedule(&self, generation: u64, _after: Duration, events_tx: mpsc::Sender<ScanEvent>) {
        self.pending.lock().push((generation, events_tx));
    }
}

enum Shown {
    Payload(DisplayPayload),
    Devices(usize),
}

struct ChannelDisplay(mpsc::UnboundedSender<Shown>);

impl DisplaySink for ChannelDisplay {
    fn show(&mut self, payload: &DisplayPayload) {
        let _ = self.0.send(Shown::Payload(payload.clone()));
    }

    fn show_devices(&mut self, selector: &DeviceSelector) {
        let _ = self.0.send(Shown::Devices(selector.options().len()));
    }
}

struct Harness {
    camera: FakeCamera,
    ledger: Arc<FakeLedger>,
    timer: Arc<ManualTimer>,
    shown: mpsc::UnboundedReceiver<Shown>,
    events_tx: mpsc::Sender<ScanEvent>,
    handle: tokio::task::JoinHandle<ScanController>,
}

fn devices() -> Vec<DeviceInfo> {
    vec![
        DeviceInfo { id: DeviceId("/dev/video0".into()), label: "Integrated Webcam".into() },
        DeviceInfo { id: DeviceId("/dev/video2".into()), label: "USB Back Camera".into() },
    ]
}

async fn start(replies: Vec<Result<BackendReply, NetworkError>>) -> Harness {
    let camera = FakeCamera::default();
    let ledger = FakeLedger::new(replies);
    let timer = Arc::new(ManualTimer::default());
    let (shown_tx, shown) = mpsc::unbounded_channel();

    let (mut controller, events_rx) = ScanController::new(
        &Config::default(),
        Arc::new(FakePlatform(Ok(devices()))),
        Box::new(camera.clone()),
        ledger.clone(),
        timer.clone(),
        Box::new(ChannelDisplay(shown_tx)),
        Arc::new(Metrics::new()),
    );
    controller.start().await.unwrap();
    let events_tx = controller.events_tx();
    let handle = tokio::spawn(async move {
        controller.run(events_rx).await;
        controller
    });

    Harness { camera, ledger, timer, shown, events_tx, handle }
}

impl Harness {
    async fn next_payload(&mut self) -> DisplayPayload {
        loop {
            let shown = tokio::time::timeout(Duration::from_secs(2), self.shown.recv())
                .await
                .expect("timed out waiting for display")
                .expect("display closed");
            if let Shown::Payload(p) = shown {
                return p;
            }
        }
    }

    /// Wait until the controller has scheduled a cooldown
    async fn wait_for_cooldown(&self) {
        for _ in 0..200 {
            if self.timer.scheduled() > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("cooldown never scheduled");
    }

    async fn wait_until_resumed(&self) {
        for _ in 0..200 {
            if !self.camera.paused() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("capture never resumed");
    }

    async fn shutdown(self) -> ScanController {
        self.events_tx.send(ScanEvent::Shutdown).await.unwrap();
        self.handle.await.unwrap()
    }
}

fn reply(status: u16, body: &str) -> Result<BackendReply, NetworkError> {
    Ok(BackendReply::from_parts(status, body.as_bytes()))
}

#[tokio::test]
async fn test_start_prefers_rear_camera_and_lists_devices() {
    let mut h = start(vec![]).await;

    assert!(matches!(h.shown.recv().await, Some(Shown::Devices(2))));
    let started = h.camera.0.lock().started_with.clone();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].device, Some(DeviceId("/dev/video2".into())));

    let controller = h.shutdown().await;
    assert_eq!(controller.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_success_flow_sends_one_request_and_rearms() {
    let mut h = start(vec![reply(200, r#"{"success":true,"message":"OK","saldo_restante":5}"#)]).await;

    h.camera.frame(BADGE);
    h.camera.frame(BADGE);
    h.camera.frame(BADGE);

    let pending = h.next_payload().await;
    assert_eq!(pending.tone, Tone::Pending);
    let result = h.next_payload().await;
    assert_eq!(result.tone, Tone::Success);
    assert_eq!(result.body, "OK");
    assert_eq!(result.remaining_balance.as_deref(), Some("5"));
    assert!(h.camera.paused());

    h.wait_for_cooldown().await;
    assert_eq!(*h.ledger.calls.lock(), vec!["P123".to_string()]);

    h.timer.fire_all().await;
    h.wait_until_resumed().await;

    let controller = h.shutdown().await;
    assert_eq!(controller.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_network_error_then_same_badge_accepted_after_cooldown() {
    let mut h = start(vec![
        Err(NetworkError::new("connection refused")),
        reply(400, r#"{"success":false,"message":"ID not found"}"#),
    ])
    .await;

    h.camera.frame(BADGE);
    assert_eq!(h.next_payload().await.tone, Tone::Pending);
    let failed = h.next_payload().await;
    assert_eq!(failed.tone, Tone::Error);
    assert_eq!(failed.body, GENERIC_CONNECTION_ERROR);

    h.wait_for_cooldown().await;
    h.timer.fire_all().await;
    h.wait_until_resumed().await;

    h.camera.frame(BADGE);
    assert_eq!(h.next_payload().await.tone, Tone::Pending);
    let denied = h.next_payload().await;
    assert_eq!(denied.tone, Tone::Failure);
    assert_eq!(denied.body, "ID not found");

    assert_eq!(h.ledger.calls.lock().len(), 2);
    h.shutdown().await;
}

#[tokio::test]
async fn test_lost_stream_is_shown_and_stops_capture() {
    let mut h = start(vec![]).await;

    h.camera.die().await;

    let shown = h.next_payload().await;
    assert_eq!(shown.tone, Tone::Error);
    assert_eq!(shown.headline, "Camera stopped");
    assert!(h.camera.0.lock().sink.is_none());

    h.shutdown().await;
}

#[tokio::test]
async fn test_lost_stream_from_replaced_capture_is_ignored() {
    let h = start(vec![]).await;
    let camera = h.camera.clone();
    let old_sink = camera.current_sink();

    h.events_tx.send(ScanEvent::DeviceSelected("1".to_string())).await.unwrap();
    old_sink.stream_lost("decoder exited".to_string()).await;

    let Harness { mut shown, events_tx, handle, .. } = h;
    events_tx.send(ScanEvent::Shutdown).await.unwrap();
    handle.await.unwrap();

    // Stop on switch plus the stop on shutdown, nothing for the stale report
    assert_eq!(camera.0.lock().stops, 2);
    while let Ok(item) = shown.try_recv() {
        if let Shown::Payload(p) = item {
            assert_ne!(p.headline, "Camera stopped");
        }
    }
}

#[tokio::test]
async fn test_malformed_badge_never_reaches_ledger() {
    let mut h = start(vec![]).await;

    h.camera.frame("https://example.com/not-a-badge");

    let shown = h.next_payload().await;
    assert_eq!(shown.tone, Tone::Failure);
    h.wait_for_cooldown().await;
    assert!(h.ledger.calls.lock().is_empty());

    h.shutdown().await;
}

#[tokio::test]
async fn test_device_switch_uses_selected_device() {
    let camera = FakeCamera::default();
    let timer = Arc::new(ManualTimer::default());
    let (shown_tx, _shown) = mpsc::unbounded_channel();
    let (mut controller, events_rx) = ScanController::new(
        &Config::default(),
        Arc::new(FakePlatform(Ok(devices()))),
        Box::new(camera.clone()),
        FakeLedger::new(vec![reply(200, r#"{"success":true,"message":"OK"}"#)]),
        timer.clone(),
        Box::new(ChannelDisplay(shown_tx)),
        Arc::new(Metrics::new()),
    );
    controller.start().await.unwrap();
    let events_tx = controller.events_tx();

    camera.frame(BADGE);
    events_tx.send(ScanEvent::DeviceSelected("1".to_string())).await.unwrap();
    events_tx.send(ScanEvent::Shutdown).await.unwrap();
    controller.run(events_rx).await;

    let state = camera.0.lock();
    assert_eq!(state.started_with.len(), 2);
    assert_eq!(state.started_with[1].device, Some(DeviceId("/dev/video0".into())));
    // Old stream stopped (failing is fine), plus the stop on shutdown
    assert_eq!(state.stops, 2);
    // Validation was in flight during the switch, so capture is paused again
    assert!(state.paused);
}

#[tokio::test]
async fn test_enumeration_failure_is_shown_and_fatal() {
    let (shown_tx, mut shown) = mpsc::unbounded_channel();
    let (mut controller, _events_rx) = ScanController::new(
        &Config::default(),
        Arc::new(FakePlatform(Err(()))),
        Box::new(FakeCamera::default()),
        FakeLedger::new(vec![]),
        Arc::new(ManualTimer::default()),
        Box::new(ChannelDisplay(shown_tx)),
        Arc::new(Metrics::new()),
    );

    let err = controller.start().await.unwrap_err();

    assert!(matches!(err, ScannerError::Enumeration(DeviceEnumerationError::PermissionDenied { .. })));
    match shown.try_recv() {
        Ok(Shown::Payload(p)) => {
            assert_eq!(p.tone, Tone::Error);
            assert_eq!(p.headline, "Camera unavailable");
        }
        _ => panic!("expected an error display"),
    }
}
