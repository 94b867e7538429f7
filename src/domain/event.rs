//! Events consumed by the scan controller's single queue

use crate::domain::error::NetworkError;
use crate::domain::participant::BackendReply;
use std::time::Duration;

#[derive(Debug)]
pub enum ScanEvent {
    /// The decoder recognised a code in frame
    Decoded(String),
    /// A validation request finished, with or without a response
    ValidationFinished {
        result: Result<BackendReply, NetworkError>,
        latency: Duration,
    },
    /// The running capture stream died; `stream` identifies which start it belonged to
    CaptureLost { stream: u64, reason: String },
    /// Cooldown timer fired; carries the generation it was scheduled with
    CooldownElapsed(u64),
    /// Operator picked another device (id or 1-based position)
    DeviceSelected(String),
    /// Operator asked for the device list
    ListDevices,
    Shutdown,
}
