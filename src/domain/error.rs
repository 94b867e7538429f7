//! Error taxonomy for the scan-validate loop
//!
//! Enumeration and capture-start errors are fatal to scanning. Parse and network
//! errors are recoverable: the cooldown re-arms capture.

use std::path::PathBuf;
use thiserror::Error;

/// Capture devices could not be listed.
#[derive(Debug, Error)]
pub enum DeviceEnumerationError {
    /// Platform reports no capture hardware.
    #[error("no capture device found")]
    NoHardware,

    /// Access to the device list was refused.
    #[error("permission denied while listing capture devices at {path}")]
    PermissionDenied { path: PathBuf },

    /// Any other IO failure while listing devices.
    #[error("failed to list capture devices at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One constraint tier refused by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierRejection {
    pub tier: &'static str,
    pub reason: String,
}

/// Every constraint tier was rejected.
#[derive(Debug, Error)]
#[error("camera could not be started with any constraint tier ({})", summarize(.rejections))]
pub struct CaptureStartError {
    pub rejections: Vec<TierRejection>,
}

fn summarize(rejections: &[TierRejection]) -> String {
    if rejections.is_empty() {
        return "no tiers configured".to_string();
    }
    rejections
        .iter()
        .map(|r| format!("{}: {}", r.tier, r.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Decoded text is not a participant payload.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("decoded text is not a JSON object: {0}")]
    NotStructured(String),

    #[error("payload has no usable `id` field")]
    MissingId,
}

/// The validation request failed before any response arrived.
#[derive(Debug, Clone, Error)]
#[error("validation request failed: {message}")]
pub struct NetworkError {
    pub message: String,
}

impl NetworkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Errors that stop the scanner. The operator has to fix the camera and restart.
#[derive(Debug, Error)]
pub enum ScannerError {
    #[error(transparent)]
    Enumeration(#[from] DeviceEnumerationError),

    #[error(transparent)]
    CaptureStart(#[from] CaptureStartError),
}
