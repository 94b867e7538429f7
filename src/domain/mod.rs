//! Domain models - core scanning types
//!
//! This module contains the canonical data types used throughout the system:
//! - `CaptureDevice`, `ConstraintTiers` - camera selection
//! - `ParticipantPayload` - parsed QR badge contents
//! - `ValidationRequest`, `ValidationOutcome`, `BackendReply` - ledger wire format
//! - `DisplayPayload` - operator-facing result
//! - `ScanEvent` - controller queue events
//! - `error` - error taxonomy

pub mod display;
pub mod error;
pub mod event;
pub mod participant;
pub mod types;

// Re-export commonly used types at module level
pub use display::{DisplayPayload, Tone};
pub use event::ScanEvent;
pub use error::{CaptureStartError, DeviceEnumerationError, NetworkError, ParseError, ScannerError};
pub use participant::{BackendReply, ParticipantPayload, ValidationOutcome, ValidationRequest};
pub use types::{CaptureDevice, ConstraintSet, ConstraintTiers, DeviceId, DeviceInfo};
