//! Services - scanning logic and orchestration
//!
//! This module contains the core scanning services:
//! - `negotiator` - camera enumeration, rear-camera preference and constraint tiers
//! - `scan_machine` - scan-validate state machine (dedup, cooldown, at most one request)
//! - `presenter` - maps outcomes to operator display payloads
//! - `scheduler` - cooldown timer capability
//! - `controller` - single event loop wiring the machine to capture, ledger and display

pub mod controller;
pub mod negotiator;
pub mod presenter;
pub mod scan_machine;
pub mod scheduler;

// Re-export commonly used types
pub use controller::ScanController;
pub use negotiator::{CameraNegotiator, DeviceSelector, MediaPlatform};
pub use scan_machine::{Command, Phase, ScanMachine, ScanSession};
pub use scheduler::{CooldownTimer, TokioTimer};
