//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `v4l` - capture device enumeration through sysfs
//! - `decoder` - decode stream adapter over a QR decoding engine
//! - `zbar` - zbarcam child process as the decoding engine
//! - `ledger` - HTTP client for the participant validation endpoint
//! - `console` - operator display and stdin commands
//! - `shell_cache` - versioned offline cache for the station's shell assets

pub mod console;
pub mod decoder;
pub mod ledger;
pub mod shell_cache;
pub mod v4l;
pub mod zbar;

// Re-export commonly used types
pub use console::{run_operator_console, ConsoleDisplay, DisplaySink};
pub use decoder::{DecodeEngine, DecodeStreamAdapter, FrameSink};
pub use ledger::{HttpValidationClient, ValidationClient};
pub use shell_cache::{CacheError, ReqwestFetch, ShellCache};
pub use v4l::SysfsMediaPlatform;
pub use zbar::ZbarEngine;
