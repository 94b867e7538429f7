//! Result presenter - maps outcomes to what the operator sees
//!
//! Pure functions only. Timers, network and rendering belong to the caller.

use crate::domain::display::{DisplayPayload, Tone};
use crate::domain::error::{CaptureStartError, DeviceEnumerationError, NetworkError, ParseError};
use crate::domain::participant::{BackendReply, ParticipantPayload};

/// Shown whenever no better message is available
pub const GENERIC_CONNECTION_ERROR: &str = "Connection error with the server. Please try again.";

/// Anything the scan loop can ask to display
#[derive(Debug, Clone, Copy)]
pub enum Presentable<'a> {
    /// Validation request in flight
    Pending(&'a ParticipantPayload),
    Reply(&'a BackendReply),
    ParseFailed(&'a ParseError),
    NetworkFailed(&'a NetworkError),
    EnumerationFailed(&'a DeviceEnumerationError),
    CaptureFailed(&'a CaptureStartError),
    /// Capture was running and stopped on its own
    CaptureLost(&'a str),
}

pub fn present(item: Presentable<'_>) -> DisplayPayload {
    match item {
        Presentable::Pending(participant) => {
            let who = match &participant.display_name {
                Some(name) => format!("{} ({})", name, participant.id),
                None => participant.id.clone(),
            };
            DisplayPayload::new(Tone::Pending, "Processing", format!("Checking ID {who}..."))
        }
        Presentable::Reply(reply) => present_reply(reply),
        Presentable::ParseFailed(_) => DisplayPayload::new(
            Tone::Failure,
            "Validation failed",
            "This QR code is not a valid participant badge.",
        ),
        Presentable::NetworkFailed(_) => {
            DisplayPayload::new(Tone::Error, "Error", GENERIC_CONNECTION_ERROR)
        }
        Presentable::EnumerationFailed(err) => DisplayPayload::new(
            Tone::Error,
            "Camera unavailable",
            format!(
                "Could not start the scanner ({err}). Make sure a camera is connected and \
                 permission has been granted, then restart."
            ),
        ),
        Presentable::CaptureFailed(_) => DisplayPayload::new(
            Tone::Error,
            "Camera unavailable",
            "Could not start the scanner. Make sure a camera is connected and permission \
             has been granted, then restart.",
        ),
        Presentable::CaptureLost(_) => DisplayPayload::new(
            Tone::Error,
            "Camera stopped",
            "The scanner stopped reading the camera. Pick a camera again or restart.",
        ),
    }
}

/// Non-2xx statuses and 2xx bodies with `success: false` render the same way.
fn present_reply(reply: &BackendReply) -> DisplayPayload {
    let Some(body) = &reply.body else {
        return DisplayPayload::new(Tone::Error, "Error", GENERIC_CONNECTION_ERROR);
    };

    let balance = body.remaining_balance.as_ref().map(|n| n.to_string());

    if reply.is_http_success() && body.success {
        let message = body.message.clone().unwrap_or_default();
        return DisplayPayload::new(Tone::Success, "Success", message).with_balance(balance);
    }

    let message = body
        .message
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(GENERIC_CONNECTION_ERROR);
    DisplayPayload::new(Tone::Failure, "Denied", message).with_balance(balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::TierRejection;

    fn reply(status: u16, body: &str) -> BackendReply {
        BackendReply::from_parts(status, body.as_bytes())
    }

    #[test]
    fn test_success_with_balance() {
        let r = reply(200, r#"{"success": true, "message": "OK", "saldo_restante": 5}"#);
        let display = present(Presentable::Reply(&r));
        assert_eq!(display.tone, Tone::Success);
        assert_eq!(display.body, "OK");
        assert_eq!(display.remaining_balance.as_deref(), Some("5"));
    }

    #[test]
    fn test_http_400_uses_body_message() {
        let r = reply(400, r#"{"success": false, "message": "ID not found"}"#);
        let display = present(Presentable::Reply(&r));
        assert_eq!(display.tone, Tone::Failure);
        assert_eq!(display.body, "ID not found");
        assert_ne!(display.body, GENERIC_CONNECTION_ERROR);
        assert_eq!(display.remaining_balance, None);
    }

    #[test]
    fn test_denied_2xx_matches_error_status() {
        let ok_status = reply(200, r#"{"success": false, "message": "No snacks left", "saldo_restante": 0}"#);
        let err_status = reply(409, r#"{"success": false, "message": "No snacks left", "saldo_restante": 0}"#);
        assert_eq!(present(Presentable::Reply(&ok_status)), present(Presentable::Reply(&err_status)));
        assert_eq!(
            present(Presentable::Reply(&ok_status)).remaining_balance.as_deref(),
            Some("0")
        );
    }

    #[test]
    fn test_error_status_without_message_is_generic() {
        let r = reply(500, r#"{"success": false}"#);
        let display = present(Presentable::Reply(&r));
        assert_eq!(display.tone, Tone::Failure);
        assert_eq!(display.body, GENERIC_CONNECTION_ERROR);
    }

    #[test]
    fn test_error_status_with_success_true_is_failure() {
        let r = reply(500, r#"{"success": true, "message": "partial"}"#);
        assert_eq!(present(Presentable::Reply(&r)).tone, Tone::Failure);
    }

    #[test]
    fn test_unparseable_body_is_generic_error() {
        let r = reply(502, "<html>bad gateway</html>");
        let display = present(Presentable::Reply(&r));
        assert_eq!(display.tone, Tone::Error);
        assert_eq!(display.body, GENERIC_CONNECTION_ERROR);
    }

    #[test]
    fn test_network_error_is_generic() {
        let err = NetworkError::new("connection refused");
        let display = present(Presentable::NetworkFailed(&err));
        assert_eq!(display.tone, Tone::Error);
        assert_eq!(display.body, GENERIC_CONNECTION_ERROR);
    }

    #[test]
    fn test_parse_error_is_failure() {
        let display = present(Presentable::ParseFailed(&ParseError::MissingId));
        assert_eq!(display.tone, Tone::Failure);
        assert_eq!(display.headline, "Validation failed");
    }

    #[test]
    fn test_pending_shows_name_and_id() {
        let p = ParticipantPayload { id: "P123".to_string(), display_name: Some("Ana".to_string()) };
        let display = present(Presentable::Pending(&p));
        assert_eq!(display.tone, Tone::Pending);
        assert!(display.body.contains("Ana (P123)"));
    }

    #[test]
    fn test_capture_failure_is_error() {
        let err = CaptureStartError {
            rejections: vec![TierRejection { tier: "unconstrained", reason: "busy".to_string() }],
        };
        assert_eq!(present(Presentable::CaptureFailed(&err)).tone, Tone::Error);
    }

    #[test]
    fn test_capture_lost_is_error() {
        let display = present(Presentable::CaptureLost("decoder exited"));
        assert_eq!(display.tone, Tone::Error);
        assert_eq!(display.headline, "Camera stopped");
    }
}
