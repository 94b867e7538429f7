//! Participant QR payloads and the ledger wire format
//!
//! A participant badge encodes a JSON object such as
//! `{"id": 17, "nombre": "Ana", "pais": "CO"}`. Only `id` is required; it is the only
//! field ever sent to the ledger.

use crate::domain::error::ParseError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Keys accepted as a human-readable participant name
const DISPLAY_NAME_KEYS: [&str; 4] = ["displayName", "nombre", "nombre_participante", "name"];

/// Parsed participant badge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantPayload {
    pub id: String,
    pub display_name: Option<String>,
}

impl ParticipantPayload {
    /// Parse decoded QR text.
    ///
    /// `id` may be a string or an integer (badges printed from a numeric primary key);
    /// integers are normalised to their decimal form. Blank ids are rejected.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(text.trim())
            .map_err(|e| ParseError::NotStructured(e.to_string()))?;

        let Value::Object(fields) = value else {
            return Err(ParseError::NotStructured("top-level value is not an object".to_string()));
        };

        let id = match fields.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
            _ => return Err(ParseError::MissingId),
        };

        Ok(Self { id, display_name: display_name(&fields) })
    }
}

fn display_name(fields: &Map<String, Value>) -> Option<String> {
    DISPLAY_NAME_KEYS.iter().find_map(|key| match fields.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

/// Body of `POST <validate_url>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationRequest {
    #[serde(rename = "id_participante")]
    pub participant_id: String,
}

/// Ledger response body, for both 2xx and error statuses
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValidationOutcome {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    /// Absent means "not applicable"
    #[serde(default, rename = "saldo_restante")]
    pub remaining_balance: Option<Number>,
}

/// What came back from the ledger when a response was received at all
#[derive(Debug, Clone, PartialEq)]
pub struct BackendReply {
    pub status: u16,
    /// `None` when the body could not be parsed as a `ValidationOutcome`
    pub body: Option<ValidationOutcome>,
}

impl BackendReply {
    pub fn is_http_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Build a reply from raw status and body bytes
    pub fn from_parts(status: u16, body: &[u8]) -> Self {
        Self { status, body: serde_json::from_slice(body).ok() }
    }
}
