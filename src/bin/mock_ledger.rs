//! Mock snack ledger HTTP server
//!
//! Implements the participant validation endpoint for local testing of the scanner.
//!
//! Endpoints:
//! - `POST /operador/validar_qr` - body `{"id_participante": "<id>"}`; decrements the
//!   participant's snack balance and records a redemption
//! - `GET /redemptions` - redemptions recorded since startup (JSON array)
//! - `GET /health` - `ok`
//!
//! Usage:
//!   cargo run --bin mock-ledger -- --port 5000 --participant 1:Ana:3 --participant 2:Luis:0

use bytes::Bytes;
use chrono::{DateTime, Utc};
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

const VALIDATE_PATH: &str = "/operador/validar_qr";

#[derive(Parser, Debug)]
#[command(name = "mock-ledger")]
#[command(about = "Mock snack ledger for local scanner testing")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// Participant as `id:name:balance` (repeatable). Demo participants are used if omitted.
    #[arg(long = "participant", value_parser = parse_participant)]
    participants: Vec<(i64, Participant)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Participant {
    name: String,
    balance: u32,
}

fn parse_participant(s: &str) -> Result<(i64, Participant), String> {
    let mut parts = s.splitn(3, ':');
    let (Some(id), Some(name), Some(balance)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("expected id:name:balance, got '{s}'"));
    };
    let id = id.trim().parse::<i64>().map_err(|e| format!("invalid id '{id}': {e}"))?;
    let balance =
        balance.trim().parse::<u32>().map_err(|e| format!("invalid balance '{balance}': {e}"))?;
    Ok((id, Participant { name: name.trim().to_string(), balance }))
}

#[derive(Debug, Clone, Serialize)]
struct Redemption {
    id_participante: i64,
    nombre_participante: String,
    fecha_hora: DateTime<Utc>,
}

#[derive(Default)]
struct Ledger {
    participants: Mutex<FxHashMap<i64, Participant>>,
    redemptions: Mutex<Vec<Redemption>>,
}

impl Ledger {
    fn new(participants: impl IntoIterator<Item = (i64, Participant)>) -> Self {
        Self {
            participants: Mutex::new(participants.into_iter().collect()),
            redemptions: Mutex::new(Vec::new()),
        }
    }

    /// Strings are trimmed and parsed; JSON integers are taken as-is
    fn participant_id(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Validate one redemption request body
    fn redeem(&self, body: &[u8]) -> (StatusCode, Value) {
        let request: Option<Value> = serde_json::from_slice(body).ok();
        let Some(raw_id) = request.as_ref().and_then(|r| r.get("id_participante")) else {
            return (
                StatusCode::BAD_REQUEST,
                json!({"success": false, "message": "Participant ID not provided."}),
            );
        };

        let Some(id) = Self::participant_id(raw_id) else {
            return (
                StatusCode::BAD_REQUEST,
                json!({"success": false, "message": "Invalid ID. Must be a number."}),
            );
        };

        let mut participants = self.participants.lock();
        let Some(participant) = participants.get_mut(&id) else {
            return (
                StatusCode::NOT_FOUND,
                json!({"success": false, "message": "Participant not found."}),
            );
        };

        if participant.balance == 0 {
            info!(participant_id = %id, "redemption_denied_no_balance");
            return (
                StatusCode::OK,
                json!({
                    "success": false,
                    "message": format!("{} has no snacks left.", participant.name),
                    "saldo_restante": 0
                }),
            );
        }

        participant.balance -= 1;
        let remaining = participant.balance;
        let name = participant.name.clone();
        drop(participants);

        self.redemptions.lock().push(Redemption {
            id_participante: id,
            nombre_participante: name.clone(),
            fecha_hora: Utc::now(),
        });
        info!(participant_id = %id, remaining = %remaining, "redemption_recorded");

        (
            StatusCode::OK,
            json!({
                "success": true,
                "message": format!("Snack recorded for {name}."),
                "saldo_restante": remaining
            }),
        )
    }

    fn redemptions_json(&self) -> Value {
        json!(*self.redemptions.lock())
    }
}

fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("static response should not fail")
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    ledger: Arc<Ledger>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    match (method, path.as_str()) {
        (Method::POST, VALIDATE_PATH) => {
            let body = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    warn!(error = %e, "request_body_read_failed");
                    Bytes::new()
                }
            };
            let (status, reply) = ledger.redeem(&body);
            Ok(json_response(status, &reply))
        }
        (Method::GET, "/redemptions") => Ok(json_response(StatusCode::OK, &ledger.redemptions_json())),
        (Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let participants = if args.participants.is_empty() {
        vec![
            (1, Participant { name: "Ana".to_string(), balance: 3 }),
            (2, Participant { name: "Luis".to_string(), balance: 0 }),
        ]
    } else {
        args.participants
    };
    for (id, p) in &participants {
        info!(participant_id = %id, name = %p.name, balance = %p.balance, "participant_loaded");
    }
    let ledger = Arc::new(Ledger::new(participants));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = %args.port, path = VALIDATE_PATH, "mock_ledger_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let ledger = ledger.clone();
                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let ledger = ledger.clone();
                                async move { handle_request(req, ledger).await }
                            });
                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!(error = %e, "mock_ledger_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "mock_ledger_accept_error");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("mock_ledger_shutdown");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> Ledger {
        Ledger::new([
            (1, Participant { name: "Ana".to_string(), balance: 2 }),
            (2, Participant { name: "Luis".to_string(), balance: 0 }),
        ])
    }

    #[test]
    fn test_missing_id_is_bad_request() {
        let (status, body) = ledger().redeem(br#"{"other": 1}"#);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Participant ID not provided.");

        let (status, _) = ledger().redeem(b"not json");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_non_numeric_id_is_bad_request() {
        let (status, body) = ledger().redeem(br#"{"id_participante": "P123"}"#);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid ID. Must be a number.");
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let (status, body) = ledger().redeem(br#"{"id_participante": "99"}"#);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[test]
    fn test_redeem_decrements_and_records() {
        let ledger = ledger();

        let (status, body) = ledger.redeem(br#"{"id_participante": "1"}"#);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["saldo_restante"], 1);

        let (_, body) = ledger.redeem(br#"{"id_participante": 1}"#);
        assert_eq!(body["saldo_restante"], 0);

        let (status, body) = ledger.redeem(br#"{"id_participante": "1"}"#);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["saldo_restante"], 0);

        let redemptions = ledger.redemptions_json();
        assert_eq!(redemptions.as_array().map(Vec::len), Some(2));
        assert_eq!(redemptions[0]["nombre_participante"], "Ana");
    }

    #[test]
    fn test_zero_balance_is_denied_without_record() {
        let ledger = ledger();
        let (status, body) = ledger.redeem(br#"{"id_participante": " 2 "}"#);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert!(ledger.redemptions.lock().is_empty());
    }

    #[test]
    fn test_parse_participant_arg() {
        assert_eq!(
            parse_participant("7:Marta Diaz:4"),
            Ok((7, Participant { name: "Marta Diaz".to_string(), balance: 4 }))
        );
        assert!(parse_participant("7:Marta").is_err());
        assert!(parse_participant("x:Marta:1").is_err());
    }
}
