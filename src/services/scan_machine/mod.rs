//! Scan-validate state machine
//!
//! Turns decode events into at most one validation request per distinct payload per
//! cooldown window. The machine is synchronous: every handler returns the commands the
//! controller must execute (pause/resume capture, validate, display, schedule cooldown),
//! so transitions can be tested without timers, cameras or a network.
//!
//! ```text
//! Idle -> Decoded -> Parsing -> Validating -> Presenting -> Cooldown -> Idle
//!                       |             |
//!                       v             v
//!                   ParseError   NetworkError -> Cooldown
//! ```


use crate::domain::display::DisplayPayload;
use crate::domain::error::NetworkError;
use crate::domain::participant::{BackendReply, ParticipantPayload};
use crate::infra::metrics::{Metrics, OutcomeKind};
use crate::services::presenter::{present, Presentable};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Capturing, no pending result
    Idle,
    Decoded,
    Parsing,
    /// Request in flight
    Validating,
    Presenting,
    ParseError,
    NetworkError,
    Cooldown,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Decoded => "decoded",
            Phase::Parsing => "parsing",
            Phase::Validating => "validating",
            Phase::Presenting => "presenting",
            Phase::ParseError => "parse_error",
            Phase::NetworkError => "network_error",
            Phase::Cooldown => "cooldown",
        }
    }
}

/// Side effects requested by the machine, executed in order by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PauseCapture,
    ResumeCapture,
    /// Issue exactly one validation request for this participant id
    Validate { participant_id: String },
    Display(DisplayPayload),
    /// Deliver `CooldownElapsed(generation)` after `after`
    ScheduleCooldown { generation: u64, after: Duration },
}

/// Mutable scan state owned by the machine
#[derive(Debug, Clone)]
pub struct ScanSession {
    id: String,
    last_accepted_payload: Option<String>,
    phase: Phase,
    /// Bumped every time a cooldown is scheduled; stale timers carry an old value
    cooldown_generation: u64,
    started_at: Instant,
}

impl ScanSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            last_accepted_payload: None,
            phase: Phase::Idle,
            cooldown_generation: 0,
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_accepted_payload(&self) -> Option<&str> {
        self.last_accepted_payload.as_deref()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Cooldown expiry: forget the armed payload and go back to scanning
    fn reset(&mut self) {
        self.last_accepted_payload = None;
        self.phase = Phase::Idle;
    }
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ScanMachine {
    session: ScanSession,
    cooldown: Duration,
    /// Participant id of the request in flight, for logs
    in_flight: Option<String>,
    metrics: Arc<Metrics>,
}

impl ScanMachine {
    pub fn new(cooldown: Duration, metrics: Arc<Metrics>) -> Self {
        let session = ScanSession::new();
        info!(session_id = %session.id(), cooldown_ms = %cooldown.as_millis(), "scan_session_created");
        Self { session, cooldown, in_flight: None, metrics }
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    /// Capture must stay paused in every phase except `Idle`
    pub fn holds_capture(&self) -> bool {
        self.session.phase != Phase::Idle
    }

    fn enter(&mut self, phase: Phase) {
        debug!(
            session_id = %self.session.id,
            from = %self.session.phase.as_str(),
            to = %phase.as_str(),
            "scan_phase_changed"
        );
        self.session.phase = phase;
    }

    /// A frame produced text
    pub fn on_decoded(&mut self, text: &str) -> Vec<Command> {
        self.metrics.record_decode();

        if self.holds_capture() {
            if self.session.last_accepted_payload.as_deref() == Some(text) {
                self.metrics.record_duplicate();
                debug!(phase = %self.session.phase.as_str(), "scan_duplicate_ignored");
            } else {
                // Queued before the pause took effect
                self.metrics.record_stale_frame();
                debug!(phase = %self.session.phase.as_str(), "scan_stale_frame_dropped");
            }
            return Vec::new();
        }

        let mut commands = vec![Command::PauseCapture];
        self.session.last_accepted_payload = Some(text.to_string());
        self.enter(Phase::Decoded);

        self.enter(Phase::Parsing);
        match ParticipantPayload::parse(text) {
            Ok(participant) => {
                self.enter(Phase::Validating);
                self.metrics.record_validation_started();
                self.in_flight = Some(participant.id.clone());
                info!(
                    session_id = %self.session.id,
                    participant_id = %participant.id,
                    "scan_accepted"
                );
                commands.push(Command::Display(present(Presentable::Pending(&participant))));
                commands.push(Command::Validate { participant_id: participant.id });
            }
            Err(e) => {
                self.metrics.record_parse_error();
                warn!(session_id = %self.session.id, error = %e, "scan_parse_failed");
                self.enter(Phase::ParseError);
                commands.push(Command::Display(present(Presentable::ParseFailed(&e))));
                commands.push(self.start_cooldown());
            }
        }
        commands
    }

    /// The validation request finished, with or without a response
    pub fn on_validation_finished(
        &mut self,
        result: &Result<BackendReply, NetworkError>,
        latency: Duration,
    ) -> Vec<Command> {
        if self.session.phase != Phase::Validating {
            warn!(phase = %self.session.phase.as_str(), "scan_unexpected_validation_result");
            return Vec::new();
        }

        let participant_id = self.in_flight.take().unwrap_or_default();
        let latency_ms = latency.as_millis() as u64;

        let display = match result {
            Ok(reply) => {
                let approved =
                    reply.is_http_success() && reply.body.as_ref().is_some_and(|b| b.success);
                let kind = match (&reply.body, approved) {
                    (_, true) => OutcomeKind::Approved,
                    (Some(_), false) => OutcomeKind::Denied,
                    (None, false) => OutcomeKind::Error,
                };
                self.metrics.record_validation_finished(kind, latency_ms);
                info!(
                    session_id = %self.session.id,
                    participant_id = %participant_id,
                    status = %reply.status,
                    approved = %approved,
                    body_parsed = %reply.body.is_some(),
                    latency_ms = %latency_ms,
                    "scan_validated"
                );
                self.enter(Phase::Presenting);
                present(Presentable::Reply(reply))
            }
            Err(e) => {
                self.metrics.record_validation_finished(OutcomeKind::Error, latency_ms);
                warn!(
                    session_id = %self.session.id,
                    participant_id = %participant_id,
                    error = %e,
                    latency_ms = %latency_ms,
                    "scan_validation_network_error"
                );
                self.enter(Phase::NetworkError);
                present(Presentable::NetworkFailed(e))
            }
        };

        vec![Command::Display(display), self.start_cooldown()]
    }

    /// The cooldown timer fired
    pub fn on_cooldown_elapsed(&mut self, generation: u64) -> Vec<Command> {
        if self.session.phase != Phase::Cooldown || generation != self.session.cooldown_generation {
            debug!(
                generation = %generation,
                current = %self.session.cooldown_generation,
                "scan_stale_cooldown_ignored"
            );
            return Vec::new();
        }

        self.session.reset();
        debug!(session_id = %self.session.id, "scan_rearmed");
        vec![Command::ResumeCapture]
    }

    /// Capture was restarted on another device; re-pause if a result is pending
    pub fn on_capture_restarted(&self) -> Vec<Command> {
        if self.holds_capture() {
            vec![Command::PauseCapture]
        } else {
            Vec::new()
        }
    }

    fn start_cooldown(&mut self) -> Command {
        self.enter(Phase::Cooldown);
        self.session.cooldown_generation += 1;
        Command::ScheduleCooldown {
            generation: self.session.cooldown_generation,
            after: self.cooldown,
        }
    }
}
