//! Operator console: result display on stdout and commands from stdin

use crate::domain::display::{DisplayPayload, Tone};
use crate::domain::event::ScanEvent;
use crate::services::negotiator::DeviceSelector;
use crossterm::style::{Color, Stylize};
use std::io::{IsTerminal, Write};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Where results and the device list are shown
pub trait DisplaySink: Send {
    fn show(&mut self, payload: &DisplayPayload);

    fn show_devices(&mut self, selector: &DeviceSelector);
}

fn tone_color(tone: Tone) -> Color {
    match tone {
        Tone::Pending => Color::Yellow,
        Tone::Success => Color::Green,
        Tone::Failure => Color::Red,
        Tone::Error => Color::Magenta,
    }
}

/// Line-oriented display, colored when `styled`
pub struct ConsoleDisplay<W: Write + Send> {
    out: W,
    styled: bool,
}

impl ConsoleDisplay<std::io::Stdout> {
    /// Plain text when stdout is redirected to a file or pipe
    pub fn stdout() -> Self {
        let out = std::io::stdout();
        let styled = out.is_terminal();
        Self { out, styled }
    }
}

impl<W: Write + Send> ConsoleDisplay<W> {
    pub fn new(out: W, styled: bool) -> Self {
        Self { out, styled }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_payload(&mut self, payload: &DisplayPayload) -> std::io::Result<()> {
        let headline = format!("[{}]", payload.headline);
        if self.styled {
            let color = tone_color(payload.tone);
            writeln!(self.out, "{} {}", headline.with(color).bold(), payload.body)?;
        } else {
            writeln!(self.out, "{headline} {}", payload.body)?;
        }
        if let Some(balance) = &payload.remaining_balance {
            if self.styled {
                writeln!(self.out, "    Remaining balance: {}", balance.as_str().bold())?;
            } else {
                writeln!(self.out, "    Remaining balance: {balance}")?;
            }
        }
        self.out.flush()
    }

    fn write_devices(&mut self, selector: &DeviceSelector) -> std::io::Result<()> {
        let selected = selector.selected().map(|d| d.id.clone());
        for (i, device) in selector.options().iter().enumerate() {
            let marker = if Some(&device.id) == selected.as_ref() { "*" } else { " " };
            writeln!(self.out, "{marker} {}) {} [{}]", i + 1, device.label, device.id)?;
        }
        if !selector.is_visible() {
            let note = "(no other camera to choose from)";
            if self.styled {
                writeln!(self.out, "{}", note.dim())?;
            } else {
                writeln!(self.out, "{note}")?;
            }
        }
        self.out.flush()
    }
}

impl<W: Write + Send> DisplaySink for ConsoleDisplay<W> {
    fn show(&mut self, payload: &DisplayPayload) {
        if let Err(e) = self.write_payload(payload) {
            warn!(error = %e, "console_write_failed");
        }
    }

    fn show_devices(&mut self, selector: &DeviceSelector) {
        if let Err(e) = self.write_devices(selector) {
            warn!(error = %e, "console_write_failed");
        }
    }
}

/// Parse one operator command line
pub fn parse_command(line: &str) -> Option<ScanEvent> {
    let line = line.trim();
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (line, ""),
    };
    match cmd {
        "devices" | "d" => Some(ScanEvent::ListDevices),
        "use" | "u" if !arg.is_empty() => Some(ScanEvent::DeviceSelected(arg.to_string())),
        "quit" | "q" | "exit" => Some(ScanEvent::Shutdown),
        _ => None,
    }
}

/// Read operator commands until EOF or until the controller goes away.
/// EOF is not a shutdown: the scanner keeps running headless.
pub async fn run_operator_console<R>(input: R, events_tx: mpsc::Sender<ScanEvent>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    info!("operator_console_started");

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let Some(event) = parse_command(&line) else {
                    warn!(line = %line.trim(), "operator_command_unknown");
                    continue;
                };
                debug!(command = ?event, "operator_command");
                if events_tx.send(event).await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                debug!("operator_console_eof");
                return;
            }
            Err(e) => {
                warn!(error = %e, "operator_console_read_failed");
                return;
            }
        }
    }
}
