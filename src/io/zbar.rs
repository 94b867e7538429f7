//! zbar decoding engine
//!
//! Runs `zbarcam` (or any command with the same contract) as a child process and
//! reads one decoded payload per stdout line. A constraint tier counts as rejected
//! when the process exits inside the start probe window, which is how zbarcam reports
//! a device it cannot open or a resolution it cannot negotiate.
//!
//! V4L2 has no facing-mode control, so a facing tier opens the device the negotiator
//! classified for that facing, at the driver's default resolution.

use crate::domain::types::ConstraintSet;
use crate::io::decoder::{DecodeEngine, FrameSink, StartRejected};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct ZbarEngine {
    command: String,
    args: Vec<String>,
    start_probe: Duration,
    paused: Arc<AtomicBool>,
    child: Option<Child>,
    tasks: Vec<JoinHandle<()>>,
}

impl ZbarEngine {
    pub fn new(command: &str, args: &[String], start_probe: Duration) -> Self {
        Self {
            command: command.to_string(),
            args: args.to_vec(),
            start_probe,
            paused: Arc::new(AtomicBool::new(false)),
            child: None,
            tasks: Vec::new(),
        }
    }

    /// Full argument list for a constraint set
    fn build_args(&self, constraints: &ConstraintSet) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(resolution) = constraints.resolution {
            args.push(format!("--prescale={resolution}"));
        }
        if let Some(device) = constraints.device.as_ref().or(constraints.facing_device.as_ref()) {
            args.push(device.as_str().to_string());
        }
        args
    }

    async fn release(&mut self) -> Result<(), String> {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        let result = match self.child.take() {
            Some(mut child) => child.kill().await.map_err(|e| e.to_string()),
            None => Ok(()),
        };
        self.paused.store(false, Ordering::Relaxed);
        result
    }
}

#[async_trait]
impl DecodeEngine for ZbarEngine {
    async fn try_start(
        &mut self,
        constraints: &ConstraintSet,
        sink: FrameSink,
    ) -> Result<(), StartRejected> {
        if let Err(e) = self.release().await {
            debug!(error = %e, "decoder_release_failed");
        }

        if let (Some(facing), None, None) =
            (constraints.facing, &constraints.device, &constraints.facing_device)
        {
            debug!(facing = %facing.as_str(), "decoder_facing_without_device");
        }

        let args = self.build_args(constraints);
        debug!(command = %self.command, args = ?args, "decoder_spawning");

        let mut child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StartRejected(format!("failed to spawn {}: {e}", self.command)))?;

        let stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        match tokio::time::timeout(self.start_probe, child.wait()).await {
            Ok(Ok(status)) => {
                let mut message = String::new();
                if let Some(stderr) = stderr.as_mut() {
                    let _ = stderr.read_to_string(&mut message).await;
                }
                let message = message.trim();
                return Err(StartRejected(if message.is_empty() {
                    format!("decoder exited with {status}")
                } else {
                    format!("decoder exited with {status}: {message}")
                }));
            }
            Ok(Err(e)) => {
                return Err(StartRejected(format!("failed to wait on decoder: {e}")));
            }
            Err(_) => {} // still running after the probe window
        }

        let Some(stdout) = stdout else {
            let _ = child.kill().await;
            return Err(StartRejected("decoder stdout unavailable".to_string()));
        };

        info!(pid = ?child.id(), "decoder_running");
        self.paused.store(false, Ordering::Relaxed);
        self.tasks.push(tokio::spawn(read_frames(stdout, sink, self.paused.clone())));
        if let Some(stderr) = stderr {
            self.tasks.push(tokio::spawn(drain_stderr(stderr)));
        }
        self.child = Some(child);
        Ok(())
    }

    fn pause(&mut self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    fn resume(&mut self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    async fn stop(&mut self) -> Result<(), String> {
        let result = self.release().await;
        info!("decoder_stopped");
        result
    }
}

/// Forward decoded lines to the sink, dropping everything while paused.
/// End of stream means the decoder died; `stop` aborts this task before killing it.
async fn read_frames(stdout: ChildStdout, sink: FrameSink, paused: Arc<AtomicBool>) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                warn!("decoder_stream_ended");
                sink.stream_lost("decoder exited".to_string()).await;
                return;
            }
            Ok(_) => {
                if paused.load(Ordering::Relaxed) {
                    continue;
                }
                let text = String::from_utf8_lossy(&buf);
                let text = text.trim_end_matches(['\r', '\n']);
                if text.is_empty() {
                    sink.frame_error("empty decode");
                    continue;
                }
                if !sink.decoded(text.to_string()) {
                    debug!("decoder_sink_closed");
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, "decoder_read_failed");
                sink.stream_lost(format!("decoder output unreadable: {e}")).await;
                return;
            }
        }
    }
}

async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(line = %line, "decoder_stderr");
    }
}
