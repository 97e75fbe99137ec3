//! Concurrent monitoring of the agent's output streams.
//!
//! Two worker tasks drain stdout and stderr line by line and forward
//! events over a channel to a single supervising loop. The supervisor is
//! the only owner of the tool histogram, the captured transcript, and the
//! terminal: it echoes ordinary lines as they arrive, condenses tool
//! marker lines into a rate-limited summary, emits a heartbeat when the
//! agent goes quiet, and enforces the inactivity deadline.
//!
//! Timing uses `tokio::time::Instant` throughout so the whole monitor
//! runs under paused time in tests.

use std::collections::HashMap;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};

use crate::agent::line;
use crate::error::{GrindError, Result};
use crate::format;

/// Heartbeat fires after this much quiet on the terminal.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Condensed tool summaries print at most this often.
const TOOL_SUMMARY_INTERVAL: Duration = Duration::from_secs(3);

/// Supervisor timer granularity.
const SUPERVISOR_TICK: Duration = Duration::from_secs(1);

/// Tools shown in a condensed summary line.
const TOOL_SUMMARY_ITEMS: usize = 6;

/// Event channel capacity.
const CHANNEL_CAPACITY: usize = 256;

/// Captured output of one agent run.
#[derive(Debug, Clone, Default)]
pub struct StreamResult {
    pub stdout_text: String,
    pub stderr_text: String,
    pub tool_counts: HashMap<String, u64>,
}

impl StreamResult {
    /// Both streams joined for completion/error scanning.
    #[must_use]
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout_text, self.stderr_text)
    }
}

/// Monitor configuration for one run.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Suppress raw tool lines and aggregate them instead
    pub compact_tools: bool,
    /// Abort when both streams stay silent this long; `None` disables
    pub inactivity_timeout: Option<Duration>,
    /// When the iteration started, for heartbeat elapsed time
    pub started: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Stdout,
    Stderr,
}

#[derive(Debug)]
enum StreamEvent {
    Line { source: Source, text: String },
    Eof,
    Failed { error: std::io::Error },
}

/// Drain both streams concurrently until EOF, timeout, or read error.
///
/// On success returns the full transcript per stream plus the tool
/// histogram. An inactivity timeout surfaces as
/// [`GrindError::Inactivity`]; the caller owns killing the process.
pub async fn monitor_streams<O, E>(
    stdout: O,
    stderr: E,
    options: MonitorOptions,
) -> Result<StreamResult>
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(drain_stream(stdout, Source::Stdout, tx.clone()));
    tokio::spawn(drain_stream(stderr, Source::Stderr, tx));

    Supervisor::new(options).run(rx).await
}

/// Buffered fallback: read both streams to completion, then derive the
/// tool histogram from the combined text. No heartbeat, no timeout.
pub async fn buffer_streams<O, E>(mut stdout: O, mut stderr: E) -> Result<StreamResult>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();

    let (stdout_read, stderr_read) = tokio::join!(
        stdout.read_to_end(&mut stdout_buf),
        stderr.read_to_end(&mut stderr_buf)
    );
    stdout_read.map_err(|e| GrindError::stream(e.to_string()))?;
    stderr_read.map_err(|e| GrindError::stream(e.to_string()))?;

    let stdout_text = String::from_utf8_lossy(&stdout_buf).into_owned();
    let stderr_text = String::from_utf8_lossy(&stderr_buf).into_owned();
    let combined = format!("{stdout_text}\n{stderr_text}");

    Ok(StreamResult {
        tool_counts: line::tool_counts_from_text(&combined),
        stdout_text,
        stderr_text,
    })
}

async fn drain_stream<R>(reader: R, source: Source, tx: mpsc::Sender<StreamEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(text)) => {
                if tx.send(StreamEvent::Line { source, text }).await.is_err() {
                    // Supervisor is gone; stop reading
                    return;
                }
            }
            Ok(None) => {
                let _ = tx.send(StreamEvent::Eof).await;
                return;
            }
            Err(error) => {
                let _ = tx.send(StreamEvent::Failed { error }).await;
                return;
            }
        }
    }
}

struct Supervisor {
    options: MonitorOptions,
    stdout_text: String,
    stderr_text: String,
    tool_counts: HashMap<String, u64>,
    last_activity: Instant,
    last_printed: Instant,
    last_summary: Option<Instant>,
}

impl Supervisor {
    fn new(options: MonitorOptions) -> Self {
        let now = Instant::now();
        Self {
            options,
            stdout_text: String::new(),
            stderr_text: String::new(),
            tool_counts: HashMap::new(),
            last_activity: now,
            last_printed: now,
            last_summary: None,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<StreamEvent>) -> Result<StreamResult> {
        let mut open_streams = 2u8;
        let mut ticker = time::interval(SUPERVISOR_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(StreamEvent::Line { source, text }) => self.handle_line(source, text),
                    Some(StreamEvent::Eof) => {
                        open_streams -= 1;
                        if open_streams == 0 {
                            return Ok(self.finish());
                        }
                    }
                    Some(StreamEvent::Failed { error }) => {
                        return Err(GrindError::stream(error.to_string()));
                    }
                    None => return Ok(self.finish()),
                },
                _ = ticker.tick() => self.on_tick()?,
            }
        }
    }

    fn handle_line(&mut self, source: Source, text: String) {
        // The transcript keeps every line, including suppressed tool
        // markers, so completion detection sees the full output.
        let sink = match source {
            Source::Stdout => &mut self.stdout_text,
            Source::Stderr => &mut self.stderr_text,
        };
        sink.push_str(&text);
        sink.push('\n');
        self.last_activity = Instant::now();

        if self.options.compact_tools {
            if let Some(tool) = line::tool_marker(&line::strip_ansi(&text)) {
                *self.tool_counts.entry(tool).or_insert(0) += 1;
                self.maybe_print_tool_summary();
                return;
            }
        }

        if text.is_empty() {
            println!();
        } else {
            match source {
                Source::Stdout => println!("{text}"),
                Source::Stderr => eprintln!("{text}"),
            }
        }
        self.last_printed = Instant::now();
    }

    fn maybe_print_tool_summary(&mut self) {
        if self.tool_counts.is_empty() {
            return;
        }
        let now = Instant::now();
        if let Some(last) = self.last_summary {
            if now.duration_since(last) < TOOL_SUMMARY_INTERVAL {
                return;
            }
        }

        let summary = format::tool_summary(&self.tool_counts, TOOL_SUMMARY_ITEMS);
        if !summary.is_empty() {
            println!("| tools    {summary}");
            self.last_printed = now;
            self.last_summary = Some(now);
        }
    }

    fn on_tick(&mut self) -> Result<()> {
        let now = Instant::now();

        if let Some(timeout) = self.options.inactivity_timeout {
            let idle = now.duration_since(self.last_activity);
            if idle > timeout {
                return Err(GrindError::Inactivity {
                    idle_ms: idle.as_millis() as u64,
                });
            }
        }

        if now.duration_since(self.last_printed) >= HEARTBEAT_INTERVAL {
            let elapsed = format::format_duration(
                now.duration_since(self.options.started).as_millis() as u64,
            );
            let since_activity =
                format::format_duration(now.duration_since(self.last_activity).as_millis() as u64);
            println!("⏳ working... elapsed {elapsed} · last activity {since_activity} ago");
            self.last_printed = now;
        }

        Ok(())
    }

    fn finish(self) -> StreamResult {
        StreamResult {
            stdout_text: self.stdout_text,
            stderr_text: self.stderr_text,
            tool_counts: self.tool_counts,
        }
    }
}
