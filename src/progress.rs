//! Terminal progress and log routing.
//!
//! [`Progress`] turns [`ProcessEvent`]s into an `indicatif` bar with one
//! unit per derivative and the running size of written derivatives as its
//! message.
//!
//! Log lines and the bar share the terminal. [`LogSink`] is the
//! `tracing_subscriber` writer: while a bar is attached it prints each record
//! above the bar, otherwise straight to stderr. Attachment lasts as long as
//! the [`AttachGuard`] returned by [`LogSink::attach`].

use crate::output;
use crate::process::ProcessEvent;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tracing_subscriber::fmt::MakeWriter;

const BAR_TEMPLATE: &str = "{bar:40} {pos}/{len} derivatives ({percent}%) | {msg}";

/// Progress bar driven by process events.
pub struct Progress {
    bar: ProgressBar,
    written_bytes: u64,
}

impl Progress {
    /// A visible bar sized for `total_units` derivatives.
    pub fn new(total_units: u64) -> Self {
        let bar = ProgressBar::new(total_units);
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓▒░ "),
        );
        Self::with_bar(bar)
    }

    /// A bar that never draws.
    pub fn hidden(total_units: u64) -> Self {
        Self::with_bar(ProgressBar::with_draw_target(
            Some(total_units),
            ProgressDrawTarget::hidden(),
        ))
    }

    fn with_bar(bar: ProgressBar) -> Self {
        bar.set_message(format_megabytes(0));
        Self {
            bar,
            written_bytes: 0,
        }
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn written_bytes(&self) -> u64 {
        self.written_bytes
    }

    /// Advance the bar for one event and print its lines above it.
    pub fn apply(&mut self, event: &ProcessEvent) {
        match event {
            ProcessEvent::DerivativeWritten { bytes } => {
                self.written_bytes += bytes;
                self.bar.inc(1);
                self.bar.set_message(format_megabytes(self.written_bytes));
            }
            ProcessEvent::ImageFailed { units_missed, .. } => self.bar.inc(*units_missed),
            _ => {}
        }
        let lines = output::format_process_event(event);
        if !lines.is_empty() {
            self.bar.suspend(|| {
                for line in lines {
                    println!("{line}");
                }
            });
        }
    }

    pub fn finish(&self) {
        self.bar.finish();
    }
}

/// `12.34 MB written`
fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB written", bytes as f64 / (1024.0 * 1024.0))
}

#[derive(Clone)]
enum Target {
    Stderr,
    Buffer(Arc<Mutex<Vec<u8>>>),
}

/// `MakeWriter` that keeps log lines from tearing an attached progress bar.
#[derive(Clone)]
pub struct LogSink {
    bar: Arc<Mutex<Option<ProgressBar>>>,
    target: Target,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink {
    pub fn new() -> Self {
        Self {
            bar: Arc::default(),
            target: Target::Stderr,
        }
    }

    /// A sink writing into a shared buffer instead of stderr.
    pub fn capturing() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Self {
            bar: Arc::default(),
            target: Target::Buffer(Arc::clone(&buffer)),
        };
        (sink, buffer)
    }

    /// Route log lines around `bar` until the guard is dropped.
    pub fn attach(&self, bar: ProgressBar) -> AttachGuard {
        *self.bar.lock().unwrap_or_else(PoisonError::into_inner) = Some(bar);
        AttachGuard { sink: self.clone() }
    }

    pub fn is_attached(&self) -> bool {
        self.bar
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Detaches the bar from its [`LogSink`] on drop.
pub struct AttachGuard {
    sink: LogSink,
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        *self.sink.bar.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// One log record, buffered and written out on drop.
pub struct LogWriter {
    bar: Option<ProgressBar>,
    target: Target,
    buf: Vec<u8>,
}

impl Write for LogWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogWriter {
    fn emit(&self) -> io::Result<()> {
        match &self.target {
            Target::Stderr => io::stderr().write_all(&self.buf),
            Target::Buffer(buffer) => {
                buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&self.buf);
                Ok(())
            }
        }
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let result = match &self.bar {
            Some(bar) => bar.suspend(|| self.emit()),
            None => self.emit(),
        };
        result.ok();
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            bar: self
                .bar
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            target: self.target.clone(),
            buf: Vec::new(),
        }
    }
}
