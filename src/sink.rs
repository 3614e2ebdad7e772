use std::io::{self, Write};

use tracing::Level;

/// Destination for program output, debug dumps and error diagnostics.
///
/// Writes may be buffered; a `flush` ends the current line and makes
/// everything written so far visible.
pub trait Sink {
    fn write_text(&mut self, text: &str);
    fn write_char(&mut self, ch: u8);
    fn write_int(&mut self, value: i64);
    fn flush(&mut self);
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn write_text(&mut self, text: &str) {
        (**self).write_text(text)
    }

    fn write_char(&mut self, ch: u8) {
        (**self).write_char(ch)
    }

    fn write_int(&mut self, value: i64) {
        (**self).write_int(value)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

/// Line-oriented sink over any writer: each flush terminates the line with `\n`.
///
/// The first I/O error is kept and every later write is dropped; collect it
/// with [`LineSink::finish`].
#[derive(Debug)]
pub struct LineSink<W: Write> {
    writer: W,
    error: Option<io::Error>,
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            error: None,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Return the writer, or the first error seen while writing to it.
    pub fn finish(self) -> io::Result<W> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.writer),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.writer.write_all(bytes) {
            self.error = Some(e);
        }
    }
}

impl LineSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Sink for LineSink<W> {
    fn write_text(&mut self, text: &str) {
        self.write_bytes(text.as_bytes());
    }

    fn write_char(&mut self, ch: u8) {
        self.write_bytes(&[ch]);
    }

    fn write_int(&mut self, value: i64) {
        self.write_bytes(value.to_string().as_bytes());
    }

    fn flush(&mut self) {
        self.write_bytes(b"\n");
        if self.error.is_none() {
            if let Err(e) = self.writer.flush() {
                self.error = Some(e);
            }
        }
    }
}

/// Sink that buffers a line and emits it as a `tracing` event on flush.
#[derive(Debug)]
pub struct TracingSink {
    level: Level,
    line: Vec<u8>,
}

impl TracingSink {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            line: Vec::new(),
        }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl Sink for TracingSink {
    fn write_text(&mut self, text: &str) {
        self.line.extend_from_slice(text.as_bytes());
    }

    fn write_char(&mut self, ch: u8) {
        self.line.push(ch);
    }

    fn write_int(&mut self, value: i64) {
        self.line.extend_from_slice(value.to_string().as_bytes());
    }

    fn flush(&mut self) {
        let line = String::from_utf8_lossy(&self.line);
        // `tracing` macros need a constant level.
        match self.level {
            Level::ERROR => tracing::error!(target: "bfpp::program", "{line}"),
            Level::WARN => tracing::warn!(target: "bfpp::program", "{line}"),
            Level::INFO => tracing::info!(target: "bfpp::program", "{line}"),
            Level::DEBUG => tracing::debug!(target: "bfpp::program", "{line}"),
            _ => tracing::trace!(target: "bfpp::program", "{line}"),
        }
        self.line.clear();
    }
}

/// One call received by a [`RecordingSink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkEvent {
    Text(String),
    Char(u8),
    Int(i64),
    Flush,
}

/// Sink that records every call, for hosts that inspect output after a run.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<SinkEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, with each flush rendered as a newline.
    pub fn rendered(&self) -> String {
        let mut out = String::new();
        for event in &self.events {
            match event {
                SinkEvent::Text(text) => out.push_str(text),
                SinkEvent::Char(ch) => out.push(char::from(*ch)),
                SinkEvent::Int(value) => out.push_str(&value.to_string()),
                SinkEvent::Flush => out.push('\n'),
            }
        }
        out
    }
}

impl Sink for RecordingSink {
    fn write_text(&mut self, text: &str) {
        self.events.push(SinkEvent::Text(text.to_owned()));
    }

    fn write_char(&mut self, ch: u8) {
        self.events.push(SinkEvent::Char(ch));
    }

    fn write_int(&mut self, value: i64) {
        self.events.push(SinkEvent::Int(value));
    }

    fn flush(&mut self) {
        self.events.push(SinkEvent::Flush);
    }
}

/// Sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl Sink for NullSink {
    fn write_text(&mut self, _: &str) {}
    fn write_char(&mut self, _: u8) {}
    fn write_int(&mut self, _: i64) {}
    fn flush(&mut self) {}
}
