//! Consume stage - conflict output
//!
//! Renders each conflict as one line on the configured sink. Failures to
//! render or write a conflict go to a separate error channel; that channel
//! closes when the conflict stream is exhausted and the sink is flushed, which
//! makes it the caller's completion signal.

use crate::pipeline::types::{Conflict, ConflictField, FieldSelection, OutputError, OutputFormat};
use crossbeam_channel::{Receiver, Sender, bounded};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::thread;

/// Writes conflicts to a sink.
pub struct ConflictConsumer {
    fields: FieldSelection,
    format: OutputFormat,
    sink: Box<dyn Write + Send>,
    error_channel_size: usize,
}

impl ConflictConsumer {
    /// Consumer writing every field as text to `sink`.
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            fields: FieldSelection::all(),
            format: OutputFormat::Text,
            sink: Box::new(sink),
            error_channel_size: 16,
        }
    }

    /// Consumer writing to stdout.
    pub fn console() -> Self {
        Self::new(io::stdout())
    }

    pub fn with_fields(mut self, fields: FieldSelection) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_error_channel_size(mut self, size: usize) -> Self {
        self.error_channel_size = size.max(1);
        self
    }

    /// Render one conflict without the trailing newline.
    pub fn format(&self, conflict: &Conflict) -> Result<String, OutputError> {
        match self.format {
            OutputFormat::Text => self.format_text(conflict),
            OutputFormat::Json => self.format_json(conflict),
        }
    }

    fn format_text(&self, conflict: &Conflict) -> Result<String, OutputError> {
        let mut out = String::new();
        for (i, field) in self.fields.fields().iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            write!(out, "{}", field.value(conflict)).map_err(|e| OutputError::Format {
                file: conflict.file.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(out)
    }

    fn format_json(&self, conflict: &Conflict) -> Result<String, OutputError> {
        let view = ConflictView::new(conflict, &self.fields);
        serde_json::to_string(&view).map_err(|e| OutputError::Format {
            file: conflict.file.clone(),
            reason: e.to_string(),
        })
    }

    /// Write every conflict on a dedicated thread.
    ///
    /// Returns the error channel. Drain it: the consumer blocks once
    /// `error_channel_size` undrained errors are pending.
    pub fn consume<I>(self, conflicts: I) -> Receiver<OutputError>
    where
        I: IntoIterator<Item = Conflict>,
        I::IntoIter: Send + 'static,
    {
        let (error_tx, error_rx) = bounded(self.error_channel_size);
        let conflicts = conflicts.into_iter();
        thread::spawn(move || self.run(conflicts, error_tx));
        error_rx
    }

    /// Write every conflict on the current thread.
    ///
    /// Returns the number of conflicts written.
    pub fn run<I>(mut self, conflicts: I, errors: Sender<OutputError>) -> usize
    where
        I: IntoIterator<Item = Conflict>,
    {
        let mut written = 0;
        for conflict in conflicts {
            let result = self.format(&conflict).and_then(|line| {
                writeln!(self.sink, "{line}").map_err(|e| OutputError::Write {
                    file: conflict.file.clone(),
                    source: e,
                })
            });
            match result {
                Ok(()) => written += 1,
                Err(e) => {
                    if errors.send(e).is_err() {
                        tracing::debug!("[consume] error channel closed");
                    }
                }
            }
        }

        if let Err(e) = self.sink.flush() {
            let _ = errors.send(OutputError::Flush(e));
        }
        tracing::debug!("[consume] wrote {written} conflicts");
        written
    }
}

/// JSON shape of a conflict. Unselected fields are left out.
#[derive(Serialize)]
struct ConflictView<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ignore_file: Option<Cow<'a, str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pattern: Option<&'a str>,
}

impl<'a> ConflictView<'a> {
    fn new(conflict: &'a Conflict, fields: &FieldSelection) -> Self {
        let line = conflict
            .line
            .and_then(|line| i64::try_from(line).ok())
            .unwrap_or(-1);
        Self {
            file: fields
                .contains(ConflictField::File)
                .then_some(conflict.file.as_str()),
            ignore_file: fields
                .contains(ConflictField::IgnoreFile)
                .then(|| conflict.ignore_file.to_string_lossy()),
            line: fields.contains(ConflictField::Line).then_some(line),
            pattern: fields
                .contains(ConflictField::Pattern)
                .then_some(conflict.pattern.as_str()),
        }
    }
}
