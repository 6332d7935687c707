// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// JSON-lines messages exchanged with the host application.
//
// Progress and completion go to stdout, one JSON object per line, flushed
// immediately. Errors go to stderr so a host can tell them apart without
// parsing every line.

use std::io::{self, Write};
use std::path::PathBuf;

use gridsheet_core::types::{DocumentOutput, MultiDocumentOutput, Phase, Progress, Timing};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Progress {
        current: usize,
        total: usize,
        file: String,
    },
    Done {
        output: PathBuf,
        pages: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        files: Option<Vec<PathBuf>>,
    },
    Error {
        message: String,
    },
    /// Only sent for benchmark runs.
    Timing {
        phase: Phase,
        ms: f64,
    },
}

impl Message {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Completion of a per-folder job: `output` is the directory the
    /// documents were written to.
    pub fn done_multi(output_dir: PathBuf, result: MultiDocumentOutput) -> Self {
        Self::Done {
            output: output_dir,
            pages: result.total_pages,
            files: Some(result.outputs),
        }
    }
}

impl From<&Progress> for Message {
    fn from(progress: &Progress) -> Self {
        Self::Progress {
            current: progress.current,
            total: progress.total,
            file: progress.file.clone(),
        }
    }
}

impl From<&Timing> for Message {
    fn from(timing: &Timing) -> Self {
        Self::Timing {
            phase: timing.phase,
            ms: timing.millis(),
        }
    }
}

impl From<DocumentOutput> for Message {
    fn from(result: DocumentOutput) -> Self {
        Self::Done {
            output: result.output,
            pages: result.pages,
            files: None,
        }
    }
}

/// Serialise `message` as a single line (no trailing newline).
pub fn to_line(message: &Message) -> serde_json::Result<String> {
    serde_json::to_string(message)
}

/// Write `message` to stdout, or to stderr for errors.
pub fn emit(message: &Message) {
    let result = match message {
        Message::Error { .. } => write_line(&mut io::stderr().lock(), message),
        _ => write_line(&mut io::stdout().lock(), message),
    };
    if let Err(err) = result {
        warn!(error = %err, "failed to write protocol message");
    }
}

fn write_line<W: Write>(out: &mut W, message: &Message) -> io::Result<()> {
    let line = to_line(message).map_err(io::Error::other)?;
    writeln!(out, "{line}")?;
    out.flush()
}
