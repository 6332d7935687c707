// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Gridsheet: contact-sheet PDF generator for host applications.
//
// Entry point. Reads one JSON job request from stdin, streams JSON-lines
// progress to stdout and reports the outcome. Logs go to stderr.

mod job;
mod protocol;

use std::io;
use std::process::ExitCode;

use gridsheet_core::types::{CancelToken, Generation};

use job::JobRequest;
use protocol::Message;

/// Exit status for a job stopped by Ctrl-C.
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    tracing::info!("Gridsheet starting");

    let request: JobRequest = match serde_json::from_reader(io::stdin().lock()) {
        Ok(request) => request,
        Err(err) => {
            protocol::emit(&Message::error(format!("invalid job request: {err}")));
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancelToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            watcher.cancel();
        }
    });

    match job::run(request, cancel).await {
        Ok(Generation::Finished(done)) => {
            protocol::emit(&done);
            ExitCode::SUCCESS
        }
        Ok(Generation::Cancelled) => {
            tracing::info!("job cancelled, no output written");
            ExitCode::from(EXIT_CANCELLED)
        }
        Err(err) => {
            tracing::error!(error = %err, "job failed");
            protocol::emit(&Message::error(err.to_string()));
            ExitCode::FAILURE
        }
    }
}
