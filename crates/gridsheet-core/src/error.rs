// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Gridsheet.

use thiserror::Error;

/// Top-level error type for all Gridsheet operations.
///
/// Only a subset of these ever reach the caller of a job: decode and
/// resource-limit failures are recovered inside the decode pipeline by
/// substituting a placeholder bitmap.
#[derive(Debug, Error)]
pub enum GridsheetError {
    // -- Job setup --
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("layout error: {0}")]
    Geometry(String),

    #[error("no images found: {0}")]
    NoImages(String),

    // -- Image preparation (recovered locally) --
    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("image too large ({width}x{height}) for pixel budget of {budget}")]
    ResourceLimit { width: u32, height: u32, budget: u64 },

    #[error("image preparation task failed: {0}")]
    Task(String),

    // -- Output --
    #[error("PDF operation failed: {0}")]
    Pdf(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GridsheetError {
    /// Whether the decode pipeline absorbs this error with a placeholder
    /// instead of aborting the job.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::ResourceLimit { .. } | Self::Task(_)
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GridsheetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_failures_are_recoverable() {
        assert!(GridsheetError::Decode("corrupt".into()).is_recoverable());
        assert!(
            GridsheetError::ResourceLimit {
                width: 11_000,
                height: 11_000,
                budget: 100_000_000,
            }
            .is_recoverable()
        );
        assert!(!GridsheetError::Geometry("cells too small".into()).is_recoverable());
        assert!(!GridsheetError::NoImages("all sections empty".into()).is_recoverable());
    }

    #[test]
    fn resource_limit_message_names_dimensions() {
        let err = GridsheetError::ResourceLimit {
            width: 20,
            height: 10,
            budget: 100,
        };
        assert_eq!(
            err.to_string(),
            "image too large (20x10) for pixel budget of 100"
        );
    }
}
