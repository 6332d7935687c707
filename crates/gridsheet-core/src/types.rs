// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Gridsheet contact-sheet generator.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Input image families, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageKind {
    Jpeg,
    Png,
    WebP,
    Tiff,
    /// Camera RAW. Listed so scans pick the files up, never decoded.
    Raw,
}

impl ImageKind {
    /// Infer the image family from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            "tif" | "tiff" => Some(Self::Tiff),
            "raw" | "cr2" | "cr3" | "nef" | "arw" | "dng" | "orf" | "rw2" | "raf" | "pef"
            | "srw" => Some(Self::Raw),
            _ => None,
        }
    }

    /// Infer the image family from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw)
    }

    pub fn is_tiff(&self) -> bool {
        matches!(self, Self::Tiff)
    }
}

/// One folder's contribution to a sectioned or per-folder job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Folder scanned (non-recursively) for images.
    pub folder_path: PathBuf,
    /// Title drawn on the section's pages; user-editable, may differ from
    /// the folder name.
    pub display_name: String,
}

impl Section {
    pub fn new(folder_path: impl Into<PathBuf>, display_name: impl Into<String>) -> Self {
        Self {
            folder_path: folder_path.into(),
            display_name: display_name.into(),
        }
    }
}

/// Progress notification emitted after each image is drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// 1-based index of the image just drawn, across the whole job.
    pub current: usize,
    /// Number of images in the whole job.
    pub total: usize,
    /// File name (no directory) of the image just drawn.
    pub file: String,
}

/// Stages of a job that can be timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Folder scanning (and, for sectioned jobs, ratio probing).
    Scan,
    /// Ratio probing and layout of an explicit file list.
    ComputeDims,
    /// Preparing and drawing every page.
    Render,
    /// Serialising and writing the document.
    Save,
    /// The whole job.
    Total,
}

/// Wall-clock duration of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub phase: Phase,
    pub elapsed: Duration,
}

impl Timing {
    /// Milliseconds, rounded to two decimals.
    pub fn millis(&self) -> f64 {
        (self.elapsed.as_secs_f64() * 100_000.0).round() / 100.0
    }
}

/// Cooperative cancellation flag shared between the host and a running job.
///
/// Cloning shares the flag. The engine checks it at the head of every
/// section, page and image step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Outcome of a job that can be cancelled.
///
/// Cancellation is not an error: the caller gets a distinct variant and must
/// discard any partially written output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation<T> {
    Finished(T),
    Cancelled,
}

impl<T> Generation<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The finished value, or `None` when the job was cancelled.
    pub fn finished(self) -> Option<T> {
        match self {
            Self::Finished(value) => Some(value),
            Self::Cancelled => None,
        }
    }
}

/// A single written document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentOutput {
    pub output: PathBuf,
    pub pages: usize,
}

/// The documents written by a per-folder job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiDocumentOutput {
    pub outputs: Vec<PathBuf>,
    pub total_pages: usize,
}
