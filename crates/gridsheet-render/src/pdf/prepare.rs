// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded, order-preserving image preparation.
//
// One task per image is spawned up front; a semaphore admits at most `limit`
// of them into the blocking pool at a time. Results are collected strictly by
// index, so drawing order never depends on which decode finishes first.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use gridsheet_core::error::{GridsheetError, Result};
use gridsheet_core::types::CancelToken;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinHandle};
use tracing::warn;

use crate::layout::ImageDescriptor;
use crate::raster::{Bitmap, DecodePipeline};

/// Upper bound on concurrent preparations regardless of core count.
pub const MAX_PREPARE_CONCURRENCY: usize = 8;

/// `min(8, available_parallelism)`.
pub fn default_prepare_limit() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .min(MAX_PREPARE_CONCURRENCY)
}

/// Admission control for prepare tasks, with in-flight accounting.
#[derive(Debug, Clone)]
pub struct PreparePool {
    permits: Arc<Semaphore>,
    limit: usize,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Default for PreparePool {
    fn default() -> Self {
        Self::new(default_prepare_limit())
    }
}

impl PreparePool {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Preparations running right now.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous preparations seen so far.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Spawn one preparation per descriptor. Must be called from within a
    /// tokio runtime.
    pub fn submit(
        &self,
        pipeline: &DecodePipeline,
        descriptors: &[ImageDescriptor],
        cancel: &CancelToken,
    ) -> PrepareBatch {
        let handles = descriptors
            .iter()
            .map(|descriptor| {
                let permits = Arc::clone(&self.permits);
                let in_flight = Arc::clone(&self.in_flight);
                let peak = Arc::clone(&self.peak);
                let pipeline = pipeline.clone();
                let cancel = cancel.clone();
                let path = descriptor.path.clone();
                let (width, height) = (descriptor.target_width, descriptor.target_height);

                tokio::spawn(async move {
                    let permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|err| GridsheetError::Task(err.to_string()))?;
                    if cancel.is_cancelled() {
                        return Err(GridsheetError::Task("cancelled before decode".into()));
                    }

                    task::spawn_blocking(move || {
                        let _permit = permit;
                        let _slot = InFlight::enter(&in_flight, &peak);
                        pipeline.prepare(&path, width, height)
                    })
                    .await
                    .map_err(|err| GridsheetError::Task(err.to_string()))
                })
            })
            .collect();

        PrepareBatch { handles }
    }
}

/// Pending preparations for one section, claimed by index.
///
/// Dropping the batch aborts tasks still waiting for admission.
pub struct PrepareBatch {
    handles: Vec<JoinHandle<Result<Bitmap>>>,
}

impl PrepareBatch {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for image `index`. A failed or panicked task yields a
    /// placeholder of the descriptor's target size.
    pub async fn take(&mut self, index: usize, descriptor: &ImageDescriptor) -> Bitmap {
        match self.handles.get_mut(index) {
            Some(handle) => settle(handle, descriptor).await,
            None => {
                warn!(index, "no preparation was submitted for this image");
                Bitmap::placeholder(descriptor.target_width, descriptor.target_height)
            }
        }
    }
}

impl Drop for PrepareBatch {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

async fn settle(handle: &mut JoinHandle<Result<Bitmap>>, descriptor: &ImageDescriptor) -> Bitmap {
    let outcome = match handle.await {
        Ok(result) => result,
        Err(join) => Err(GridsheetError::Task(join.to_string())),
    };

    match outcome {
        Ok(bitmap) => {
            debug_assert_eq!(
                bitmap.dimensions(),
                (descriptor.target_width, descriptor.target_height)
            );
            bitmap
        }
        Err(err) => {
            warn!(
                path = %descriptor.path.display(),
                error = %err,
                "failed to prepare image, using placeholder"
            );
            Bitmap::placeholder(descriptor.target_width, descriptor.target_height)
        }
    }
}

/// Counts a running preparation for as long as it is alive.
struct InFlight<'a> {
    in_flight: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(in_flight: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { in_flight }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
