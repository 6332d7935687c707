// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster module: decoding, resampling and opacity handling for thumbnails.

pub mod bitmap;
pub mod decode;
pub mod gate;
pub mod native_tiff;
pub mod resize;

pub use bitmap::{AlphaType, Bitmap};
pub use decode::{DecodeLimits, DecodePipeline};
pub use resize::{normalize_opacity, resize_exact};
