// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// gridsheet-render: the contact-sheet engine.
//
// Provides page geometry and text wrapping (`layout`), bounded-memory image
// decoding and exact-size resampling (`raster`), folder scanning (`source`),
// and ordered page compositing onto a PDF surface (`pdf`).

pub mod layout;
pub mod pdf;
pub mod raster;
pub mod source;

// Re-export the primary entry points so callers can use `gridsheet_render::Compositor` etc.
pub use layout::LayoutConfig;
pub use pdf::Compositor;
pub use raster::{DecodeLimits, DecodePipeline};
pub use source::{filter_supported, scan_folder, scan_tree};
