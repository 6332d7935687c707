// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Layout module: unit conversion, page/cell geometry, and text wrapping.

pub mod coords;
pub mod geometry;
pub mod text;

pub use geometry::{CellPosition, ImageDescriptor, LayoutConfig};
