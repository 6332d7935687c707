// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: page compositing, bounded image preparation, fonts and the
// printpdf-backed drawing surface.

pub mod compositor;
pub mod fonts;
pub mod prepare;
pub mod surface;

pub use compositor::{Compositor, ProgressSpan, SectionPlan};
pub use prepare::PreparePool;
pub use surface::{PdfSurface, Surface};
