// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unit conversion and vertical flip between the layout space and the
// drawing surface.
//
// All layout math is done in millimetres with a bottom-left origin (Y up).
// The drawing surface addresses points from the top-left (Y down); the flip
// happens only at the final draw call.

/// Points per millimetre.
pub const PT_PER_MM: f64 = 72.0 / 25.4;

/// A4 short edge in millimetres.
pub const A4_WIDTH_MM: f64 = 210.0;
/// A4 long edge in millimetres.
pub const A4_HEIGHT_MM: f64 = 297.0;

pub fn mm_to_pt(mm: f64) -> f64 {
    mm * PT_PER_MM
}

pub fn pt_to_mm(pt: f64) -> f64 {
    pt / PT_PER_MM
}

/// Top edge, in points from the page top, of an image whose bottom edge sits
/// `y_mm` above the page bottom.
pub fn flip_y_image(y_mm: f64, image_height_mm: f64, page_height_mm: f64) -> f64 {
    mm_to_pt(page_height_mm - y_mm - image_height_mm)
}

/// Text baseline, in points from the page top, for a baseline `baseline_mm`
/// above the page bottom.
pub fn flip_y_text(baseline_mm: f64, page_height_mm: f64) -> f64 {
    mm_to_pt(page_height_mm - baseline_mm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_inch_is_72_points() {
        assert!((mm_to_pt(25.4) - 72.0).abs() < 1e-9);
        assert!((pt_to_mm(72.0) - 25.4).abs() < 1e-9);
    }

    #[test]
    fn image_flip_accounts_for_height() {
        // A 10 mm tall image resting on the page bottom starts 287 mm down.
        let top = flip_y_image(0.0, 10.0, A4_HEIGHT_MM);
        assert!((top - mm_to_pt(287.0)).abs() < 1e-9);
    }

    #[test]
    fn text_flip_mirrors_baseline() {
        assert!((flip_y_text(A4_HEIGHT_MM, A4_HEIGHT_MM)).abs() < 1e-9);
        assert!((flip_y_text(8.0, A4_HEIGHT_MM) - mm_to_pt(289.0)).abs() < 1e-9);
    }
}
