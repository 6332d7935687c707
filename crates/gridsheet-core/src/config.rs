// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job configuration.

use serde::{Deserialize, Serialize};

use crate::error::{GridsheetError, Result};

/// User-facing parameters for one contact-sheet job.
///
/// Every field has a default so a partial JSON object deserializes into a
/// usable configuration. Call [`SheetConfig::validate`] before building a
/// layout from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    /// Grid columns per page (1-6).
    pub cols: u32,
    /// Grid rows per page (1-6).
    pub rows: u32,
    /// Use A4 landscape instead of portrait.
    pub landscape: bool,
    /// Thumbnail pixel density in percent (50-400). 100 is roughly 108 DPI.
    pub quality: u32,
    /// Outer margin and gutter between cells, in millimetres (5-30).
    pub border: f64,
    /// Height reserved for the page title, in millimetres (20-60).
    pub header_space: f64,
    /// Filename label size in points (6-14).
    pub filename_font_size: f64,
    /// Title size in points (8-24).
    pub title_font_size: f64,
    /// JPEG quality for embedded thumbnails (1-100).
    pub jpeg_compression: u8,
    /// Draw a "page/total" label at the bottom of each page.
    pub page_numbers: bool,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            cols: 2,
            rows: 3,
            landscape: false,
            quality: 100,
            border: 15.0,
            header_space: 40.0,
            filename_font_size: 8.0,
            title_font_size: 14.0,
            jpeg_compression: 92,
            page_numbers: true,
        }
    }
}

impl SheetConfig {
    /// Check every parameter against its supported range.
    pub fn validate(&self) -> Result<()> {
        check_int("cols", self.cols, 1, 6)?;
        check_int("rows", self.rows, 1, 6)?;
        check_int("quality", self.quality, 50, 400)?;
        check_int("jpeg_compression", u32::from(self.jpeg_compression), 1, 100)?;
        check_float("border", self.border, 5.0, 30.0)?;
        check_float("header_space", self.header_space, 20.0, 60.0)?;
        check_float("filename_font_size", self.filename_font_size, 6.0, 14.0)?;
        check_float("title_font_size", self.title_font_size, 8.0, 24.0)?;
        Ok(())
    }

    /// Number of grid cells on one page.
    pub fn images_per_page(&self) -> usize {
        (self.cols * self.rows) as usize
    }
}

fn check_int(name: &str, value: u32, min: u32, max: u32) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(GridsheetError::InvalidConfig(format!(
            "{name} must be an integer between {min} and {max}, got {value}"
        )))
    }
}

fn check_float(name: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(GridsheetError::InvalidConfig(format!(
            "{name} must be a number between {min} and {max}, got {value}"
        )))
    }
}
