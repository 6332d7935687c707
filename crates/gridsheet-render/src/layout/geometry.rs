// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page geometry: page size, cell size, resolution scale and the
// precomputed grid of cell positions for one job.

use std::path::PathBuf;

use gridsheet_core::SheetConfig;
use gridsheet_core::error::{GridsheetError, Result};
use tracing::debug;

use super::coords::{A4_HEIGHT_MM, A4_WIDTH_MM, PT_PER_MM};

/// Smallest cell edge, in millimetres, that still renders a legible image.
pub const MIN_CELL_MM: f64 = 5.0;

/// Aspect ratio assumed when an image's header cannot be read.
pub const FALLBACK_RATIO: f64 = 3.0 / 2.0;

/// Millimetres per typographic point, as used for line-height estimates.
const MM_PER_PT_APPROX: f64 = 0.353;

/// A cell's bottom-left corner in millimetres (bottom-left page origin).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellPosition {
    pub x: f64,
    pub y: f64,
}

/// Immutable geometry and quality contract for one job.
///
/// Built once from a validated [`SheetConfig`]; all fields are read-only
/// afterwards. Distances are millimetres unless the name says otherwise.
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    pub cols: u32,
    pub rows: u32,
    pub landscape: bool,
    pub quality: u32,
    pub jpeg_compression: u8,
    pub page_numbers: bool,

    pub border: f64,
    pub header_space: f64,
    pub filename_offset: f64,
    /// Points.
    pub filename_font_size: f64,
    /// Points.
    pub title_font_size: f64,
    pub page_number_y: f64,

    pub page_width: f64,
    pub page_height: f64,
    pub cell_width: f64,
    pub cell_height: f64,
    pub images_per_page: usize,
    pub resolution_scale: f64,
    pub filename_line_height: f64,
    positions: Vec<CellPosition>,
}

impl LayoutConfig {
    /// Derive the page geometry from user parameters.
    ///
    /// Fails with [`GridsheetError::Geometry`] when a cell would be smaller
    /// than [`MIN_CELL_MM`] in either direction; no page is drawn in that
    /// case.
    pub fn new(config: &SheetConfig) -> Result<Self> {
        config.validate()?;

        let (page_width, page_height) = if config.landscape {
            (A4_HEIGHT_MM, A4_WIDTH_MM)
        } else {
            (A4_WIDTH_MM, A4_HEIGHT_MM)
        };

        let cols = f64::from(config.cols);
        let rows = f64::from(config.rows);
        let border = config.border;
        let header_space = config.header_space;

        let cell_width = (page_width - (cols + 1.0) * border) / cols;
        let cell_height = (page_height - header_space - (rows + 1.0) * border) / rows;

        if cell_width < MIN_CELL_MM || cell_height < MIN_CELL_MM {
            return Err(GridsheetError::Geometry(format!(
                "grid parameters result in images too small to render \
                 ({cell_width:.1}x{cell_height:.1} mm); reduce columns/rows or border size"
            )));
        }

        let mut positions = Vec::with_capacity(config.images_per_page());
        for row in 0..config.rows {
            for col in 0..config.cols {
                let row = f64::from(row);
                let col = f64::from(col);
                positions.push(CellPosition {
                    x: border + col * (cell_width + border),
                    y: page_height
                        - (row + 1.0) * cell_height
                        - (row + 1.0) * border
                        - (header_space - 10.0),
                });
            }
        }

        // quality=100 → 1.5x (~108 DPI), quality=200 → 3.0x (~216 DPI)
        let resolution_scale = f64::from(config.quality) / 100.0 * 1.5;

        debug!(
            cell_width,
            cell_height,
            resolution_scale,
            "layout computed"
        );

        Ok(Self {
            cols: config.cols,
            rows: config.rows,
            landscape: config.landscape,
            quality: config.quality,
            jpeg_compression: config.jpeg_compression,
            page_numbers: config.page_numbers,
            border,
            header_space,
            filename_offset: 5.0,
            filename_font_size: config.filename_font_size,
            title_font_size: config.title_font_size,
            page_number_y: 8.0,
            page_width,
            page_height,
            cell_width,
            cell_height,
            images_per_page: positions.len(),
            resolution_scale,
            filename_line_height: config.filename_font_size * MM_PER_PT_APPROX * 1.3,
            positions,
        })
    }

    /// Cell positions in fill order: rows top to bottom, columns left to
    /// right, index `row * cols + col`.
    pub fn positions(&self) -> &[CellPosition] {
        &self.positions
    }

    /// Position of the cell that the `index`-th image of a section lands in.
    pub fn position_for(&self, index: usize) -> CellPosition {
        self.positions[index % self.images_per_page]
    }

    /// Pages needed for `image_count` images.
    pub fn page_count(&self, image_count: usize) -> usize {
        image_count.div_ceil(self.images_per_page)
    }

    /// Height of one wrapped title line in millimetres.
    pub fn title_line_height(&self) -> f64 {
        self.title_font_size * MM_PER_PT_APPROX * 1.3
    }

    /// Cap height proxy of the title font in millimetres.
    pub fn title_ascent(&self) -> f64 {
        self.title_font_size * MM_PER_PT_APPROX
    }

    /// Fit an image of aspect ratio `ratio` (width / height) into a cell and
    /// derive its pixel target.
    pub fn describe(&self, path: PathBuf, ratio: f64) -> ImageDescriptor {
        let ratio = if ratio.is_finite() && ratio > 0.0 {
            ratio
        } else {
            FALLBACK_RATIO
        };
        let space_ratio = self.cell_width / self.cell_height;

        let (display_width, display_height) = if ratio > space_ratio {
            let w = self.cell_width * PT_PER_MM;
            (w, w / ratio)
        } else {
            let h = self.cell_height * PT_PER_MM;
            (h * ratio, h)
        };

        let target_width = ((display_width * self.resolution_scale) as u32).max(1);
        let target_height = ((display_height * self.resolution_scale) as u32).max(1);

        ImageDescriptor {
            path,
            ratio,
            display_width,
            display_height,
            target_width,
            target_height,
        }
    }
}

/// One input image's geometry, computed before decode.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDescriptor {
    pub path: PathBuf,
    /// Width / height of the source image.
    pub ratio: f64,
    /// Drawn width in points.
    pub display_width: f64,
    /// Drawn height in points.
    pub display_height: f64,
    /// Exact pixel width the prepared bitmap must have.
    pub target_width: u32,
    /// Exact pixel height the prepared bitmap must have.
    pub target_height: u32,
}

impl ImageDescriptor {
    /// File name without directory, for labels and progress.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
