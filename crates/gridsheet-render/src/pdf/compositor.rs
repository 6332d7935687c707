// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page compositor: lays prepared thumbnails onto pages in input order.
//
// For each section the compositor probes aspect ratios (in parallel),
// submits every image to the prepare pool, then walks the images in index
// order: open a page with its header whenever a page boundary is reached,
// await the image's preparation, draw it centred in its cell with its
// filename underneath, and report progress. Only the draw loop touches the
// surface.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{Local, NaiveDate};
use gridsheet_core::error::{GridsheetError, Result};
use gridsheet_core::types::{
    CancelToken, DocumentOutput, Generation, MultiDocumentOutput, Phase, Progress, Section,
    Timing,
};
use rayon::prelude::*;
use tokio::task;
use tracing::{debug, info, instrument, warn};
use unicode_normalization::UnicodeNormalization;

use super::fonts::FontFace;
use super::prepare::PreparePool;
use super::surface::{PdfSurface, Rect, Surface, TextRun};
use crate::layout::coords::{flip_y_image, flip_y_text, mm_to_pt, pt_to_mm};
use crate::layout::text::{wrap_filename, wrap_title};
use crate::layout::{CellPosition, ImageDescriptor, LayoutConfig};
use crate::raster::{Bitmap, DecodePipeline};
use crate::source::scan_folder;

/// Horizontal slack, in millimetres, between a filename label and its cell
/// edges.
const LABEL_INSET_MM: f64 = 4.0;

/// Gap, in millimetres, between the bottom of the title zone and the grid.
const HEADER_GAP_MM: f64 = 10.0;

/// Callback invoked after every drawn image.
pub type ProgressCallback = Box<dyn FnMut(&Progress) + Send>;

/// Callback invoked when a timed phase completes.
pub type TimingCallback = Box<dyn FnMut(&Timing) + Send>;

/// One titled run of images that starts on a fresh page.
#[derive(Debug, Clone)]
pub struct SectionPlan {
    pub title: String,
    pub images: Vec<ImageDescriptor>,
    pub pages: usize,
}

impl SectionPlan {
    pub fn new(title: impl Into<String>, images: Vec<ImageDescriptor>, layout: &LayoutConfig) -> Self {
        let pages = layout.page_count(images.len());
        Self {
            title: title.into(),
            images,
            pages,
        }
    }
}

/// Where a document's images sit inside the job-wide progress count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSpan {
    pub offset: usize,
    pub total: usize,
}

/// Page and progress counters for one section of a document.
#[derive(Debug, Clone, Copy)]
struct Numbering {
    page_offset: usize,
    total_pages: usize,
    progress_offset: usize,
    progress_total: usize,
}

/// Builds contact-sheet documents for one job.
pub struct Compositor {
    layout: LayoutConfig,
    pipeline: DecodePipeline,
    pool: PreparePool,
    cancel: CancelToken,
    progress: Option<ProgressCallback>,
    timing: Option<TimingCallback>,
}

impl Compositor {
    pub fn new(layout: LayoutConfig) -> Self {
        Self {
            layout,
            pipeline: DecodePipeline::default(),
            pool: PreparePool::default(),
            cancel: CancelToken::new(),
            progress: None,
            timing: None,
        }
    }

    pub fn with_pipeline(mut self, pipeline: DecodePipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Cap concurrent image preparations at `limit`.
    pub fn with_prepare_limit(mut self, limit: usize) -> Self {
        self.pool = PreparePool::new(limit);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn on_progress(mut self, callback: impl FnMut(&Progress) + Send + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Report how long planning, drawing and saving take.
    pub fn on_timing(mut self, callback: impl FnMut(&Timing) + Send + 'static) -> Self {
        self.timing = Some(Box::new(callback));
        self
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    pub fn prepare_pool(&self) -> &PreparePool {
        &self.pool
    }

    // -- Operations -----------------------------------------------------------

    /// One document from an explicit, already ordered file list.
    #[instrument(skip_all, fields(files = files.len(), output = %output.display()))]
    pub async fn create_pdf(
        &mut self,
        files: &[PathBuf],
        title: &str,
        output: &Path,
    ) -> Result<Generation<DocumentOutput>> {
        if files.is_empty() {
            return Err(GridsheetError::NoImages("no images to place".into()));
        }
        if self.cancel.is_cancelled() {
            return Ok(Generation::Cancelled);
        }

        let started = Instant::now();
        let plan = self.plan(title, files.to_vec()).await?;
        self.record_timing(Phase::ComputeDims, started);
        let span = ProgressSpan {
            offset: 0,
            total: plan.images.len(),
        };

        let mut surface = PdfSurface::new(title, self.layout.jpeg_compression);
        if self.render_timed(&mut surface, &[plan], span).await?.is_cancelled() {
            return Ok(Generation::Cancelled);
        }
        let pages = self.save_timed(surface, output)?;

        Ok(Generation::Finished(DocumentOutput {
            output: output.to_path_buf(),
            pages,
        }))
    }

    /// One document with every non-empty section starting on a new page.
    /// Page numbers run across the whole document.
    #[instrument(skip_all, fields(sections = sections.len(), output = %output.display()))]
    pub async fn create_sectioned_pdf(
        &mut self,
        sections: &[Section],
        output: &Path,
    ) -> Result<Generation<DocumentOutput>> {
        let started = Instant::now();
        let plans = match self.plan_sections(sections).await? {
            Generation::Finished(plans) => plans,
            Generation::Cancelled => return Ok(Generation::Cancelled),
        };
        self.record_timing(Phase::Scan, started);

        let span = ProgressSpan {
            offset: 0,
            total: plans.iter().map(|p| p.images.len()).sum(),
        };
        let title = plans.first().map(|p| p.title.as_str()).unwrap_or_default();

        let mut surface = PdfSurface::new(title, self.layout.jpeg_compression);
        if self.render_timed(&mut surface, &plans, span).await?.is_cancelled() {
            return Ok(Generation::Cancelled);
        }
        let pages = self.save_timed(surface, output)?;

        Ok(Generation::Finished(DocumentOutput {
            output: output.to_path_buf(),
            pages,
        }))
    }

    /// One document per non-empty section, written into `output_dir`.
    /// Progress counts across all documents.
    #[instrument(skip_all, fields(sections = sections.len(), output_dir = %output_dir.display()))]
    pub async fn create_per_folder_pdfs(
        &mut self,
        sections: &[Section],
        output_dir: &Path,
    ) -> Result<Generation<MultiDocumentOutput>> {
        let started = Instant::now();
        let plans = match self.plan_sections(sections).await? {
            Generation::Finished(plans) => plans,
            Generation::Cancelled => return Ok(Generation::Cancelled),
        };
        self.record_timing(Phase::Scan, started);

        let date = Local::now().date_naive();
        let total = plans.iter().map(|p| p.images.len()).sum();
        let mut offset = 0;
        let mut outputs = Vec::with_capacity(plans.len());
        let mut total_pages = 0;

        for plan in plans {
            if self.cancel.is_cancelled() {
                return Ok(Generation::Cancelled);
            }

            let output = output_dir.join(per_folder_file_name(&plan.title, date));
            let count = plan.images.len();
            let mut surface = PdfSurface::new(&plan.title, self.layout.jpeg_compression);
            let span = ProgressSpan { offset, total };

            if self
                .render_timed(&mut surface, std::slice::from_ref(&plan), span)
                .await?
                .is_cancelled()
            {
                return Ok(Generation::Cancelled);
            }
            total_pages += self.save_timed(surface, &output)?;
            outputs.push(output);
            offset += count;
        }

        Ok(Generation::Finished(MultiDocumentOutput {
            outputs,
            total_pages,
        }))
    }

    // -- Planning -------------------------------------------------------------

    /// Probe every file's aspect ratio and derive its descriptor, keeping
    /// input order.
    pub async fn plan(&self, title: &str, files: Vec<PathBuf>) -> Result<SectionPlan> {
        let layout = self.layout.clone();
        let pipeline = self.pipeline.clone();

        let images = task::spawn_blocking(move || {
            files
                .into_par_iter()
                .map(|path| {
                    let ratio = pipeline.probe_ratio(&path);
                    layout.describe(path, ratio)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|err| GridsheetError::Task(err.to_string()))?;

        Ok(SectionPlan::new(title, images, &self.layout))
    }

    /// Scan and describe each section's folder, dropping empty ones.
    async fn plan_sections(&self, sections: &[Section]) -> Result<Generation<Vec<SectionPlan>>> {
        let mut plans = Vec::with_capacity(sections.len());

        for section in sections {
            if self.cancel.is_cancelled() {
                return Ok(Generation::Cancelled);
            }

            let files = scan_folder(&section.folder_path);
            if files.is_empty() {
                warn!(
                    folder = %section.folder_path.display(),
                    "section has no images, skipping"
                );
                continue;
            }
            plans.push(self.plan(&section.display_name, files).await?);
        }

        if plans.is_empty() {
            return Err(GridsheetError::NoImages(
                "no images found in any section folder".into(),
            ));
        }
        Ok(Generation::Finished(plans))
    }

    // -- Drawing --------------------------------------------------------------

    /// Draw `sections` onto `surface`, each starting on a new page. Returns
    /// the number of pages drawn.
    pub async fn render<S: Surface>(
        &mut self,
        surface: &mut S,
        sections: &[SectionPlan],
        span: ProgressSpan,
    ) -> Result<Generation<usize>> {
        let total_pages: usize = sections.iter().map(|s| s.pages).sum();
        let mut numbering = Numbering {
            page_offset: 0,
            total_pages,
            progress_offset: span.offset,
            progress_total: span.total,
        };

        for section in sections {
            if self.cancel.is_cancelled() {
                return Ok(Generation::Cancelled);
            }
            if self.render_section(surface, section, numbering).await?.is_cancelled() {
                return Ok(Generation::Cancelled);
            }
            numbering.page_offset += section.pages;
            numbering.progress_offset += section.images.len();
        }

        info!(pages = total_pages, "document composed");
        Ok(Generation::Finished(total_pages))
    }

    async fn render_section<S: Surface>(
        &mut self,
        surface: &mut S,
        section: &SectionPlan,
        numbering: Numbering,
    ) -> Result<Generation<()>> {
        let per_page = self.layout.images_per_page;
        let mut batch = self.pool.submit(&self.pipeline, &section.images, &self.cancel);
        let mut page_open = false;

        debug!(
            title = %section.title,
            images = section.images.len(),
            pages = section.pages,
            "rendering section"
        );

        for (index, descriptor) in section.images.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Ok(Generation::Cancelled);
            }

            if index % per_page == 0 {
                if page_open {
                    surface.end_page()?;
                }
                surface.begin_page(self.layout.page_width, self.layout.page_height)?;
                page_open = true;

                let page = numbering.page_offset + index / per_page + 1;
                self.draw_header(surface, &section.title, page, numbering.total_pages)?;
            }

            let bitmap = batch.take(index, descriptor).await;
            self.draw_image(surface, bitmap, descriptor, self.layout.position_for(index))?;

            self.report(Progress {
                current: numbering.progress_offset + index + 1,
                total: numbering.progress_total,
                file: descriptor.file_name(),
            });
        }

        if page_open {
            surface.end_page()?;
        }
        Ok(Generation::Finished(()))
    }

    /// Title block centred in the header zone, plus the page label.
    fn draw_header<S: Surface>(
        &self,
        surface: &mut S,
        title: &str,
        page: usize,
        total_pages: usize,
    ) -> Result<()> {
        let layout = &self.layout;
        let center_x = layout.page_width / 2.0;

        let size = layout.title_font_size;
        let max_width = layout.page_width - 2.0 * layout.border;
        let title = nfc(title);
        let lines = wrap_title(&title, max_width, |text| FontFace::Bold.measure_mm(text, size));

        if !lines.is_empty() {
            let line_height = layout.title_line_height();
            let ascent = layout.title_ascent();
            let block_height = (lines.len() - 1) as f64 * line_height + ascent;

            let zone_top = layout.border;
            let zone_height = layout.header_space - HEADER_GAP_MM - zone_top;
            let block_top = zone_top + (zone_height - block_height) / 2.0;
            let first_baseline = layout.page_height - block_top - ascent;

            for (j, line) in lines.into_iter().enumerate() {
                let baseline = first_baseline - j as f64 * line_height;
                let run = self.centered_run(line, center_x, baseline, size, FontFace::Bold);
                surface.draw_text(run)?;
            }
        }

        if layout.page_numbers {
            let label = format!("{page}/{total_pages}");
            let run = self.centered_run(
                label,
                center_x,
                layout.page_number_y,
                layout.filename_font_size,
                FontFace::Regular,
            );
            surface.draw_text(run)?;
        }
        Ok(())
    }

    /// Image centred in its cell, filename lines centred under the cell.
    fn draw_image<S: Surface>(
        &self,
        surface: &mut S,
        bitmap: Bitmap,
        descriptor: &ImageDescriptor,
        cell: CellPosition,
    ) -> Result<()> {
        let layout = &self.layout;
        let width_mm = pt_to_mm(descriptor.display_width);
        let height_mm = pt_to_mm(descriptor.display_height);
        let x_mm = cell.x + (layout.cell_width - width_mm) / 2.0;
        let y_mm = cell.y + (layout.cell_height - height_mm) / 2.0;

        surface.draw_image(
            bitmap,
            Rect {
                x: mm_to_pt(x_mm),
                y: flip_y_image(y_mm, height_mm, layout.page_height),
                width: descriptor.display_width,
                height: descriptor.display_height,
            },
        )?;

        let size = layout.filename_font_size;
        let measure = |text: &str| FontFace::Regular.measure_mm(text, size);
        let lines = wrap_filename(
            &nfc(&descriptor.file_name()),
            layout.cell_width - LABEL_INSET_MM,
            measure,
            measure("_"),
        );

        let first_baseline = cell.y - layout.filename_offset;
        for (j, line) in lines.into_iter().enumerate() {
            let x = cell.x + (layout.cell_width - measure(&line)) / 2.0;
            let baseline = first_baseline - j as f64 * layout.filename_line_height;
            surface.draw_text(TextRun {
                text: line,
                x: mm_to_pt(x),
                baseline: flip_y_text(baseline, layout.page_height),
                size,
                face: FontFace::Regular,
            })?;
        }
        Ok(())
    }

    fn centered_run(
        &self,
        text: String,
        center_x_mm: f64,
        baseline_mm: f64,
        size: f64,
        face: FontFace,
    ) -> TextRun {
        let x = center_x_mm - face.measure_mm(&text, size) / 2.0;
        TextRun {
            text,
            x: mm_to_pt(x),
            baseline: flip_y_text(baseline_mm, self.layout.page_height),
            size,
            face,
        }
    }

    async fn render_timed(
        &mut self,
        surface: &mut PdfSurface,
        sections: &[SectionPlan],
        span: ProgressSpan,
    ) -> Result<Generation<usize>> {
        let started = Instant::now();
        let outcome = self.render(surface, sections, span).await?;
        if !outcome.is_cancelled() {
            self.record_timing(Phase::Render, started);
        }
        Ok(outcome)
    }

    fn save_timed(&mut self, surface: PdfSurface, output: &Path) -> Result<usize> {
        let started = Instant::now();
        let pages = surface.write_to(output)?;
        self.record_timing(Phase::Save, started);
        Ok(pages)
    }

    /// Report `phase` as having run from `started` until now.
    pub fn record_timing(&mut self, phase: Phase, started: Instant) {
        if let Some(callback) = self.timing.as_mut() {
            callback(&Timing {
                phase,
                elapsed: started.elapsed(),
            });
        }
    }

    fn report(&mut self, progress: Progress) {
        if let Some(callback) = self.progress.as_mut() {
            callback(&progress);
        }
    }
}

/// Composed form, so decomposed accents measure and draw as one glyph.
fn nfc(text: &str) -> String {
    text.nfc().collect()
}

/// `{display name with path separators replaced}_{YYYY-MM-DD}.pdf`.
pub fn per_folder_file_name(display_name: &str, date: NaiveDate) -> String {
    let safe = display_name.replace(['/', '\\'], "_");
    format!("{safe}_{}.pdf", date.format("%Y-%m-%d"))
}
