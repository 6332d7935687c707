// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Drawing surfaces: where composed pages end up.
//
// The compositor speaks in canvas coordinates: points, origin at the top-left
// of the page, y growing downward. `PdfSurface` converts back to PDF user
// space (origin bottom-left) when it emits operations.
//
// printpdf 0.8 uses a data-oriented API: each page is a `Vec<Op>`, images are
// registered once on the document as XObjects, and the whole document is
// serialised by `PdfDocument::save()`.
//
// Images are JPEG-encoded as they are drawn and embedded as ready-made
// `/DCTDecode` streams, so the document only ever holds compressed bytes.

use std::collections::BTreeMap;
use std::path::Path;

use gridsheet_core::error::{GridsheetError, Result};
use image::codecs::jpeg::JpegEncoder;
use printpdf::{
    DictItem, ExternalStream, ExternalXObject, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions,
    PdfWarnMsg, Point, Pt, Px, TextItem, XObjectTransform,
};
use tracing::{debug, info, instrument};

use super::fonts::FontFace;
use crate::layout::coords::mm_to_pt;
use crate::raster::Bitmap;

/// Axis-aligned rectangle in canvas points (top-left origin).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One line of text, left-aligned at `x`, baseline at `baseline` (canvas
/// points from the page top).
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f64,
    pub baseline: f64,
    pub size: f64,
    pub face: FontFace,
}

/// Page sink used by the compositor.
pub trait Surface {
    /// Open a new page of the given size in millimetres.
    fn begin_page(&mut self, width_mm: f64, height_mm: f64) -> Result<()>;

    /// Draw an opaque bitmap scaled into `rect`. Takes ownership so the
    /// pixels can be released as soon as the surface has encoded them.
    fn draw_image(&mut self, bitmap: Bitmap, rect: Rect) -> Result<()>;

    fn draw_text(&mut self, run: TextRun) -> Result<()>;

    /// Close the open page.
    fn end_page(&mut self) -> Result<()>;
}

struct OpenPage {
    width_mm: f64,
    height_mm: f64,
    ops: Vec<Op>,
}

impl OpenPage {
    fn height_pt(&self) -> f64 {
        mm_to_pt(self.height_mm)
    }
}

/// A PDF document under construction.
pub struct PdfSurface {
    doc: PdfDocument,
    pages: Vec<PdfPage>,
    current: Option<OpenPage>,
    jpeg_quality: u8,
    image_bytes: usize,
}

impl PdfSurface {
    /// Empty document; embedded images are JPEG-compressed at
    /// `jpeg_quality` (1..=100) as they are drawn.
    pub fn new(title: &str, jpeg_quality: u8) -> Self {
        Self {
            doc: PdfDocument::new(title),
            pages: Vec::new(),
            current: None,
            jpeg_quality: jpeg_quality.clamp(1, 100),
            image_bytes: 0,
        }
    }

    /// Encoded image data held so far.
    pub fn image_bytes(&self) -> usize {
        self.image_bytes
    }

    /// Pages closed so far.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Serialise the document. Any page still open is closed first.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if self.current.is_some() {
            self.end_page()?;
        }

        let page_count = self.pages.len();
        self.doc.with_pages(self.pages);

        // Images are already encoded; nothing is left for the optimiser.
        let options = PdfSaveOptions {
            image_optimization: None,
            ..Default::default()
        };

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let bytes = self.doc.save(&options, &mut warnings);
        debug!(
            pages = page_count,
            bytes = bytes.len(),
            image_bytes = self.image_bytes,
            warnings = warnings.len(),
            "document serialised"
        );
        Ok(bytes)
    }

    /// Serialise and write to `path`, returning the page count.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn write_to(self, path: &Path) -> Result<usize> {
        let pages = self.pages.len() + usize::from(self.current.is_some());
        let bytes = self.finish()?;
        std::fs::write(path, &bytes)?;
        info!(pages, bytes = bytes.len(), "wrote PDF");
        Ok(pages)
    }

    fn open_page(&mut self) -> Result<&mut OpenPage> {
        self.current
            .as_mut()
            .ok_or_else(|| GridsheetError::Pdf("drawing outside of an open page".into()))
    }
}

impl Surface for PdfSurface {
    fn begin_page(&mut self, width_mm: f64, height_mm: f64) -> Result<()> {
        if self.current.is_some() {
            return Err(GridsheetError::Pdf("previous page was not closed".into()));
        }
        self.current = Some(OpenPage {
            width_mm,
            height_mm,
            ops: Vec::new(),
        });
        Ok(())
    }

    fn draw_image(&mut self, bitmap: Bitmap, rect: Rect) -> Result<()> {
        self.open_page()?;
        let (width, height) = bitmap.dimensions();
        let jpeg = encode_jpeg(&bitmap, self.jpeg_quality)?;
        drop(bitmap);
        self.image_bytes += jpeg.len();
        let id = self.doc.add_xobject(&jpeg_xobject(jpeg, width, height));

        let page = self.open_page()?;
        let bottom = page.height_pt() - rect.y - rect.height;
        // At 72 dpi one pixel is one point, so the scale maps pixels to the
        // requested size directly.
        page.ops.push(Op::UseXobject {
            id,
            transform: XObjectTransform {
                translate_x: Some(Pt(rect.x as f32)),
                translate_y: Some(Pt(bottom as f32)),
                scale_x: Some((rect.width / f64::from(width)) as f32),
                scale_y: Some((rect.height / f64::from(height)) as f32),
                dpi: Some(72.0),
                rotate: None,
            },
        });
        Ok(())
    }

    fn draw_text(&mut self, run: TextRun) -> Result<()> {
        let page = self.open_page()?;
        let y = page.height_pt() - run.baseline;
        let font = run.face.builtin();

        page.ops.push(Op::StartTextSection);
        page.ops.push(Op::SetTextCursor {
            pos: Point {
                x: Pt(run.x as f32),
                y: Pt(y as f32),
            },
        });
        page.ops.push(Op::SetFontSizeBuiltinFont {
            size: Pt(run.size as f32),
            font,
        });
        page.ops.push(Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text(run.text)],
            font,
        });
        page.ops.push(Op::EndTextSection);
        Ok(())
    }

    fn end_page(&mut self) -> Result<()> {
        let page = self
            .current
            .take()
            .ok_or_else(|| GridsheetError::Pdf("no page to close".into()))?;
        self.pages.push(PdfPage::new(
            Mm(page.width_mm as f32),
            Mm(page.height_mm as f32),
            page.ops,
        ));
        Ok(())
    }
}

/// Baseline JPEG of the bitmap's RGB channels.
pub fn encode_jpeg(bitmap: &Bitmap, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode_image(&bitmap.to_rgb8())
        .map_err(|err| GridsheetError::Pdf(format!("JPEG encoding failed: {err}")))?;
    Ok(out)
}

/// Image XObject wrapping JPEG bytes as-is.
fn jpeg_xobject(jpeg: Vec<u8>, width: u32, height: u32) -> ExternalXObject {
    let name = |n: &str| DictItem::Name(n.as_bytes().to_vec());
    let dict = BTreeMap::from([
        ("Type".to_string(), name("XObject")),
        ("Subtype".to_string(), name("Image")),
        ("Width".to_string(), DictItem::Int(i64::from(width))),
        ("Height".to_string(), DictItem::Int(i64::from(height))),
        ("ColorSpace".to_string(), name("DeviceRGB")),
        ("BitsPerComponent".to_string(), DictItem::Int(8)),
        ("Filter".to_string(), name("DCTDecode")),
    ]);

    ExternalXObject {
        stream: ExternalStream {
            dict,
            content: jpeg,
            compress: false,
        },
        width: Some(Px(width as usize)),
        height: Some(Px(height as usize)),
        dpi: Some(72.0),
    }
}

/// Everything a surface was asked to do, for assertions in tests.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    BeginPage { width_mm: f64, height_mm: f64 },
    Image { width: u32, height: u32, rect: Rect },
    Text(TextRun),
    EndPage,
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub calls: Vec<Recorded>,
    open: bool,
}

#[cfg(test)]
impl RecordingSurface {
    pub fn pages(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Recorded::BeginPage { .. }))
            .count()
    }

    pub fn images(&self) -> Vec<(u32, u32, Rect)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Recorded::Image {
                    width,
                    height,
                    rect,
                } => Some((*width, *height, *rect)),
                _ => None,
            })
            .collect()
    }

    pub fn texts(&self) -> Vec<&TextRun> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Recorded::Text(run) => Some(run),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl Surface for RecordingSurface {
    fn begin_page(&mut self, width_mm: f64, height_mm: f64) -> Result<()> {
        assert!(!self.open, "begin_page while a page is open");
        self.open = true;
        self.calls.push(Recorded::BeginPage {
            width_mm,
            height_mm,
        });
        Ok(())
    }

    fn draw_image(&mut self, bitmap: Bitmap, rect: Rect) -> Result<()> {
        assert!(self.open, "draw_image outside a page");
        assert!(bitmap.is_opaque(), "non-opaque bitmap reached the surface");
        let (width, height) = bitmap.dimensions();
        self.calls.push(Recorded::Image {
            width,
            height,
            rect,
        });
        Ok(())
    }

    fn draw_text(&mut self, run: TextRun) -> Result<()> {
        assert!(self.open, "draw_text outside a page");
        self.calls.push(Recorded::Text(run));
        Ok(())
    }

    fn end_page(&mut self) -> Result<()> {
        assert!(self.open, "end_page without begin_page");
        self.open = false;
        self.calls.push(Recorded::EndPage);
        Ok(())
    }
}
