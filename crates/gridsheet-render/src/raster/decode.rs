// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Decode pipeline: backend selection, pixel budgets and the placeholder
// fallback.
//
// Every image goes through a fixed chain of backends picked from its
// extension. A backend either yields a bitmap or an error; errors are logged
// and the next backend is tried. The chain always ends in the placeholder, so
// preparation never fails.

use std::fmt::Display;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, Limits, RgbaImage};
use jpeg_decoder::PixelFormat;
use tracing::{debug, instrument, warn};

use gridsheet_core::error::{GridsheetError, Result};
use gridsheet_core::types::ImageKind;

use super::bitmap::{AlphaType, Bitmap};
use super::gate::DecodeGate;
use super::native_tiff;
use super::resize::{normalize_opacity, resize_exact};
use crate::layout::geometry::FALLBACK_RATIO;

/// Pixel budget for the fast codec path (about 400 MB of RGBA).
pub const FAST_PIXEL_BUDGET: u64 = 100_000_000;

/// Pixel budget for the TIFF path (about 1 GB of RGBA).
pub const TIFF_PIXEL_BUDGET: u64 = 250_000_000;

/// Concurrent full-resolution TIFF decodes.
pub const TIFF_CONCURRENCY: usize = 2;

/// Memory bounds for image decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    pub fast_pixel_budget: u64,
    pub tiff_pixel_budget: u64,
    pub tiff_concurrency: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            fast_pixel_budget: FAST_PIXEL_BUDGET,
            tiff_pixel_budget: TIFF_PIXEL_BUDGET,
            tiff_concurrency: TIFF_CONCURRENCY,
        }
    }
}

/// Decoder backends, in the order they may be tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// `image` crate codecs (JPEG, PNG, WebP), header probe plus decode.
    Fast,
    /// IFD header probe plus `tiff` crate decode, serialized through the gate.
    Tiff,
    /// Uniform grey bitmap. Always succeeds.
    Placeholder,
}

impl Backend {
    /// Decode order for a file of the given kind.
    pub fn decode_chain(kind: Option<ImageKind>) -> &'static [Backend] {
        match kind {
            Some(ImageKind::Raw) => &[Backend::Placeholder],
            Some(ImageKind::Tiff) => &[Backend::Tiff, Backend::Fast, Backend::Placeholder],
            _ => &[Backend::Fast, Backend::Placeholder],
        }
    }

    /// Dimension probe order. The placeholder has no dimensions to offer.
    pub fn probe_chain(kind: Option<ImageKind>) -> &'static [Backend] {
        match kind {
            Some(ImageKind::Raw) => &[],
            Some(ImageKind::Tiff) => &[Backend::Tiff, Backend::Fast],
            _ => &[Backend::Fast],
        }
    }
}

/// Reduction applied while decoding: twice the target size on the
/// dominant axis is kept for the resampler, never more than the source.
pub fn decode_scale(
    src_width: u32,
    src_height: u32,
    target_width: u32,
    target_height: u32,
) -> f64 {
    if src_width == 0 || src_height == 0 {
        return 1.0;
    }
    let sx = 2.0 * f64::from(target_width) / f64::from(src_width);
    let sy = 2.0 * f64::from(target_height) / f64::from(src_height);
    sx.max(sy).min(1.0)
}

/// Reject a decode whose pixel count exceeds `budget`.
pub fn check_pixel_budget(width: u32, height: u32, budget: u64) -> Result<()> {
    if u64::from(width) * u64::from(height) > budget {
        return Err(GridsheetError::ResourceLimit {
            width,
            height,
            budget,
        });
    }
    Ok(())
}

/// Turns image files into opaque bitmaps of an exact pixel size.
///
/// Cheap to clone; clones share the TIFF decode gate.
#[derive(Debug, Clone)]
pub struct DecodePipeline {
    limits: DecodeLimits,
    tiff_gate: Arc<DecodeGate>,
}

impl Default for DecodePipeline {
    fn default() -> Self {
        Self::new(DecodeLimits::default())
    }
}

impl DecodePipeline {
    pub fn new(limits: DecodeLimits) -> Self {
        Self {
            limits,
            tiff_gate: Arc::new(DecodeGate::new(limits.tiff_concurrency)),
        }
    }

    pub fn limits(&self) -> DecodeLimits {
        self.limits
    }

    pub fn tiff_gate(&self) -> &DecodeGate {
        &self.tiff_gate
    }

    /// Decode `path` and bring it to exactly `target_width` x
    /// `target_height`, opaque.
    ///
    /// Never fails: when every backend gives up, a light-grey placeholder of
    /// the target size is returned and a warning is logged.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn prepare(&self, path: &Path, target_width: u32, target_height: u32) -> Bitmap {
        let kind = ImageKind::from_path(path);
        if kind.is_some_and(|k| k.is_raw()) {
            warn!(path = %path.display(), "RAW decode not supported, skipping");
        }

        Backend::decode_chain(kind)
            .iter()
            .find_map(|&backend| {
                match self.decode_with(backend, path, target_width, target_height) {
                    Ok(bitmap) => Some(bitmap),
                    Err(err) => {
                        warn!(
                            path = %path.display(),
                            ?backend,
                            error = %err,
                            "decode backend failed, trying next"
                        );
                        None
                    }
                }
            })
            .unwrap_or_else(|| Bitmap::placeholder(target_width, target_height))
    }

    /// Width / height of the image at `path`, read from headers only.
    ///
    /// RAW and unreadable files get the 3:2 fallback ratio.
    pub fn probe_ratio(&self, path: &Path) -> f64 {
        let kind = ImageKind::from_path(path);
        if kind.is_some_and(|k| k.is_raw()) {
            warn!(path = %path.display(), "RAW file skipped for dimensions");
            return FALLBACK_RATIO;
        }

        match self.probe_dimensions(path) {
            Some((width, height)) => f64::from(width) / f64::from(height),
            None => {
                warn!(path = %path.display(), "cannot read dimensions, assuming 3:2");
                FALLBACK_RATIO
            }
        }
    }

    /// Source dimensions from the first backend that can read the header.
    pub fn probe_dimensions(&self, path: &Path) -> Option<(u32, u32)> {
        Backend::probe_chain(ImageKind::from_path(path))
            .iter()
            .find_map(|&backend| match backend {
                Backend::Fast => probe_fast(path),
                Backend::Tiff => native_tiff::read_dimensions(path),
                Backend::Placeholder => None,
            })
            .filter(|&(width, height)| width > 0 && height > 0)
    }

    fn decode_with(
        &self,
        backend: Backend,
        path: &Path,
        target_width: u32,
        target_height: u32,
    ) -> Result<Bitmap> {
        match backend {
            Backend::Fast => self.decode_fast(path, target_width, target_height),
            Backend::Tiff => self.decode_tiff(path, target_width, target_height),
            Backend::Placeholder => {
                warn!(path = %path.display(), "cannot decode image, using placeholder");
                Ok(Bitmap::placeholder(target_width, target_height))
            }
        }
    }

    fn decode_fast(&self, path: &Path, target_width: u32, target_height: u32) -> Result<Bitmap> {
        let budget = self.limits.fast_pixel_budget;
        let mut limits = Limits::default();
        limits.max_alloc = Some(budget.saturating_mul(8));

        let mut reader = ImageReader::open(path)?
            .with_guessed_format()
            .map_err(|err| decode_error(path, err))?;
        match reader.format() {
            None => return Err(decode_error(path, "unrecognized image format")),
            Some(ImageFormat::Tiff) => {
                return Err(decode_error(path, "TIFF data is left to the TIFF backend"));
            }
            Some(ImageFormat::Jpeg) => {
                return self.decode_jpeg_scaled(path, target_width, target_height);
            }
            Some(_) => {}
        }
        reader.limits(limits);

        let decoder = reader.into_decoder().map_err(|err| decode_error(path, err))?;
        // PNG and WebP only decode at full size, so the budget covers the
        // whole source.
        let (src_width, src_height) = decoder.dimensions();
        check_pixel_budget(src_width, src_height, budget)?;

        let decoded = DynamicImage::from_decoder(decoder).map_err(|err| decode_error(path, err))?;
        debug!(src_width, src_height, target_width, target_height, "fast decode");

        Ok(finish(Bitmap::from_dynamic(decoded), target_width, target_height))
    }

    /// DCT-domain reduction (1/2, 1/4 or 1/8) before the resampler sees
    /// the image. The budget applies to the reduced size.
    fn decode_jpeg_scaled(
        &self,
        path: &Path,
        target_width: u32,
        target_height: u32,
    ) -> Result<Bitmap> {
        let budget = self.limits.fast_pixel_budget;
        let mut decoder = jpeg_decoder::Decoder::new(BufReader::new(File::open(path)?));
        decoder.read_info().map_err(|err| decode_error(path, err))?;
        let info = decoder
            .info()
            .ok_or_else(|| decode_error(path, "missing JPEG frame header"))?;
        let (src_width, src_height) = (u32::from(info.width), u32::from(info.height));

        let scale = decode_scale(src_width, src_height, target_width, target_height);
        let requested = |len: u32| {
            (f64::from(len) * scale)
                .ceil()
                .clamp(1.0, f64::from(u16::MAX)) as u16
        };
        let (width, height) = decoder
            .scale(requested(src_width), requested(src_height))
            .map_err(|err| decode_error(path, err))?;
        let (width, height) = (u32::from(width), u32::from(height));
        check_pixel_budget(width, height, budget)?;

        decoder.set_max_decoding_buffer_size(
            usize::try_from(budget.saturating_mul(4)).unwrap_or(usize::MAX),
        );
        let samples = decoder.decode().map_err(|err| decode_error(path, err))?;
        let pixels = jpeg_to_rgba(info.pixel_format, width, height, &samples)
            .ok_or_else(|| decode_error(path, "JPEG sample buffer has the wrong size"))?;
        debug!(
            src_width,
            src_height,
            width,
            height,
            target_width,
            target_height,
            "scaled jpeg decode"
        );

        Ok(finish(
            Bitmap::new(pixels, AlphaType::Opaque),
            target_width,
            target_height,
        ))
    }

    fn decode_tiff(&self, path: &Path, target_width: u32, target_height: u32) -> Result<Bitmap> {
        if !native_tiff::AVAILABLE {
            return Err(decode_error(path, "built without the TIFF backend"));
        }
        let (width, height) = native_tiff::read_dimensions(path)
            .ok_or_else(|| decode_error(path, "unreadable TIFF header"))?;
        check_pixel_budget(width, height, self.limits.tiff_pixel_budget)?;

        let full = {
            let _permit = self.tiff_gate.acquire();
            native_tiff::decode_rgba(path)?
        };
        debug!(width, height, target_width, target_height, "tiff decode");

        Ok(finish(full, target_width, target_height))
    }
}

/// Expand jpeg-decoder output to RGBA8. 16-bit grey keeps its high byte.
fn jpeg_to_rgba(
    format: PixelFormat,
    width: u32,
    height: u32,
    samples: &[u8],
) -> Option<RgbaImage> {
    let rgba: Vec<u8> = match format {
        PixelFormat::L8 => samples.iter().flat_map(|&l| [l, l, l, 255]).collect(),
        PixelFormat::L16 => samples
            .chunks_exact(2)
            .flat_map(|px| [px[0], px[0], px[0], 255])
            .collect(),
        PixelFormat::RGB24 => samples
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], 255])
            .collect(),
        PixelFormat::CMYK32 => samples
            .chunks_exact(4)
            .flat_map(|px| native_tiff::cmyk_to_rgba(px[0], px[1], px[2], px[3]))
            .collect(),
    };
    RgbaImage::from_raw(width, height, rgba)
}

fn probe_fast(path: &Path) -> Option<(u32, u32)> {
    ImageReader::open(path)
        .ok()?
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Resize only when needed, then flatten any transparency.
fn finish(bitmap: Bitmap, target_width: u32, target_height: u32) -> Bitmap {
    let sized = if bitmap.dimensions() == (target_width, target_height) {
        bitmap
    } else {
        resize_exact(&bitmap, target_width, target_height)
    };
    normalize_opacity(sized)
}

fn decode_error(path: &Path, err: impl Display) -> GridsheetError {
    GridsheetError::Decode(format!("{}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::bitmap::PLACEHOLDER_RGBA;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::path::PathBuf;

    fn is_placeholder(bitmap: &Bitmap) -> bool {
        bitmap.pixels().pixels().all(|p| *p == PLACEHOLDER_RGBA)
    }

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(width, height, Rgb([10, 200, 30]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn budget_rejects_decompression_bombs() {
        let err = check_pixel_budget(11_000, 11_000, FAST_PIXEL_BUDGET).unwrap_err();
        assert!(matches!(
            err,
            GridsheetError::ResourceLimit {
                width: 11_000,
                height: 11_000,
                ..
            }
        ));
        assert!(check_pixel_budget(9_000, 9_000, FAST_PIXEL_BUDGET).is_ok());
        assert!(check_pixel_budget(15_000, 15_000, TIFF_PIXEL_BUDGET).is_ok());
        assert!(check_pixel_budget(16_000, 16_000, TIFF_PIXEL_BUDGET).is_err());
    }

    #[test]
    fn chains_end_in_placeholder() {
        for kind in [
            None,
            Some(ImageKind::Jpeg),
            Some(ImageKind::Tiff),
            Some(ImageKind::Raw),
        ] {
            assert_eq!(
                Backend::decode_chain(kind).last(),
                Some(&Backend::Placeholder)
            );
        }
        assert_eq!(
            Backend::decode_chain(Some(ImageKind::Raw)),
            &[Backend::Placeholder]
        );
        assert_eq!(Backend::probe_chain(Some(ImageKind::Tiff))[0], Backend::Tiff);
    }

    #[test]
    fn missing_file_yields_exact_placeholder() {
        let pipeline = DecodePipeline::default();
        let bmp = pipeline.prepare(Path::new("/definitely/not/here.jpg"), 120, 80);
        assert_eq!(bmp.dimensions(), (120, 80));
        assert!(bmp.is_opaque());
        assert!(is_placeholder(&bmp));
    }

    #[test]
    fn corrupt_file_yields_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"this is not a jpeg at all").unwrap();

        let pipeline = DecodePipeline::default();
        let bmp = pipeline.prepare(&path, 33, 17);
        assert_eq!(bmp.dimensions(), (33, 17));
        assert!(is_placeholder(&bmp));
        assert_eq!(pipeline.probe_ratio(&path), FALLBACK_RATIO);
    }

    #[test]
    fn raw_files_are_never_decoded() {
        let dir = tempfile::tempdir().unwrap();
        // Valid PNG bytes behind a RAW extension still give a placeholder.
        let png = write_png(dir.path(), "shot.png", 8, 8);
        let raw = dir.path().join("shot.cr2");
        std::fs::copy(&png, &raw).unwrap();

        let pipeline = DecodePipeline::default();
        assert!(is_placeholder(&pipeline.prepare(&raw, 9, 6)));
        assert_eq!(pipeline.probe_ratio(&raw), FALLBACK_RATIO);
    }

    #[test]
    fn png_is_probed_and_resized_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "wide.png", 40, 20);

        let pipeline = DecodePipeline::default();
        assert_eq!(pipeline.probe_dimensions(&path), Some((40, 20)));
        assert!((pipeline.probe_ratio(&path) - 2.0).abs() < 1e-9);

        let bmp = pipeline.prepare(&path, 10, 5);
        assert_eq!(bmp.dimensions(), (10, 5));
        assert!(bmp.is_opaque());
        assert!(!is_placeholder(&bmp));
    }

    #[test]
    fn transparent_png_is_flattened_over_white() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clear.png");
        RgbaImage::from_pixel(6, 4, Rgba([255, 0, 0, 0]))
            .save(&path)
            .unwrap();

        let bmp = DecodePipeline::default().prepare(&path, 6, 4);
        assert!(bmp.is_opaque());
        assert_eq!(*bmp.pixels().get_pixel(0, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn over_budget_image_falls_back_to_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "big.png", 40, 20);

        let pipeline = DecodePipeline::new(DecodeLimits {
            fast_pixel_budget: 100,
            ..DecodeLimits::default()
        });
        let bmp = pipeline.prepare(&path, 10, 5);
        assert_eq!(bmp.dimensions(), (10, 5));
        assert!(is_placeholder(&bmp));
    }

    fn write_jpeg(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_fn(width, height, |x, y| Rgb([(x / 8) as u8, (y / 8) as u8, 128]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn decode_scale_keeps_twice_the_target() {
        assert!((decode_scale(2000, 2000, 100, 100) - 0.1).abs() < 1e-12);
        assert!((decode_scale(4000, 1000, 100, 100) - 0.2).abs() < 1e-12);
        assert_eq!(decode_scale(300, 200, 400, 300), 1.0);
        assert_eq!(decode_scale(0, 10, 5, 5), 1.0);
    }

    #[test]
    fn jpeg_budget_applies_to_the_reduced_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jpeg(dir.path(), "large.jpg", 2000, 2000);

        // 2000x2000 is 4M pixels; the 1/8 decode is 250x250.
        let pipeline = DecodePipeline::new(DecodeLimits {
            fast_pixel_budget: 1_000_000,
            ..DecodeLimits::default()
        });
        let bmp = pipeline.prepare(&path, 100, 100);
        assert_eq!(bmp.dimensions(), (100, 100));
        assert!(bmp.is_opaque());
        assert!(!is_placeholder(&bmp));
    }

    #[test]
    fn jpeg_that_cannot_shrink_enough_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jpeg(dir.path(), "full.jpg", 256, 256);

        // Target equals the source, so no reduction is possible.
        let pipeline = DecodePipeline::new(DecodeLimits {
            fast_pixel_budget: 10_000,
            ..DecodeLimits::default()
        });
        assert!(is_placeholder(&pipeline.prepare(&path, 256, 256)));
    }

    #[test]
    fn scaled_jpeg_keeps_its_colours() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.jpg");
        RgbImage::from_pixel(800, 600, Rgb([200, 40, 40]))
            .save(&path)
            .unwrap();

        let bmp = DecodePipeline::default().prepare(&path, 40, 30);
        assert_eq!(bmp.dimensions(), (40, 30));
        let px = bmp.pixels().get_pixel(20, 15);
        assert!(px[0] > 170 && px[1] < 80 && px[2] < 80, "got {px:?}");
    }

    #[cfg(not(feature = "tiff"))]
    #[test]
    fn tiff_without_backend_never_takes_the_gate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.tif");
        std::fs::write(&path, b"II*\0").unwrap();

        let pipeline = DecodePipeline::default();
        let err = pipeline.decode_tiff(&path, 4, 4).unwrap_err();
        assert!(matches!(err, GridsheetError::Decode(_)));
        assert_eq!(pipeline.tiff_gate().in_use(), 0);
    }

    #[cfg(feature = "tiff")]
    #[test]
    fn tiff_goes_through_the_gate() {
        use std::fs::File;
        use tiff::encoder::{TiffEncoder, colortype};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.tiff");
        let data: Vec<u8> = (0..16 * 8).flat_map(|_| [0u8, 0, 255]).collect();
        TiffEncoder::new(File::create(&path).unwrap())
            .unwrap()
            .write_image::<colortype::RGB8>(16, 8, &data)
            .unwrap();

        let pipeline = DecodePipeline::default();
        assert!((pipeline.probe_ratio(&path) - 2.0).abs() < 1e-9);

        let bmp = pipeline.prepare(&path, 16, 8);
        assert_eq!(bmp.dimensions(), (16, 8));
        assert_eq!(*bmp.pixels().get_pixel(3, 3), Rgba([0, 0, 255, 255]));
        assert_eq!(pipeline.tiff_gate().in_use(), 0);

        let small = DecodePipeline::new(DecodeLimits {
            tiff_pixel_budget: 10,
            ..DecodeLimits::default()
        });
        assert!(is_placeholder(&small.prepare(&path, 4, 2)));
    }
}
