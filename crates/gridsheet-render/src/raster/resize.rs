// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Resize engine: exact-size resampling and opacity normalization.
//
// Large reductions go through two steps: a smooth triangle (area-averaging)
// pass down to twice the target, then a Mitchell-Netravali cubic pass to the
// exact target.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use tracing::debug;

use super::bitmap::{AlphaType, Bitmap};

/// Reduction ratio above which the two-step path is used.
pub const TWO_STEP_RATIO: f64 = 4.0;

// Mitchell-Netravali parameters (B = C = 1/3).
const MITCHELL_B: f64 = 1.0 / 3.0;
const MITCHELL_C: f64 = 1.0 / 3.0;
const MITCHELL_SUPPORT: f64 = 2.0;

/// Resize `source` to exactly `target_width` x `target_height`.
///
/// A zero target dimension is treated as one pixel.
pub fn resize_exact(source: &Bitmap, target_width: u32, target_height: u32) -> Bitmap {
    let target_width = target_width.max(1);
    let target_height = target_height.max(1);
    let (src_w, src_h) = source.dimensions();

    let ratio = reduction_ratio(src_w, src_h, target_width, target_height);

    let pixels = if ratio > TWO_STEP_RATIO {
        debug!(
            src_w,
            src_h,
            target_width,
            target_height,
            ratio,
            "two-step resize"
        );
        let mid = imageops::resize(
            source.pixels(),
            target_width * 2,
            target_height * 2,
            FilterType::Triangle,
        );
        mitchell_resize(&mid, target_width, target_height)
    } else {
        mitchell_resize(source.pixels(), target_width, target_height)
    };

    Bitmap::new(pixels, source.alpha_type())
}

/// `max(src_w / target_w, src_h / target_h)`.
pub fn reduction_ratio(src_w: u32, src_h: u32, target_w: u32, target_h: u32) -> f64 {
    let rw = f64::from(src_w) / f64::from(target_w.max(1));
    let rh = f64::from(src_h) / f64::from(target_h.max(1));
    rw.max(rh)
}

/// Make a bitmap safe for an alpha-less encoder.
///
/// - Already opaque: returned unchanged.
/// - Alpha channel present but every pixel at 255: relabelled opaque, pixels
///   untouched.
/// - Any transparency: composited over white, alpha forced to 255.
pub fn normalize_opacity(bitmap: Bitmap) -> Bitmap {
    if bitmap.is_opaque() {
        return bitmap;
    }

    let has_transparency = bitmap.pixels().pixels().any(|p| p[3] < 255);
    if !has_transparency {
        return Bitmap::new(bitmap.into_pixels(), AlphaType::Opaque);
    }

    let mut pixels = bitmap.into_pixels();
    for pixel in pixels.pixels_mut() {
        *pixel = over_white(*pixel);
    }
    Bitmap::new(pixels, AlphaType::Opaque)
}

/// `channel * alpha + 255 * (1 - alpha)`, rounded, with alpha forced to 255.
fn over_white(pixel: Rgba<u8>) -> Rgba<u8> {
    let Rgba([r, g, b, a]) = pixel;
    let a = u32::from(a);
    let blend = |c: u8| ((u32::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
    Rgba([blend(r), blend(g), blend(b), 255])
}

// -- Mitchell-Netravali separable resampler -----------------------------------

fn mitchell(x: f64) -> f64 {
    let (b, c) = (MITCHELL_B, MITCHELL_C);
    let x = x.abs();
    if x < 1.0 {
        ((12.0 - 9.0 * b - 6.0 * c) * x * x * x
            + (-18.0 + 12.0 * b + 6.0 * c) * x * x
            + (6.0 - 2.0 * b))
            / 6.0
    } else if x < 2.0 {
        ((-b - 6.0 * c) * x * x * x
            + (6.0 * b + 30.0 * c) * x * x
            + (-12.0 * b - 48.0 * c) * x
            + (8.0 * b + 24.0 * c))
            / 6.0
    } else {
        0.0
    }
}

/// Contributing source pixels for one output pixel.
struct Contribution {
    start: usize,
    weights: Vec<f32>,
}

/// Precompute normalised kernel weights mapping `src_len` samples onto
/// `dst_len` samples.
fn contributions(src_len: u32, dst_len: u32) -> Vec<Contribution> {
    let scale = f64::from(src_len) / f64::from(dst_len);
    // Widen the kernel when reducing so every source pixel contributes.
    let filter_scale = scale.max(1.0);
    let support = MITCHELL_SUPPORT * filter_scale;
    let last = i64::from(src_len) - 1;

    (0..dst_len)
        .map(|i| {
            let center = (f64::from(i) + 0.5) * scale - 0.5;
            let left = ((center - support).floor() as i64).max(0);
            let right = ((center + support).ceil() as i64).min(last);

            let mut weights: Vec<f32> = (left..=right)
                .map(|j| mitchell((j as f64 - center) / filter_scale) as f32)
                .collect();
            let sum: f32 = weights.iter().sum();
            if sum.abs() > f32::EPSILON {
                for w in &mut weights {
                    *w /= sum;
                }
            } else {
                // Degenerate window: fall back to nearest sample.
                let nearest = (center.round() as i64).clamp(left, right);
                for (k, w) in weights.iter_mut().enumerate() {
                    *w = if left + k as i64 == nearest { 1.0 } else { 0.0 };
                }
            }

            Contribution {
                start: left as usize,
                weights,
            }
        })
        .collect()
}

/// Separable Mitchell resize of an RGBA8 image, filtering in premultiplied
/// space so transparent pixels do not bleed colour into their neighbours.
fn mitchell_resize(src: &RgbaImage, dst_w: u32, dst_h: u32) -> RgbaImage {
    let (src_w, src_h) = src.dimensions();
    if (src_w, src_h) == (dst_w, dst_h) {
        return src.clone();
    }

    // Premultiplied float working copy.
    let premul: Vec<[f32; 4]> = src
        .pixels()
        .map(|p| {
            let a = f32::from(p[3]) / 255.0;
            [
                f32::from(p[0]) * a,
                f32::from(p[1]) * a,
                f32::from(p[2]) * a,
                f32::from(p[3]),
            ]
        })
        .collect();

    // Horizontal pass: src_w x src_h -> dst_w x src_h.
    let h_contrib = contributions(src_w, dst_w);
    let mut horizontal = vec![[0.0f32; 4]; dst_w as usize * src_h as usize];
    for y in 0..src_h as usize {
        let row = &premul[y * src_w as usize..(y + 1) * src_w as usize];
        for (x, contrib) in h_contrib.iter().enumerate() {
            let mut acc = [0.0f32; 4];
            for (k, w) in contrib.weights.iter().enumerate() {
                let px = row[contrib.start + k];
                for c in 0..4 {
                    acc[c] += px[c] * w;
                }
            }
            horizontal[y * dst_w as usize + x] = acc;
        }
    }
    drop(premul);

    // Vertical pass: dst_w x src_h -> dst_w x dst_h.
    let v_contrib = contributions(src_h, dst_h);
    let mut out = RgbaImage::new(dst_w, dst_h);
    for (y, contrib) in v_contrib.iter().enumerate() {
        for x in 0..dst_w as usize {
            let mut acc = [0.0f32; 4];
            for (k, w) in contrib.weights.iter().enumerate() {
                let px = horizontal[(contrib.start + k) * dst_w as usize + x];
                for c in 0..4 {
                    acc[c] += px[c] * w;
                }
            }
            out.put_pixel(x as u32, y as u32, unpremultiply(acc));
        }
    }

    out
}

fn unpremultiply(acc: [f32; 4]) -> Rgba<u8> {
    let alpha = acc[3].clamp(0.0, 255.0);
    if alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let scale = 255.0 / alpha;
    let channel = |v: f32| (v * scale).round().clamp(0.0, 255.0) as u8;
    Rgba([
        channel(acc[0]),
        channel(acc[1]),
        channel(acc[2]),
        alpha.round() as u8,
    ])
}
