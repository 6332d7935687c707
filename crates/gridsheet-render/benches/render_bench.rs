// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the gridsheet-render resize engine.
// Covers both resampling paths: the single Mitchell pass for modest
// reductions and the two-step path for large ones.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{Rgba, RgbaImage};

use gridsheet_render::raster::{AlphaType, Bitmap, normalize_opacity, resize_exact};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Diagonal gradient so the filters have real detail to chew on.
fn gradient(width: u32, height: u32, alpha: u8) -> Bitmap {
    let pixels = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, alpha])
    });
    let kind = if alpha == 255 {
        AlphaType::Opaque
    } else {
        AlphaType::Unpremultiplied
    };
    Bitmap::new(pixels, kind)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// 1200x800 down to 400x267: ratio 3, single Mitchell pass.
fn bench_single_step(c: &mut Criterion) {
    let source = gradient(1200, 800, 255);
    c.bench_function("resize_exact single-step (1200x800 -> 400x267)", |b| {
        b.iter(|| black_box(resize_exact(black_box(&source), 400, 267)));
    });
}

/// 4000x3000 down to 300x225: ratio ~13, triangle then Mitchell.
fn bench_two_step(c: &mut Criterion) {
    let source = gradient(4000, 3000, 255);
    c.bench_function("resize_exact two-step (4000x3000 -> 300x225)", |b| {
        b.iter(|| black_box(resize_exact(black_box(&source), 300, 225)));
    });
}

/// Flattening a half-transparent thumbnail over white.
fn bench_normalize_opacity(c: &mut Criterion) {
    let source = gradient(600, 400, 128);
    c.bench_function("normalize_opacity (600x400, alpha 128)", |b| {
        b.iter(|| black_box(normalize_opacity(black_box(source.clone()))));
    });
}

criterion_group!(benches, bench_single_step, bench_two_step, bench_normalize_opacity);
criterion_main!(benches);
