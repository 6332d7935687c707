// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Owned RGBA pixel buffer handed from image preparation to the compositor.

use image::{DynamicImage, Rgba, RgbImage, RgbaImage};

/// Placeholder colour for images that could not be decoded (light grey).
pub const PLACEHOLDER_RGBA: Rgba<u8> = Rgba([211, 211, 211, 255]);

/// How the alpha channel of a [`Bitmap`] is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaType {
    /// Every pixel is fully opaque; the alpha bytes carry no information.
    Opaque,
    /// Straight (non-premultiplied) alpha that may contain transparency.
    Unpremultiplied,
}

/// An RGBA8 bitmap plus its alpha interpretation.
///
/// Always stored as RGBA so resizing and compositing share one pixel
/// layout. Bitmaps reaching the compositor are [`AlphaType::Opaque`].
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    pixels: RgbaImage,
    alpha: AlphaType,
}

impl Bitmap {
    pub fn new(pixels: RgbaImage, alpha: AlphaType) -> Self {
        Self { pixels, alpha }
    }

    /// Take ownership of a decoded image, converting to RGBA8.
    ///
    /// Sources without an alpha channel are marked opaque up front so the
    /// opacity scan is skipped for them.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        let alpha = if image.color().has_alpha() {
            AlphaType::Unpremultiplied
        } else {
            AlphaType::Opaque
        };
        Self {
            pixels: image.into_rgba8(),
            alpha,
        }
    }

    /// Uniform light-grey bitmap of exactly `width` x `height`.
    pub fn placeholder(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width.max(1), height.max(1), PLACEHOLDER_RGBA),
            alpha: AlphaType::Opaque,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn alpha_type(&self) -> AlphaType {
        self.alpha
    }

    pub fn is_opaque(&self) -> bool {
        self.alpha == AlphaType::Opaque
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }

    /// Drop the alpha channel. Only meaningful for opaque bitmaps; callers
    /// run opacity normalization first.
    pub fn to_rgb8(&self) -> RgbImage {
        let (width, height) = self.pixels.dimensions();
        let mut raw = Vec::with_capacity(width as usize * height as usize * 3);
        for pixel in self.pixels.pixels() {
            raw.extend_from_slice(&pixel.0[..3]);
        }
        // Length is exactly width * height * 3 by construction.
        RgbImage::from_raw(width, height, raw).unwrap_or_else(|| RgbImage::new(width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{LumaA, Rgb};

    #[test]
    fn placeholder_has_exact_size_and_is_opaque() {
        let bmp = Bitmap::placeholder(37, 12);
        assert_eq!(bmp.dimensions(), (37, 12));
        assert!(bmp.is_opaque());
        assert!(bmp.pixels().pixels().all(|p| *p == PLACEHOLDER_RGBA));
    }

    #[test]
    fn from_dynamic_tracks_alpha_channel() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));
        assert_eq!(Bitmap::from_dynamic(rgb).alpha_type(), AlphaType::Opaque);

        let gray_alpha = DynamicImage::ImageLumaA8(image::GrayAlphaImage::from_pixel(
            2,
            2,
            LumaA([9, 200]),
        ));
        let bmp = Bitmap::from_dynamic(gray_alpha);
        assert_eq!(bmp.alpha_type(), AlphaType::Unpremultiplied);
        assert_eq!(*bmp.pixels().get_pixel(0, 0), Rgba([9, 9, 9, 200]));
    }

    #[test]
    fn to_rgb8_drops_alpha() {
        let bmp = Bitmap::new(
            RgbaImage::from_pixel(3, 1, Rgba([10, 20, 30, 255])),
            AlphaType::Opaque,
        );
        let rgb = bmp.to_rgb8();
        assert_eq!(rgb.dimensions(), (3, 1));
        assert_eq!(*rgb.get_pixel(2, 0), Rgb([10, 20, 30]));
    }
}
