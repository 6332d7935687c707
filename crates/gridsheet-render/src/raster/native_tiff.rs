// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TIFF backend: header parsing and full-resolution decode.
//
// Dimensions come from a direct read of the first Image File Directory, so
// probing never pulls in a decoder. Decoding (including CMYK and 16-bit
// samples) goes through the `tiff` crate when the `tiff` feature is enabled;
// without it the backend reports every file as undecodable and callers fall
// through to the placeholder.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use gridsheet_core::error::{GridsheetError, Result};

use super::bitmap::Bitmap;

/// Whether full TIFF decoding was compiled in.
pub const AVAILABLE: bool = cfg!(feature = "tiff");

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TYPE_SHORT: u16 = 3;
const TIFF_MAGIC: u16 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            Self::Little => u16::from_le_bytes(bytes),
            Self::Big => u16::from_be_bytes(bytes),
        }
    }

    fn u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Self::Little => u32::from_le_bytes(bytes),
            Self::Big => u32::from_be_bytes(bytes),
        }
    }
}

/// Image width and height read from the first IFD of a TIFF file.
///
/// Returns `None` for anything that is not a readable classic TIFF.
pub fn read_dimensions(path: &Path) -> Option<(u32, u32)> {
    let file = File::open(path).ok()?;
    parse_dimensions(&mut BufReader::new(file))
}

/// Walk the first IFD of a TIFF stream looking for ImageWidth/ImageLength.
pub fn parse_dimensions<R: Read + Seek>(reader: &mut R) -> Option<(u32, u32)> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header).ok()?;

    let order = match &header[..2] {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        _ => return None,
    };
    if order.u16([header[2], header[3]]) != TIFF_MAGIC {
        return None;
    }
    let ifd_offset = order.u32([header[4], header[5], header[6], header[7]]);

    reader.seek(SeekFrom::Start(u64::from(ifd_offset))).ok()?;
    let mut count = [0u8; 2];
    reader.read_exact(&mut count).ok()?;
    let entry_count = order.u16(count);

    let mut width = 0u32;
    let mut height = 0u32;
    let mut entry = [0u8; 12];

    for _ in 0..entry_count {
        if width > 0 && height > 0 {
            break;
        }
        reader.read_exact(&mut entry).ok()?;

        let tag = order.u16([entry[0], entry[1]]);
        let field_type = order.u16([entry[2], entry[3]]);
        let value = if field_type == TYPE_SHORT {
            u32::from(order.u16([entry[8], entry[9]]))
        } else {
            order.u32([entry[8], entry[9], entry[10], entry[11]])
        };

        match tag {
            TAG_IMAGE_WIDTH => width = value,
            TAG_IMAGE_LENGTH => height = value,
            _ => {}
        }
    }

    (width > 0 && height > 0).then_some((width, height))
}

/// Decode a TIFF at full resolution into an RGBA bitmap.
#[cfg(feature = "tiff")]
pub fn decode_rgba(path: &Path) -> Result<Bitmap> {
    use image::RgbaImage;
    use tiff::ColorType;
    use tiff::decoder::{Decoder, DecodingResult, Limits};

    use super::bitmap::AlphaType;

    let tiff_err = |err: tiff::TiffError| {
        GridsheetError::Decode(format!("{}: {err}", path.display()))
    };

    let file = File::open(path)?;
    // The pixel budget is enforced from the IFD before we get here.
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(tiff_err)?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions().map_err(tiff_err)?;
    let color = decoder.colortype().map_err(tiff_err)?;

    let samples: Vec<u8> = match decoder.read_image().map_err(tiff_err)? {
        DecodingResult::U8(buf) => buf,
        DecodingResult::U16(buf) => buf.into_iter().map(|v| (v >> 8) as u8).collect(),
        _ => {
            return Err(GridsheetError::Decode(format!(
                "{}: unsupported TIFF sample format",
                path.display()
            )));
        }
    };

    let (rgba, alpha) = match color {
        ColorType::Gray(8 | 16) => (expand(&samples, 1, |s| [s[0], s[0], s[0], 255]), AlphaType::Opaque),
        ColorType::GrayA(8 | 16) => (
            expand(&samples, 2, |s| [s[0], s[0], s[0], s[1]]),
            AlphaType::Unpremultiplied,
        ),
        ColorType::RGB(8 | 16) => (expand(&samples, 3, |s| [s[0], s[1], s[2], 255]), AlphaType::Opaque),
        ColorType::RGBA(8 | 16) => (samples, AlphaType::Unpremultiplied),
        ColorType::CMYK(8 | 16) => (
            expand(&samples, 4, |s| cmyk_to_rgba(s[0], s[1], s[2], s[3])),
            AlphaType::Opaque,
        ),
        other => {
            return Err(GridsheetError::Decode(format!(
                "{}: unsupported TIFF colour type {other:?}",
                path.display()
            )));
        }
    };

    let pixels = RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
        GridsheetError::Decode(format!(
            "{}: decoded buffer does not match {width}x{height}",
            path.display()
        ))
    })?;
    Ok(Bitmap::new(pixels, alpha))
}

#[cfg(not(feature = "tiff"))]
pub fn decode_rgba(path: &Path) -> Result<Bitmap> {
    Err(GridsheetError::Decode(format!(
        "{}: TIFF backend not available in this build",
        path.display()
    )))
}

#[cfg(feature = "tiff")]
fn expand<F>(samples: &[u8], channels: usize, convert: F) -> Vec<u8>
where
    F: Fn(&[u8]) -> [u8; 4],
{
    let mut out = Vec::with_capacity(samples.len() / channels * 4);
    for chunk in samples.chunks_exact(channels) {
        out.extend_from_slice(&convert(chunk));
    }
    out
}

/// Naive subtractive conversion; no colour profile is applied.
pub fn cmyk_to_rgba(c: u8, m: u8, y: u8, k: u8) -> [u8; 4] {
    let white = 255 - u32::from(k);
    let channel = |v: u8| ((255 - u32::from(v)) * white / 255) as u8;
    [channel(c), channel(m), channel(y), 255]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Minimal classic TIFF header plus one IFD with the given entries
    /// `(tag, type, value)`.
    fn tiff_header(order: ByteOrder, entries: &[(u16, u16, u32)]) -> Vec<u8> {
        let u16b = |v: u16| match order {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        };
        let u32b = |v: u32| match order {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        };

        let mut out = Vec::new();
        out.extend_from_slice(if order == ByteOrder::Little { b"II" } else { b"MM" });
        out.extend_from_slice(&u16b(42));
        out.extend_from_slice(&u32b(8));
        out.extend_from_slice(&u16b(entries.len() as u16));
        for &(tag, field_type, value) in entries {
            out.extend_from_slice(&u16b(tag));
            out.extend_from_slice(&u16b(field_type));
            out.extend_from_slice(&u32b(1));
            if field_type == TYPE_SHORT {
                out.extend_from_slice(&u16b(value as u16));
                out.extend_from_slice(&[0, 0]);
            } else {
                out.extend_from_slice(&u32b(value));
            }
        }
        out.extend_from_slice(&u32b(0));
        out
    }

    #[test]
    fn parses_little_endian_short_tags() {
        let bytes = tiff_header(
            ByteOrder::Little,
            &[(254, 4, 0), (256, 3, 640), (257, 3, 480)],
        );
        assert_eq!(parse_dimensions(&mut Cursor::new(bytes)), Some((640, 480)));
    }

    #[test]
    fn parses_big_endian_long_tags() {
        let bytes = tiff_header(ByteOrder::Big, &[(256, 4, 70_000), (257, 4, 3_000)]);
        assert_eq!(
            parse_dimensions(&mut Cursor::new(bytes)),
            Some((70_000, 3_000))
        );
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        let mut bytes = tiff_header(ByteOrder::Little, &[(256, 3, 10), (257, 3, 10)]);
        bytes[2] = 43;
        assert_eq!(parse_dimensions(&mut Cursor::new(bytes)), None);

        let bytes = tiff_header(ByteOrder::Little, &[(256, 3, 10), (257, 3, 10)]);
        assert_eq!(parse_dimensions(&mut Cursor::new(&bytes[..14])), None);

        assert_eq!(parse_dimensions(&mut Cursor::new(b"\x89PNG\r\n\x1a\n")), None);
    }

    #[test]
    fn missing_height_is_none() {
        let bytes = tiff_header(ByteOrder::Little, &[(256, 3, 10)]);
        assert_eq!(parse_dimensions(&mut Cursor::new(bytes)), None);
    }

    #[test]
    fn cmyk_conversion_extremes() {
        assert_eq!(cmyk_to_rgba(0, 0, 0, 0), [255, 255, 255, 255]);
        assert_eq!(cmyk_to_rgba(0, 0, 0, 255), [0, 0, 0, 255]);
        assert_eq!(cmyk_to_rgba(255, 0, 0, 0), [0, 255, 255, 255]);
    }

    #[cfg(feature = "tiff")]
    #[test]
    fn decodes_cmyk_file_from_disk() {
        use tiff::encoder::{TiffEncoder, colortype};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmyk.tif");
        let (w, h) = (6u32, 4u32);
        // Pure cyan everywhere.
        let data: Vec<u8> = (0..w * h).flat_map(|_| [255u8, 0, 0, 0]).collect();
        {
            let file = File::create(&path).unwrap();
            let mut encoder = TiffEncoder::new(file).unwrap();
            encoder
                .write_image::<colortype::CMYK8>(w, h, &data)
                .unwrap();
        }

        assert_eq!(read_dimensions(&path), Some((w, h)));
        let bmp = decode_rgba(&path).unwrap();
        assert_eq!(bmp.dimensions(), (w, h));
        assert!(bmp.is_opaque());
        assert_eq!(bmp.pixels().get_pixel(0, 0).0, [0, 255, 255, 255]);
    }
}
