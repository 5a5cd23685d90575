use std::io::Cursor;

use fast_image_resize::{self as fir, images::Image as FirImage, FilterType, ResizeAlg, ResizeOptions};
use image::codecs::jpeg::JpegEncoder;

use crate::error::{Error, Result};

/// Target size for a derivative. A zero dimension is derived from the other
/// one so the source aspect ratio is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub fn height(height: u32) -> Self {
        Self { width: 0, height }
    }

    /// Resolve against a source size.
    pub fn resolve(&self, src_w: u32, src_h: u32) -> Result<(u32, u32)> {
        if src_w == 0 || src_h == 0 {
            return Err(Error::Resize("source image has no pixels".to_string()));
        }
        let scale = |num: u32, den: u32, other: u32| -> u32 {
            ((other as u64 * num as u64 + den as u64 / 2) / den as u64).max(1) as u32
        };
        match (self.width, self.height) {
            (0, 0) => Err(Error::Resize("target width and height are both 0".to_string())),
            (0, h) => Ok((scale(src_w, src_h, h), h)),
            (w, 0) => Ok((w, scale(src_h, src_w, w))),
            (w, h) => Ok((w, h)),
        }
    }
}

/// Decodes a source image, resizes it with Lanczos3 and encodes a JPEG.
#[derive(Debug, Clone, Copy)]
pub struct DerivativeGenerator {
    quality: u8,
}

impl Default for DerivativeGenerator {
    fn default() -> Self {
        Self { quality: 85 }
    }
}

impl DerivativeGenerator {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// Produce a resized JPEG encoding of `source` in memory.
    /// EXIF orientation is applied first so the derivative is upright.
    pub fn generate(&self, source: &[u8], target: TargetSize) -> Result<Vec<u8>> {
        let (rgb, w, h) = decode_rgb(source)?;
        let orientation = read_orientation(source);
        let (rgb, w, h) = apply_orientation_rgb(&rgb, w, h, orientation);

        let (dst_w, dst_h) = target.resolve(w as u32, h as u32)?;
        let src = FirImage::from_vec_u8(w as u32, h as u32, rgb, fir::PixelType::U8x3)
            .map_err(|e| Error::Resize(e.to_string()))?;
        let mut dst = FirImage::new(dst_w, dst_h, fir::PixelType::U8x3);
        let options =
            ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Lanczos3));
        fir::Resizer::new()
            .resize(&src, &mut dst, &options)
            .map_err(|e| Error::Resize(e.to_string()))?;

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.quality).encode(
            dst.buffer(),
            dst_w,
            dst_h,
            image::ExtendedColorType::Rgb8,
        )?;
        Ok(out)
    }
}

fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8, 0xFF])
}

/// Decode to a packed RGB buffer. JPEGs go through turbojpeg when the feature
/// is enabled; everything else (and any turbojpeg failure) through `image`.
fn decode_rgb(bytes: &[u8]) -> Result<(Vec<u8>, usize, usize)> {
    #[cfg(feature = "turbojpeg")]
    if is_jpeg(bytes) {
        if let Some(decoded) = decode_jpeg_turbo(bytes) {
            return Ok(decoded);
        }
    }

    let format_hint = if is_jpeg(bytes) {
        Some(image::ImageFormat::Jpeg)
    } else {
        None
    };
    let img = match format_hint {
        Some(format) => image::load_from_memory_with_format(bytes, format)?,
        None => image::load_from_memory(bytes)?,
    };
    let rgb = img.to_rgb8();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    Ok((rgb.into_raw(), w, h))
}

#[cfg(feature = "turbojpeg")]
fn decode_jpeg_turbo(bytes: &[u8]) -> Option<(Vec<u8>, usize, usize)> {
    let mut decompressor = turbojpeg::Decompressor::new().ok()?;
    let header = decompressor.read_header(bytes).ok()?;
    let (w, h) = (header.width, header.height);

    let mut buf = vec![0u8; w * h * 3];
    let output = turbojpeg::Image {
        pixels: buf.as_mut_slice(),
        width: w,
        pitch: w * 3,
        height: h,
        format: turbojpeg::PixelFormat::RGB,
    };
    decompressor.decompress(bytes, output).ok()?;
    Some((buf, w, h))
}

/// EXIF orientation tag (1-8); 1 when missing or unreadable.
fn read_orientation(bytes: &[u8]) -> u8 {
    let read = || -> Option<u8> {
        let exif = exif::Reader::new()
            .read_from_container(&mut Cursor::new(bytes))
            .ok()?;
        let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
        field.value.get_uint(0).map(|v| v as u8)
    };
    read().unwrap_or(1)
}

/// Apply EXIF orientation to an RGB buffer, returning the corrected buffer and
/// new dimensions. Orientations 5-8 swap width and height.
fn apply_orientation_rgb(buf: &[u8], w: usize, h: usize, orientation: u8) -> (Vec<u8>, usize, usize) {
    if !(2..=8).contains(&orientation) {
        return (buf.to_vec(), w, h);
    }

    let mut out = vec![0u8; w * h * 3];
    let (new_w, new_h) = if orientation >= 5 { (h, w) } else { (w, h) };

    for y in 0..h {
        for x in 0..w {
            let src_idx = (y * w + x) * 3;
            let (dx, dy) = match orientation {
                2 => (w - 1 - x, y),
                3 => (w - 1 - x, h - 1 - y),
                4 => (x, h - 1 - y),
                5 => (y, x),
                6 => (h - 1 - y, x),
                7 => (h - 1 - y, w - 1 - x),
                _ => (y, w - 1 - x),
            };
            let dst_idx = (dy * new_w + dx) * 3;
            out[dst_idx..dst_idx + 3].copy_from_slice(&buf[src_idx..src_idx + 3]);
        }
    }
    (out, new_w, new_h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn jpeg_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(w, h, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 90])
        });
        let mut out = Vec::new();
        JpegEncoder::new(&mut out)
            .encode(img.as_raw(), w, h, image::ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    #[test]
    fn test_resolve_width_from_height() {
        assert_eq!(TargetSize::height(162).resolve(4000, 3000).unwrap(), (216, 162));
        assert_eq!(TargetSize::height(768).resolve(3000, 4000).unwrap(), (576, 768));
    }

    #[test]
    fn test_resolve_height_from_width() {
        let target = TargetSize { width: 100, height: 0 };
        assert_eq!(target.resolve(400, 200).unwrap(), (100, 50));
    }

    #[test]
    fn test_resolve_never_zero() {
        assert_eq!(TargetSize::height(10).resolve(1, 1000).unwrap(), (1, 10));
    }

    #[test]
    fn test_resolve_rejects_zero_target() {
        let target = TargetSize { width: 0, height: 0 };
        assert!(target.resolve(10, 10).is_err());
    }

    #[test]
    fn test_generate_thumbnail_keeps_aspect() {
        let source = jpeg_bytes(320, 240);
        let out = DerivativeGenerator::default()
            .generate(&source, TargetSize::height(162))
            .unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.dimensions(), (216, 162));
    }

    #[test]
    fn test_generate_from_png() {
        let img = image::RgbImage::from_fn(100, 50, |_, _| image::Rgb([10, 20, 30]));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let out = DerivativeGenerator::new(70)
            .generate(&png, TargetSize::height(20))
            .unwrap();
        assert!(is_jpeg(&out));
        assert_eq!(image::load_from_memory(&out).unwrap().dimensions(), (40, 20));
    }

    #[test]
    fn test_generate_rejects_garbage() {
        let result = DerivativeGenerator::default().generate(b"definitely not an image", TargetSize::height(10));
        assert!(result.is_err());
    }

    #[test]
    fn test_orientation_identity() {
        let buf: Vec<u8> = (0..18).collect(); // 3x2 RGB
        let (out, w, h) = apply_orientation_rgb(&buf, 3, 2, 1);
        assert_eq!((w, h), (3, 2));
        assert_eq!(out, buf);
    }

    #[test]
    fn test_orientation_rotate_90_cw() {
        // 2x1 image: pixel A then pixel B
        let buf = vec![1, 1, 1, 2, 2, 2];
        let (out, w, h) = apply_orientation_rgb(&buf, 2, 1, 6);
        // Rotated 90° CW -> 1x2: A on top, B below
        assert_eq!((w, h), (1, 2));
        assert_eq!(out, vec![1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn test_orientation_rotate_180() {
        let buf = vec![1, 1, 1, 2, 2, 2];
        let (out, w, h) = apply_orientation_rgb(&buf, 2, 1, 3);
        assert_eq!((w, h), (2, 1));
        assert_eq!(out, vec![2, 2, 2, 1, 1, 1]);
    }

    #[test]
    fn test_orientation_missing_defaults_to_normal() {
        assert_eq!(read_orientation(&jpeg_bytes(8, 8)), 1);
        assert_eq!(read_orientation(b"junk"), 1);
    }
}
