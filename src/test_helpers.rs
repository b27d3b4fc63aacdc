//! Shared test utilities: synthetic images and file records.
//!
//! Images are generated in memory so tests never depend on fixture files.

use crate::file::{Contents, FileRecord};
use image::{DynamicImage, ImageEncoder, RgbaImage};
use std::path::Path;
use std::sync::Arc;

/// Gradient pattern so every pixel differs from its neighbours.
pub fn synthetic_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    }))
}

/// PNG-encoded synthetic image.
pub fn encode_png(width: u32, height: u32) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    synthetic_image(width, height)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Write a small valid JPEG file with the given dimensions.
pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    let img = synthetic_image(width, height).to_rgb8();
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

/// JPEG-encoded synthetic image carrying an EXIF orientation tag.
///
/// The APP1 segment holds a little-endian TIFF header with a single IFD
/// entry (tag 0x0112, SHORT) and is spliced in right after SOI.
pub fn encode_jpeg_with_orientation(width: u32, height: u32, orientation: u16) -> Vec<u8> {
    let mut jpeg = Vec::new();
    let img = synthetic_image(width, height).to_rgb8();
    image::codecs::jpeg::JpegEncoder::new(&mut jpeg)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();

    let mut exif = b"Exif\0\0".to_vec();
    exif.extend_from_slice(b"II*\0");
    exif.extend_from_slice(&8u32.to_le_bytes());
    exif.extend_from_slice(&1u16.to_le_bytes());
    exif.extend_from_slice(&0x0112u16.to_le_bytes());
    exif.extend_from_slice(&3u16.to_le_bytes());
    exif.extend_from_slice(&1u32.to_le_bytes());
    exif.extend_from_slice(&orientation.to_le_bytes());
    exif.extend_from_slice(&[0, 0]);
    exif.extend_from_slice(&0u32.to_le_bytes());

    let mut segment = vec![0xFF, 0xE1];
    segment.extend_from_slice(&((exif.len() + 2) as u16).to_be_bytes());
    segment.extend_from_slice(&exif);
    jpeg.splice(2..2, segment);
    jpeg
}

/// A buffer-backed record rooted at `/project/src`.
pub fn buffer_record(relative: &str, bytes: &[u8]) -> FileRecord {
    FileRecord {
        cwd: "/project".into(),
        base: "/project/src".into(),
        path: Path::new("/project/src").join(relative),
        contents: Contents::Buffer(Arc::from(bytes)),
    }
}
