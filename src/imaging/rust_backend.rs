//! Pure Rust image processing backend.
//!
//! Handles are lazy: `open`, `apply` and `convert` only record what to do.
//! Decoding, every transform, and encoding happen in
//! [`to_buffer`](ImageBackend::to_buffer), so a failure anywhere in the chain
//! surfaces at materialization, once per file.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::ImageReader` (pure Rust decoders) |
//! | Metadata probe | `ImageReader::into_dimensions` (header only) |
//! | Resize | `DynamicImage::resize_exact` + centre crop / `imageops::overlay` pad |
//! | Kernels | `nearest`/`linear` exact; `cubic` and `mitchell` → `CatmullRom`; `lanczos2` and `lanczos3` → `Lanczos3` |
//! | Extract | `DynamicImage::crop_imm` |
//! | Rotate | `rotate90/180/270`, EXIF via `apply_orientation` |
//! | Blur / Sharpen | `DynamicImage::blur` / `DynamicImage::unsharpen` |
//! | Encode | JPEG, PNG, TIFF, WebP (lossless), AVIF (rav1e, speed 6) |
//!
//! Decoding and every resize are bounded by [`image::Limits`]: a requested
//! size whose pixel buffer would exceed `max_alloc` fails that image with
//! [`BackendError::ProcessingFailed`] instead of attempting the allocation.

use super::backend::{BackendError, ImageBackend, Input, Metadata, OpenOptions};
use super::calculations::{centre_offset, plan_resize};
use super::params::{Fit, Kernel, Operation, OutputFormat, Quality, Region, ResizeOptions};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, Limits, Rgba, RgbaImage};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Seek};
use std::sync::{Arc, LazyLock};

/// Extensions whose decoders are compiled in.
///
/// AVIF is deliberately excluded: the `image` crate's `"avif"` feature only
/// enables the **encoder** (rav1e), so AVIF is an output-only format here.
const INPUT_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    INPUT_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend {
    quality: Quality,
    limits: Limits,
}

impl RustBackend {
    pub fn new() -> Self {
        Self::with_quality(Quality::default())
    }

    pub fn with_quality(quality: Quality) -> Self {
        Self {
            quality,
            limits: Limits::default(),
        }
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Pending work for one image: where to read it, what to do, how to encode.
#[derive(Debug)]
pub struct RustHandle {
    input: Input,
    options: OpenOptions,
    ops: Vec<Operation>,
    format: Option<OutputFormat>,
}

trait SeekRead: BufRead + Seek + Send {}
impl<T: BufRead + Seek + Send> SeekRead for T {}

/// Build a reader over the input with its format sniffed from magic bytes.
///
/// Sequential reads stream the file through a `BufReader`; otherwise the
/// whole file is loaded up front.
fn open_reader(
    input: &Input,
    options: OpenOptions,
    limits: &Limits,
) -> Result<ImageReader<Box<dyn SeekRead>>, BackendError> {
    let source: Box<dyn SeekRead> = match input {
        Input::Buffer(bytes) => Box::new(Cursor::new(Arc::clone(bytes))),
        Input::Path(path) if options.sequential_read => {
            Box::new(BufReader::new(File::open(path)?))
        }
        Input::Path(path) => Box::new(Cursor::new(std::fs::read(path)?)),
    };
    let mut reader = ImageReader::new(source);
    reader.limits(limits.clone());
    if let Input::Path(path) = input {
        if let Ok(format) = ImageFormat::from_path(path) {
            reader.set_format(format);
        }
    }
    Ok(reader.with_guessed_format()?)
}

fn decode_error(input: &Input, err: image::ImageError) -> BackendError {
    BackendError::Decode {
        source_name: input.describe(),
        message: err.to_string(),
    }
}

fn filter_type(kernel: Kernel) -> FilterType {
    // Closest filters the image crate offers
    match kernel {
        Kernel::Nearest => FilterType::Nearest,
        Kernel::Linear => FilterType::Triangle,
        Kernel::Cubic | Kernel::Mitchell => FilterType::CatmullRom,
        Kernel::Lanczos2 | Kernel::Lanczos3 => FilterType::Lanczos3,
    }
}

/// Refuse a `width`x`height` buffer the limits would not let a decoder allocate.
fn check_allocation(
    limits: &Limits,
    (width, height): (u32, u32),
    bytes_per_pixel: u8,
) -> Result<(), BackendError> {
    let bytes = u64::from(width)
        .saturating_mul(u64::from(height))
        .saturating_mul(u64::from(bytes_per_pixel));
    let within = limits.check_dimensions(width, height).is_ok()
        && limits.max_alloc.is_none_or(|max| bytes <= max);
    if within {
        Ok(())
    } else {
        Err(BackendError::ProcessingFailed(format!(
            "resize to {width}x{height} needs {bytes} bytes, over the allocation limit"
        )))
    }
}

fn resize(
    img: DynamicImage,
    width: Option<u32>,
    height: Option<u32>,
    options: &ResizeOptions,
    limits: &Limits,
) -> Result<DynamicImage, BackendError> {
    let source = (img.width(), img.height());
    let Some(geometry) = plan_resize(
        source,
        width,
        height,
        options.fit,
        options.without_enlargement,
    ) else {
        return Ok(img);
    };

    check_allocation(limits, geometry.scaled, img.color().bytes_per_pixel())?;
    if options.fit == Fit::Contain {
        check_allocation(limits, geometry.canvas, 4)?;
    }

    let scaled = if geometry.scaled == source {
        img
    } else {
        img.resize_exact(
            geometry.scaled.0,
            geometry.scaled.1,
            filter_type(options.kernel),
        )
    };

    if geometry.scaled == geometry.canvas {
        return Ok(scaled);
    }

    Ok(match options.fit {
        Fit::Cover => {
            let (x, y) = centre_offset(geometry.scaled, geometry.canvas);
            scaled.crop_imm(x, y, geometry.canvas.0, geometry.canvas.1)
        }
        Fit::Contain => {
            let mut canvas = RgbaImage::from_pixel(
                geometry.canvas.0,
                geometry.canvas.1,
                Rgba(options.background.to_rgba()),
            );
            let (x, y) = centre_offset(geometry.canvas, geometry.scaled);
            image::imageops::overlay(&mut canvas, &scaled.to_rgba8(), x as i64, y as i64);
            DynamicImage::ImageRgba8(canvas)
        }
        _ => scaled,
    })
}

fn extract(img: DynamicImage, region: &Region) -> Result<DynamicImage, BackendError> {
    let right = region.left as u64 + region.width as u64;
    let bottom = region.top as u64 + region.height as u64;
    if region.width == 0
        || region.height == 0
        || right > img.width() as u64
        || bottom > img.height() as u64
    {
        return Err(BackendError::ProcessingFailed(format!(
            "extract area {}x{}+{}+{} is outside the {}x{} image",
            region.width,
            region.height,
            region.left,
            region.top,
            img.width(),
            img.height()
        )));
    }
    Ok(img.crop_imm(region.left, region.top, region.width, region.height))
}

fn rotate(
    mut img: DynamicImage,
    angle: Option<i32>,
    orientation: Orientation,
) -> Result<DynamicImage, BackendError> {
    let Some(angle) = angle else {
        img.apply_orientation(orientation);
        return Ok(img);
    };
    match angle.rem_euclid(360) {
        0 => Ok(img),
        90 => Ok(img.rotate90()),
        180 => Ok(img.rotate180()),
        270 => Ok(img.rotate270()),
        _ => Err(BackendError::ProcessingFailed(format!(
            "Unsupported rotation angle {angle}: only multiples of 90 are supported"
        ))),
    }
}

fn apply_operation(
    img: DynamicImage,
    op: &Operation,
    orientation: Orientation,
    limits: &Limits,
) -> Result<DynamicImage, BackendError> {
    Ok(match op {
        Operation::Resize {
            width,
            height,
            options,
        } => resize(img, *width, *height, options, limits)?,
        Operation::Extract(region) => extract(img, region)?,
        Operation::Rotate(angle) => rotate(img, *angle, orientation)?,
        Operation::Flip => img.flipv(),
        Operation::Flop => img.fliph(),
        Operation::Greyscale => img.grayscale(),
        Operation::Negate => {
            let mut img = img;
            img.invert();
            img
        }
        Operation::Blur(sigma) => img.blur(*sigma),
        Operation::Sharpen(sigma) => img.unsharpen(*sigma, 0),
    })
}

/// Encode into an in-memory buffer.
fn encode(
    img: &DynamicImage,
    format: OutputFormat,
    quality: Quality,
) -> Result<Vec<u8>, BackendError> {
    let mut buf = Cursor::new(Vec::new());
    let result = match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel and no 16-bit mode
            let img = match img {
                DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => Cow::Borrowed(img),
                other => Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8())),
            };
            img.write_with_encoder(JpegEncoder::new_with_quality(
                &mut buf,
                quality.value() as u8,
            ))
        }
        OutputFormat::Png => img.write_to(&mut buf, ImageFormat::Png),
        OutputFormat::Tiff => img.write_to(&mut buf, ImageFormat::Tiff),
        OutputFormat::WebP => DynamicImage::ImageRgba8(img.to_rgba8())
            .write_with_encoder(WebPEncoder::new_lossless(&mut buf)),
        OutputFormat::Avif => {
            DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(
                AvifEncoder::new_with_speed_quality(&mut buf, 6, quality.value() as u8),
            )
        }
    };
    result.map_err(|e| BackendError::Encode(format!("{format}: {e}")))?;
    Ok(buf.into_inner())
}

impl ImageBackend for RustBackend {
    type Handle = RustHandle;

    fn open(&self, input: Input, options: OpenOptions) -> Result<RustHandle, BackendError> {
        Ok(RustHandle {
            input,
            options,
            ops: Vec::new(),
            format: None,
        })
    }

    fn metadata(&self, handle: &RustHandle) -> Result<Metadata, BackendError> {
        let reader = open_reader(&handle.input, handle.options, &self.limits)?;
        let format = reader.format();
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| decode_error(&handle.input, e))?;
        Ok(Metadata {
            width,
            height,
            format,
        })
    }

    fn apply(&self, mut handle: RustHandle, op: &Operation) -> Result<RustHandle, BackendError> {
        handle.ops.push(op.clone());
        Ok(handle)
    }

    fn convert(
        &self,
        mut handle: RustHandle,
        format: OutputFormat,
    ) -> Result<RustHandle, BackendError> {
        handle.format = Some(format);
        Ok(handle)
    }

    fn to_buffer(&self, handle: RustHandle) -> Result<Vec<u8>, BackendError> {
        let reader = open_reader(&handle.input, handle.options, &self.limits)?;
        let source_format = reader.format();
        let mut decoder = reader
            .into_decoder()
            .map_err(|e| decode_error(&handle.input, e))?;
        let orientation = decoder
            .orientation()
            .unwrap_or(Orientation::NoTransforms);
        let img =
            DynamicImage::from_decoder(decoder).map_err(|e| decode_error(&handle.input, e))?;

        let img = handle
            .ops
            .iter()
            .try_fold(img, |img, op| {
                apply_operation(img, op, orientation, &self.limits)
            })?;

        let format = handle
            .format
            .or_else(|| source_format.and_then(OutputFormat::from_image_format))
            .ok_or_else(|| {
                BackendError::Encode(format!(
                    "cannot infer an output format for {}",
                    handle.input.describe()
                ))
            })?;
        encode(&img, format, self.quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::params::Background;
    use crate::test_helpers::{encode_jpeg_with_orientation, encode_png, write_jpeg};

    fn buffer_input(bytes: Vec<u8>) -> Input {
        Input::Buffer(Arc::from(bytes))
    }

    fn run(input: Input, ops: &[Operation], format: Option<OutputFormat>) -> Vec<u8> {
        try_run(input, ops, format).unwrap()
    }

    fn try_run(
        input: Input,
        ops: &[Operation],
        format: Option<OutputFormat>,
    ) -> Result<Vec<u8>, BackendError> {
        let backend = RustBackend::new();
        let mut handle = backend.open(input, OpenOptions::default())?;
        for op in ops {
            handle = backend.apply(handle, op)?;
        }
        if let Some(format) = format {
            handle = backend.convert(handle, format)?;
        }
        backend.to_buffer(handle)
    }

    fn decoded_dims(bytes: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory(bytes).unwrap();
        (img.width(), img.height())
    }

    fn resize_op(width: Option<u32>, height: Option<u32>, fit: Fit) -> Operation {
        Operation::Resize {
            width,
            height,
            options: ResizeOptions {
                fit,
                ..ResizeOptions::default()
            },
        }
    }

    #[test]
    fn supported_extensions_match_decodable_formats() {
        let exts = supported_input_extensions();
        for expected in &["jpg", "jpeg", "png", "tif", "tiff", "webp"] {
            assert!(
                exts.contains(expected),
                "expected {expected} in supported extensions"
            );
        }
        assert!(!exts.contains(&"avif"));
    }

    #[test]
    fn metadata_from_buffer() {
        let backend = RustBackend::new();
        let handle = backend
            .open(buffer_input(encode_png(200, 150)), OpenOptions::default())
            .unwrap();
        let meta = backend.metadata(&handle).unwrap();
        assert_eq!((meta.width, meta.height), (200, 150));
        assert_eq!(meta.format, Some(ImageFormat::Png));
    }

    #[test]
    fn metadata_from_path_both_read_modes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("photo.jpg");
        write_jpeg(&path, 120, 80);

        let backend = RustBackend::new();
        for sequential_read in [true, false] {
            let handle = backend
                .open(Input::Path(path.clone()), OpenOptions { sequential_read })
                .unwrap();
            let meta = backend.metadata(&handle).unwrap();
            assert_eq!((meta.width, meta.height), (120, 80));
            assert_eq!(meta.format, Some(ImageFormat::Jpeg));
        }
    }

    #[test]
    fn metadata_missing_file_is_io_error() {
        let backend = RustBackend::new();
        let handle = backend
            .open(
                Input::Path("/nonexistent/image.jpg".into()),
                OpenOptions {
                    sequential_read: true,
                },
            )
            .unwrap();
        assert!(matches!(
            backend.metadata(&handle),
            Err(BackendError::Io(_))
        ));
    }

    #[test]
    fn corrupt_buffer_fails_to_decode() {
        let result = try_run(buffer_input(b"not an image".to_vec()), &[], None);
        assert!(result.is_err());
    }

    #[test]
    fn resize_cover_produces_exact_box() {
        let out = run(
            buffer_input(encode_png(400, 300)),
            &[resize_op(Some(100), Some(100), Fit::Cover)],
            None,
        );
        assert_eq!(decoded_dims(&out), (100, 100));
    }

    #[test]
    fn resize_width_only_keeps_aspect() {
        let out = run(
            buffer_input(encode_png(400, 300)),
            &[resize_op(Some(200), None, Fit::Cover)],
            None,
        );
        assert_eq!(decoded_dims(&out), (200, 150));
    }

    #[test]
    fn resize_contain_pads_with_background() {
        let op = Operation::Resize {
            width: Some(100),
            height: Some(100),
            options: ResizeOptions {
                fit: Fit::Contain,
                background: Background {
                    r: 255,
                    g: 0,
                    b: 0,
                    alpha: 1.0,
                },
                ..ResizeOptions::default()
            },
        };
        let out = run(buffer_input(encode_png(400, 200)), &[op], None);
        let img = image::load_from_memory(&out).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (100, 100));
        // Top row is padding
        assert_eq!(img.get_pixel(50, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn resize_inside_may_be_smaller_than_box() {
        let out = run(
            buffer_input(encode_png(400, 200)),
            &[resize_op(Some(100), Some(100), Fit::Inside)],
            None,
        );
        assert_eq!(decoded_dims(&out), (100, 50));
    }

    #[test]
    fn extract_crops_region() {
        let out = run(
            buffer_input(encode_png(100, 100)),
            &[Operation::Extract(Region {
                left: 10,
                top: 20,
                width: 30,
                height: 40,
            })],
            None,
        );
        assert_eq!(decoded_dims(&out), (30, 40));
    }

    #[test]
    fn extract_outside_image_fails() {
        let result = try_run(
            buffer_input(encode_png(50, 50)),
            &[Operation::Extract(Region {
                left: 40,
                top: 0,
                width: 20,
                height: 10,
            })],
            None,
        );
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }

    #[test]
    fn extract_then_rotate_applies_in_order() {
        // 60x20 crop, then rotated → 20x60
        let out = run(
            buffer_input(encode_png(100, 100)),
            &[
                Operation::Extract(Region {
                    left: 0,
                    top: 0,
                    width: 60,
                    height: 20,
                }),
                Operation::Rotate(Some(90)),
            ],
            None,
        );
        assert_eq!(decoded_dims(&out), (20, 60));
    }

    #[test]
    fn rotate_negative_right_angle() {
        let out = run(
            buffer_input(encode_png(40, 10)),
            &[Operation::Rotate(Some(-90))],
            None,
        );
        assert_eq!(decoded_dims(&out), (10, 40));
    }

    #[test]
    fn rotate_arbitrary_angle_fails() {
        let result = try_run(
            buffer_input(encode_png(40, 10)),
            &[Operation::Rotate(Some(45))],
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn auto_orient_without_exif_is_noop() {
        let out = run(
            buffer_input(encode_png(40, 10)),
            &[Operation::Rotate(None)],
            None,
        );
        assert_eq!(decoded_dims(&out), (40, 10));
    }

    #[test]
    fn auto_orient_applies_exif_rotation() {
        // Orientation 6: stored landscape, displayed rotated 90° clockwise
        let jpeg = encode_jpeg_with_orientation(40, 10, 6);
        let out = run(buffer_input(jpeg), &[Operation::Rotate(None)], None);
        assert_eq!(decoded_dims(&out), (10, 40));
    }

    #[test]
    fn explicit_angle_ignores_exif_orientation() {
        let jpeg = encode_jpeg_with_orientation(40, 10, 6);
        let out = run(buffer_input(jpeg), &[Operation::Rotate(Some(180))], None);
        assert_eq!(decoded_dims(&out), (40, 10));
    }

    #[test]
    fn oversized_resize_fails_without_allocating() {
        let op = Operation::Resize {
            width: Some(u32::MAX),
            height: Some(u32::MAX),
            options: ResizeOptions {
                fit: Fit::Fill,
                kernel: Kernel::Nearest,
                ..ResizeOptions::default()
            },
        };
        let result = try_run(buffer_input(encode_png(4, 4)), &[op], None);
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }

    #[test]
    fn oversized_contain_canvas_fails() {
        // Scaled image fits; the padded canvas does not
        let op = Operation::Resize {
            width: Some(1),
            height: Some(u32::MAX),
            options: ResizeOptions {
                fit: Fit::Contain,
                ..ResizeOptions::default()
            },
        };
        let result = try_run(buffer_input(encode_png(4, 4)), &[op], None);
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }

    #[test]
    fn allocation_check_respects_limits() {
        let limits = Limits::default();
        assert!(check_allocation(&limits, (1000, 1000), 4).is_ok());
        assert!(check_allocation(&limits, (u32::MAX, u32::MAX), 4).is_err());
        assert!(check_allocation(&Limits::no_limits(), (100_000, 100_000), 4).is_ok());
    }

    #[test]
    fn kernels_map_to_closest_filters() {
        assert_eq!(filter_type(Kernel::Mitchell), FilterType::CatmullRom);
        assert_eq!(filter_type(Kernel::Lanczos2), FilterType::Lanczos3);
        assert_eq!(filter_type(Kernel::Linear), FilterType::Triangle);
    }

    #[test]
    fn lower_quality_jpeg_is_smaller() {
        let encode_at = |q| {
            let backend = RustBackend::with_quality(Quality::new(q));
            let handle = backend
                .open(buffer_input(encode_png(64, 64)), OpenOptions::default())
                .unwrap();
            let handle = backend.convert(handle, OutputFormat::Jpeg).unwrap();
            backend.to_buffer(handle).unwrap().len()
        };
        assert!(encode_at(10) < encode_at(95));
    }

    #[test]
    fn default_output_keeps_source_format() {
        let out = run(buffer_input(encode_png(20, 20)), &[], None);
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn convert_to_jpeg_drops_alpha() {
        let out = run(
            buffer_input(encode_png(20, 20)),
            &[Operation::Greyscale],
            Some(OutputFormat::Jpeg),
        );
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Jpeg);
        assert_eq!(decoded_dims(&out), (20, 20));
    }

    #[test]
    fn convert_to_webp_and_tiff() {
        for (format, expected) in [
            (OutputFormat::WebP, ImageFormat::WebP),
            (OutputFormat::Tiff, ImageFormat::Tiff),
        ] {
            let out = run(buffer_input(encode_png(16, 16)), &[], Some(format));
            assert_eq!(image::guess_format(&out).unwrap(), expected);
        }
    }

    #[test]
    fn convert_to_avif_produces_bytes() {
        let out = run(
            buffer_input(encode_png(16, 16)),
            &[],
            Some(OutputFormat::Avif),
        );
        assert!(!out.is_empty());
    }

    #[test]
    fn filters_and_colour_ops_keep_dimensions() {
        let out = run(
            buffer_input(encode_png(32, 24)),
            &[
                Operation::Flip,
                Operation::Flop,
                Operation::Negate,
                Operation::Blur(1.5),
                Operation::Sharpen(0.5),
            ],
            None,
        );
        assert_eq!(decoded_dims(&out), (32, 24));
    }

    #[test]
    fn negate_inverts_pixels() {
        let out = run(buffer_input(encode_png(4, 4)), &[Operation::Negate], None);
        let original = image::load_from_memory(&encode_png(4, 4)).unwrap().to_rgb8();
        let negated = image::load_from_memory(&out).unwrap().to_rgb8();
        let before = original.get_pixel(1, 2).0;
        let after = negated.get_pixel(1, 2).0;
        assert_eq!(after, [255 - before[0], 255 - before[1], 255 - before[2]]);
    }
}
