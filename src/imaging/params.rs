//! Parameter types for image operations.
//!
//! These types describe *what* to do, not *how* to do it. A compiled plan is a
//! list of [`Operation`]s; the [`backend`](super::backend) decides how each one
//! touches pixels. This separation allows swapping backends (e.g. for testing
//! with a mock) without changing plan logic.
//!
//! ## Types
//!
//! - [`Operation`]: Closed set of transforms a plan can apply, each with typed arguments.
//! - [`ResizeOptions`]: Third positional argument of `resize` (fit, kernel, enlargement, background).
//! - [`Region`]: Rectangle for `extract`.
//! - [`OutputFormat`]: Encodings a pipeline can convert to.
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.

use serde::Deserialize;
use std::fmt;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// How a resize fits the source into the requested box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    /// Fill the box, centre-cropping whatever overflows.
    #[default]
    Cover,
    /// Fit inside the box, padding the remainder with the background colour.
    Contain,
    /// Stretch to the exact box, ignoring aspect ratio.
    Fill,
    /// Fit inside the box; output may be smaller than requested.
    Inside,
    /// Cover the box without cropping; output may be larger than requested.
    Outside,
}

/// Resampling kernel used when scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kernel {
    Nearest,
    Linear,
    Cubic,
    Mitchell,
    Lanczos2,
    #[default]
    Lanczos3,
}

/// RGBA fill colour. `alpha` is 0.0–1.0.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Background {
    #[serde(default)]
    pub r: u8,
    #[serde(default)]
    pub g: u8,
    #[serde(default)]
    pub b: u8,
    #[serde(default = "opaque")]
    pub alpha: f32,
}

fn opaque() -> f32 {
    1.0
}

impl Background {
    pub fn to_rgba(self) -> [u8; 4] {
        let a = (self.alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        [self.r, self.g, self.b, a]
    }
}

impl Default for Background {
    fn default() -> Self {
        Self {
            r: 0,
            g: 0,
            b: 0,
            alpha: 1.0,
        }
    }
}

/// Options accepted as the third positional argument of `resize` and the
/// second element of `scale`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ResizeOptions {
    pub fit: Fit,
    pub kernel: Kernel,
    /// Leave the image untouched when the resize would upscale it.
    pub without_enlargement: bool,
    /// Padding colour for [`Fit::Contain`].
    pub background: Background,
}

/// Rectangle for `extract`, in pixels of the image at that point in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Region {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// A single transform in a compiled plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Resize to the given box. A missing dimension preserves aspect ratio.
    Resize {
        width: Option<u32>,
        height: Option<u32>,
        options: ResizeOptions,
    },
    Extract(Region),
    /// Rotate clockwise by an explicit angle, or auto-orient from EXIF when `None`.
    Rotate(Option<i32>),
    /// Mirror vertically.
    Flip,
    /// Mirror horizontally.
    Flop,
    Greyscale,
    Negate,
    /// Gaussian blur with the given sigma.
    Blur(f32),
    /// Unsharp mask with the given sigma.
    Sharpen(f32),
}

impl Operation {
    /// Name of the configuration key that produces this operation.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Resize { .. } => "resize",
            Operation::Extract(_) => "extract",
            Operation::Rotate(_) => "rotate",
            Operation::Flip => "flip",
            Operation::Flop => "flop",
            Operation::Greyscale => "greyscale",
            Operation::Negate => "negate",
            Operation::Blur(_) => "blur",
            Operation::Sharpen(_) => "sharpen",
        }
    }
}

fn dimension(value: Option<u32>) -> String {
    value.map_or_else(|| "auto".to_string(), |v| v.to_string())
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Resize {
                width,
                height,
                options,
            } => write!(
                f,
                "resize {}x{} ({:?}, {:?})",
                dimension(*width),
                dimension(*height),
                options.fit,
                options.kernel
            ),
            Operation::Extract(r) => write!(
                f,
                "extract {}x{} at ({}, {})",
                r.width, r.height, r.left, r.top
            ),
            Operation::Rotate(Some(angle)) => write!(f, "rotate {angle}°"),
            Operation::Rotate(None) => write!(f, "rotate (auto-orient)"),
            Operation::Blur(sigma) => write!(f, "blur σ={sigma}"),
            Operation::Sharpen(sigma) => write!(f, "sharpen σ={sigma}"),
            other => f.write_str(other.name()),
        }
    }
}

/// Encodings a pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Tiff,
    Avif,
}

impl OutputFormat {
    /// Parse a format name as written in a configuration (`"png"`, `"jpg"`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            "tiff" | "tif" => Some(Self::Tiff),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }

    /// Map a detected source format onto an encodable one.
    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::WebP => Some(Self::WebP),
            image::ImageFormat::Tiff => Some(Self::Tiff),
            image::ImageFormat::Avif => Some(Self::Avif),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Tiff => "tiff",
            Self::Avif => "avif",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
