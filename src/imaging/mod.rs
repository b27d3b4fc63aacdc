//! Image processing: pure Rust, on the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Metadata probe** | `ImageReader::into_dimensions` |
//! | **Resize / extract / rotate** | `DynamicImage` transforms |
//! | **Encode** | JPEG, PNG, TIFF, WebP, AVIF encoders |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: The closed [`Operation`] set and its typed arguments
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend, Input, Metadata, OpenOptions};
pub use calculations::calculate_scaled_width;
pub use params::{
    Background, Fit, Kernel, Operation, OutputFormat, Quality, Region, ResizeOptions,
};
pub use rust_backend::{RustBackend, supported_input_extensions};
