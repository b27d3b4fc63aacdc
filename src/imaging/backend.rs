//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait mirrors a chainable image library: open a
//! handle, probe its metadata, thread it through operations, optionally
//! convert its output format, and finally materialize it into bytes.
//!
//! A handle is an accumulator. Each [`apply`](ImageBackend::apply) consumes the
//! handle and returns the next one, so a plan runs as a single left-to-right
//! fold with no branching and no reuse across files.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend) on the `image` crate.

use super::params::{Operation, OutputFormat};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode {source_name}: {message}")]
    Decode {
        source_name: String,
        message: String,
    },
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Where a handle reads its pixels from.
#[derive(Debug, Clone)]
pub enum Input {
    Buffer(Arc<[u8]>),
    Path(PathBuf),
}

impl Input {
    /// Short label for error messages and logs.
    pub fn describe(&self) -> String {
        match self {
            Input::Buffer(bytes) => format!("<buffer {} bytes>", bytes.len()),
            Input::Path(path) => path.display().to_string(),
        }
    }
}

/// Decoder options requested when a handle is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenOptions {
    /// Read the source front to back without random access. Steps never
    /// revisit earlier pixel data, so this trades nothing for lower memory.
    pub sequential_read: bool,
}

/// Intrinsic properties of a source image, available before any transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub width: u32,
    pub height: u32,
    pub format: Option<image::ImageFormat>,
}

/// Trait for image processing backends.
///
/// Every backend must implement all five operations so plan execution is
/// backend-agnostic.
pub trait ImageBackend: Sync {
    /// Transform accumulator owned by one pipeline run.
    type Handle: Send;

    /// Create a handle over the given input. No pixels need be decoded yet.
    fn open(&self, input: Input, options: OpenOptions) -> Result<Self::Handle, BackendError>;

    /// Probe the source image's metadata.
    fn metadata(&self, handle: &Self::Handle) -> Result<Metadata, BackendError>;

    /// Append an operation, returning the accumulated handle.
    fn apply(&self, handle: Self::Handle, op: &Operation) -> Result<Self::Handle, BackendError>;

    /// Set the encoding used when the handle is materialized.
    fn convert(
        &self,
        handle: Self::Handle,
        format: OutputFormat,
    ) -> Result<Self::Handle, BackendError>;

    /// Run everything accumulated and encode the result.
    fn to_buffer(&self, handle: Self::Handle) -> Result<Vec<u8>, BackendError>;
}
