//! File records flowing through a build stream.
//!
//! A [`FileRecord`] carries `cwd`, `base` and `path` plus its contents, which
//! are either a concrete buffer, absent (read from `path` instead), or a
//! stream. Records are never mutated in place: a transform produces a new
//! record.

use crate::imaging::Input;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Payload of a file record.
pub enum Contents {
    /// No payload; consumers read `path` themselves.
    Null,
    Buffer(Arc<[u8]>),
    Stream(Box<dyn Read + Send>),
}

impl fmt::Debug for Contents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Contents::Null => f.write_str("Null"),
            Contents::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
            Contents::Stream(_) => f.write_str("Stream"),
        }
    }
}

#[derive(Debug)]
pub struct FileRecord {
    pub cwd: PathBuf,
    pub base: PathBuf,
    pub path: PathBuf,
    pub contents: Contents,
}

impl FileRecord {
    pub fn is_null(&self) -> bool {
        matches!(self.contents, Contents::Null)
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.contents, Contents::Stream(_))
    }

    pub fn buffer(&self) -> Option<&[u8]> {
        match &self.contents {
            Contents::Buffer(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Path relative to `base`, or the full path when it lies outside `base`.
    pub fn relative(&self) -> &Path {
        self.path.strip_prefix(&self.base).unwrap_or(&self.path)
    }

    /// Where an image backend should read this record from.
    ///
    /// Buffers are shared, absent contents fall back to `path`, and streams
    /// have no image input.
    pub fn image_input(&self) -> Option<Input> {
        match &self.contents {
            Contents::Buffer(bytes) => Some(Input::Buffer(Arc::clone(bytes))),
            Contents::Null => Some(Input::Path(self.path.clone())),
            Contents::Stream(_) => None,
        }
    }

    /// New record sharing `cwd`, `base` and `path`, holding `bytes`.
    pub fn with_buffer(&self, bytes: Vec<u8>) -> FileRecord {
        FileRecord {
            cwd: self.cwd.clone(),
            base: self.base.clone(),
            path: self.path.clone(),
            contents: Contents::Buffer(Arc::from(bytes)),
        }
    }
}

/// Replace the extension of `path`, keeping its directory and file stem.
///
/// `ext` is given without the leading dot. A path with no extension gains one.
pub fn replace_ext(path: &Path, ext: &str) -> PathBuf {
    path.with_extension(ext)
}
