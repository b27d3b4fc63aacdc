//! Build-stream adapter.
//!
//! Feeds file records from a source tree through a [`FileTransformer`] and
//! writes the results to a destination tree:
//!
//! ```text
//! gather(src)  →  run(transformer)  →  write(dest)
//! ```
//!
//! Files are transformed in parallel with [rayon](https://docs.rs/rayon), so
//! they may finish in any order. Progress is reported per file on an optional
//! channel as each one completes; the returned results are reassembled in
//! input order. A failing file only fails its own result.

use crate::file::{Contents, FileRecord};
use crate::imaging::{ImageBackend, supported_input_extensions};
use crate::transform::{FileTransformer, TransformError};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Source directory not found: {0}")]
    SourceNotFound(PathBuf),
    #[error("File has no buffer to write: {0}")]
    NoContents(PathBuf),
}

/// Progress event emitted once per file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileEvent {
    Transformed {
        /// 1-based position in the input.
        index: usize,
        source: PathBuf,
        output: PathBuf,
        bytes: usize,
    },
    Failed {
        index: usize,
        source: PathBuf,
        error: String,
    },
}

fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .is_some_and(|e| supported_input_extensions().contains(&e.as_str()))
}

/// Collect one record per supported image under `source`, in path order.
///
/// With `read_contents` each record carries the file's bytes; otherwise
/// contents are [`Contents::Null`] and the backend reads from the path.
pub fn gather(source: &Path, read_contents: bool) -> Result<Vec<FileRecord>, StreamError> {
    if !source.is_dir() {
        return Err(StreamError::SourceNotFound(source.to_path_buf()));
    }
    let cwd = std::env::current_dir()?;

    let mut records = Vec::new();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_supported_image(entry.path()) {
            continue;
        }
        let contents = if read_contents {
            Contents::Buffer(Arc::from(std::fs::read(entry.path())?))
        } else {
            Contents::Null
        };
        records.push(FileRecord {
            cwd: cwd.clone(),
            base: source.to_path_buf(),
            path: entry.path().to_path_buf(),
            contents,
        });
    }
    Ok(records)
}

/// Transform every record, in parallel, reporting each completion.
pub fn run<B: ImageBackend>(
    transformer: &FileTransformer<B>,
    records: Vec<FileRecord>,
    events: Option<Sender<FileEvent>>,
) -> Vec<Result<FileRecord, TransformError>> {
    records
        .into_par_iter()
        .enumerate()
        .map(|(i, record)| {
            let result = transformer.transform(&record);
            let event = match &result {
                Ok(output) => FileEvent::Transformed {
                    index: i + 1,
                    source: record.relative().to_path_buf(),
                    output: output.relative().to_path_buf(),
                    bytes: output.buffer().map_or(0, <[u8]>::len),
                },
                Err(e) => {
                    warn!(path = %record.path.display(), error = %e, "transform failed");
                    FileEvent::Failed {
                        index: i + 1,
                        source: record.relative().to_path_buf(),
                        error: e.to_string(),
                    }
                }
            };
            if let Some(tx) = &events {
                tx.send(event).ok();
            }
            result
        })
        .collect()
}

/// Write a transformed record under `dest`, keeping its path relative to `base`.
pub fn write(dest: &Path, record: &FileRecord) -> Result<PathBuf, StreamError> {
    let bytes = record
        .buffer()
        .ok_or_else(|| StreamError::NoContents(record.path.clone()))?;
    let target = dest.join(record.relative());
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, bytes)?;
    Ok(target)
}

/// Write every successfully transformed record, carrying on past write errors.
///
/// Returns the number of files written and the errors for those that were not.
/// Failed transforms are skipped.
pub fn write_all(
    dest: &Path,
    results: &[Result<FileRecord, TransformError>],
) -> (usize, Vec<StreamError>) {
    let mut written = 0;
    let mut errors = Vec::new();
    for record in results.iter().filter_map(|r| r.as_ref().ok()) {
        match write(dest, record) {
            Ok(_) => written += 1,
            Err(e) => {
                warn!(path = %record.path.display(), "write failed: {e}");
                errors.push(e);
            }
        }
    }
    (written, errors)
}
