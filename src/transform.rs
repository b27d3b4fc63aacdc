//! File transformer.
//!
//! Wraps a [`CompiledPipeline`] and a backend, and turns each incoming
//! [`FileRecord`] into a new record holding the encoded result. When an
//! `output` format is configured the new record's extension is rewritten to
//! match.
//!
//! Each call is independent: the compiled plan is shared read-only, and every
//! file gets its own backend handle.

use crate::config::{ConfigError, Configuration};
use crate::file::{FileRecord, replace_ext};
use crate::imaging::{BackendError, ImageBackend, RustBackend};
use crate::plan::CompiledPipeline;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("imgpipe: Streams are not supported. ({})", .path.display())]
    StreamsNotSupported { path: PathBuf },
    /// Backend failures pass through without annotation.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct FileTransformer<B = RustBackend> {
    backend: B,
    pipeline: CompiledPipeline,
}

impl FileTransformer<RustBackend> {
    pub fn new(config: &Configuration) -> Result<Self, ConfigError> {
        Self::with_backend(RustBackend::new(), config)
    }
}

impl<B: ImageBackend> FileTransformer<B> {
    /// Compile `config` once for every file this transformer will see.
    pub fn with_backend(backend: B, config: &Configuration) -> Result<Self, ConfigError> {
        Ok(Self {
            backend,
            pipeline: CompiledPipeline::compile(config)?,
        })
    }

    pub fn pipeline(&self) -> &CompiledPipeline {
        &self.pipeline
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Transform one file. The input record is left untouched.
    pub fn transform(&self, file: &FileRecord) -> Result<FileRecord, TransformError> {
        let input = file
            .image_input()
            .ok_or_else(|| TransformError::StreamsNotSupported {
                path: file.path.clone(),
            })?;

        let bytes = self.pipeline.run(&self.backend, input)?;
        debug!(path = %file.path.display(), bytes = bytes.len(), "transformed");

        let mut output = file.with_buffer(bytes);
        if let Some(format) = self.pipeline.output() {
            output.path = replace_ext(&output.path, &format.name);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::Contents;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp, dims};
    use crate::imaging::{Operation, ResizeOptions};
    use crate::test_helpers::{buffer_record, encode_png};
    use serde_json::json;
    use std::path::Path;

    fn transformer(backend: MockBackend, config: serde_json::Value) -> FileTransformer<MockBackend> {
        FileTransformer::with_backend(backend, &Configuration::from_value(&config).unwrap())
            .unwrap()
    }

    #[test]
    fn output_renames_extension() {
        let t = transformer(MockBackend::new(), json!({ "resize": [100, 100], "output": "png" }));
        let mut record = buffer_record("a/b/photo.jpg", b"photo");
        record.base = "/project".into();
        record.path = "/project/a/b/photo.jpg".into();

        let out = t.transform(&record).unwrap();
        assert_eq!(out.path, Path::new("/project/a/b/photo.png"));
        assert_eq!(out.base, record.base);
        assert_eq!(out.cwd, record.cwd);
        assert!(out.buffer().is_some());
    }

    #[test]
    fn output_name_used_verbatim_for_extension() {
        let t = transformer(MockBackend::new(), json!({ "resize": [10], "output": "jpg" }));
        let out = t.transform(&buffer_record("x.png", b"x")).unwrap();
        assert_eq!(out.path, Path::new("/project/src/x.jpg"));
    }

    #[test]
    fn path_unchanged_without_output() {
        let t = transformer(MockBackend::new(), json!({ "resize": [10] }));
        let record = buffer_record("x.png", b"x");
        let out = t.transform(&record).unwrap();
        assert_eq!(out.path, record.path);
    }

    #[test]
    fn stream_contents_rejected_without_touching_backend() {
        let backend = MockBackend::new();
        let t = transformer(backend, json!({ "resize": [10] }));
        let mut record = buffer_record("x.png", b"x");
        record.contents = Contents::Stream(Box::new(std::io::empty()));

        let err = t.transform(&record).unwrap_err();
        assert!(matches!(err, TransformError::StreamsNotSupported { .. }));
        assert!(err.to_string().starts_with("imgpipe: Streams are not supported."));
        assert!(t.backend().get_operations().is_empty());
    }

    #[test]
    fn null_contents_read_from_path() {
        let t = transformer(MockBackend::new(), json!({ "resize": [10] }));
        let mut record = buffer_record("x.png", b"x");
        record.contents = Contents::Null;

        t.transform(&record).unwrap();
        assert!(matches!(
            &t.backend().get_operations()[0],
            RecordedOp::Open { source, .. } if source == "/project/src/x.png"
        ));
    }

    #[test]
    fn backend_errors_pass_through_unannotated() {
        let t = transformer(MockBackend::new().fail_on("bad"), json!({ "resize": [10] }));
        let err = t.transform(&buffer_record("x.png", b"bad")).unwrap_err();
        assert!(matches!(err, TransformError::Backend(_)));
        assert_eq!(err.to_string(), "Processing failed: corrupt image: bad");
    }

    #[test]
    fn scale_resolved_per_file() {
        let backend = MockBackend::with_metadata(vec![("a", dims(800, 600)), ("b", dims(1000, 10))]);
        let t = transformer(backend, json!({ "scale": [0.5, null] }));
        t.transform(&buffer_record("a.jpg", b"a")).unwrap();
        t.transform(&buffer_record("b.jpg", b"b")).unwrap();

        let resize = |w| Operation::Resize {
            width: Some(w),
            height: None,
            options: ResizeOptions::default(),
        };
        assert_eq!(t.backend().applied_to("a"), vec![resize(400)]);
        assert_eq!(t.backend().applied_to("b"), vec![resize(500)]);
    }

    #[test]
    fn real_backend_resizes_and_converts() {
        let config = Configuration::from_value(&json!({ "resize": [50, 40], "output": "jpeg" }))
            .unwrap();
        let t = FileTransformer::new(&config).unwrap();
        let out = t
            .transform(&buffer_record("photo.png", &encode_png(200, 100)))
            .unwrap();

        assert_eq!(out.path, Path::new("/project/src/photo.jpeg"));
        let bytes = out.buffer().unwrap();
        assert_eq!(image::guess_format(bytes).unwrap(), image::ImageFormat::Jpeg);
        let img = image::load_from_memory(bytes).unwrap();
        assert_eq!((img.width(), img.height()), (50, 40));
    }
}
