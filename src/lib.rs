//! # imgpipe
//!
//! Declarative image pipelines for build streams. A configuration names a
//! sequence of transforms (resize, extract, scale, rotate, ...) and an
//! optional output format; every file flowing through the stream comes out
//! transformed, re-encoded, and renamed to match.
//!
//! ```text
//! configuration ──compile──▶ CompiledPipeline   (once per configuration)
//!
//! FileRecord ──▶ FileTransformer ──▶ backend handle ──fold steps──▶ bytes ──▶ FileRecord
//!                                    (once per file)
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | Parses and validates the ordered configuration mapping; JSON/TOML loading; defaults merge |
//! | [`plan`] | Compiles a configuration into static and metadata-dependent steps and runs them against a backend |
//! | [`transform`] | Per-file transform: input checks, plan execution, new record with rewritten extension |
//! | [`file`] | File records and the extension rewrite rule |
//! | [`imaging`] | Typed operations, the [`ImageBackend`](imaging::ImageBackend) trait and its `image`-crate implementation |
//! | [`stream`] | Gathers records from a source tree, transforms them in parallel, writes them to a destination tree |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Order Is the Configuration
//!
//! Operations run in the order their keys appear. Configuration files are
//! parsed with order-preserving maps (`serde_json` and `toml` with
//! `preserve_order`), and nothing downstream re-sorts them.
//!
//! ## Typed Steps, Decided Once
//!
//! Each configuration key is parsed into a closed [`Operation`](imaging::Operation)
//! through an explicit registration table when the pipeline is compiled. Bad
//! arguments fail at startup, before any file is touched, and the per-file
//! path never inspects argument shapes.
//!
//! ## Scale Is Resolved Per File
//!
//! `scale` expresses width as a fraction of the source width, so it stays a
//! metadata-dependent step in the compiled plan and becomes a concrete resize
//! only after the file's metadata is probed. Plans without `scale` skip the
//! probe entirely.
//!
//! ## Lazy Backend Handles
//!
//! Applying a step to a handle only records it. Decoding, transforms and
//! encoding happen once, when the handle is materialized, and read the source
//! sequentially.

pub mod config;
pub mod file;
pub mod imaging;
pub mod output;
pub mod plan;
pub mod stream;
pub mod transform;

#[cfg(test)]
pub(crate) mod test_helpers;
