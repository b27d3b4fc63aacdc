//! CLI output formatting.
//!
//! Pure functions from pipeline data to display lines; printing is left to
//! the caller so everything here is unit testable.
//!
//! ```text
//! Plan
//!     001 extract 800x600 at (0, 0)
//!     002 resize 400xauto (Inside, Lanczos3)
//!     003 scale ×0.5 of source width
//!     → webp
//!
//!     001 album/dawn.jpg → album/dawn.webp (18.2 KB)
//!     002 album/dusk.jpg FAILED: Failed to decode ...
//! ```

use crate::plan::{CompiledPipeline, Step};
use crate::stream::FileEvent;

fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// One line per compiled step, then the output conversion if any.
pub fn format_plan(pipeline: &CompiledPipeline) -> Vec<String> {
    let mut lines = vec!["Plan".to_string()];
    for (i, step) in pipeline.plan().steps().iter().enumerate() {
        let desc = match step {
            Step::Static(op) => op.to_string(),
            Step::Scale { factor, .. } => format!("scale ×{factor} of source width"),
        };
        lines.push(format!("    {:03} {}", i + 1, desc));
    }
    if let Some(output) = pipeline.output() {
        lines.push(format!("    → {}", output.format));
    }
    lines
}

pub fn format_file_event(event: &FileEvent) -> Vec<String> {
    match event {
        FileEvent::Transformed {
            index,
            source,
            output,
            bytes,
        } => {
            let target = if source == output {
                String::new()
            } else {
                format!(" → {}", output.display())
            };
            vec![format!(
                "    {:03} {}{} ({})",
                index,
                source.display(),
                target,
                format_size(*bytes)
            )]
        }
        FileEvent::Failed {
            index,
            source,
            error,
        } => vec![format!(
            "    {:03} {} FAILED: {}",
            index,
            source.display(),
            error
        )],
    }
}

pub fn format_summary(succeeded: usize, failed: usize) -> String {
    if failed == 0 {
        format!("{succeeded} files transformed")
    } else {
        format!("{succeeded} files transformed, {failed} failed")
    }
}
