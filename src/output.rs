//! CLI output formatting for pipeline runs.
//!
//! # Output Format
//!
//! One header per stage, then one indented line per file, with paths
//! relative to the output directory:
//!
//! ```text
//! ==> putzfish exports/site → exports/optimiert
//! ==> Stage 1/6: copy (12 files)
//!     index.html
//!     support/style.css
//! ==> Stage 2/6: minify-styles (1 file)
//!     support/style.css → support/style.min.css (1204 B → 811 B)
//! ==> Stage 3/6: prune-styles (1 file)
//!     support/global_style.css: 41 selectors kept, 212 removed
//!     support/global_style.css → support/global_style.min.css (38110 B → 6120 B)
//! ...
//! ==> Stage 5/6: rewrite-references (3 files)
//!     index.html: references rewritten
//!     impressum.html: skipped (no references to rewrite)
//! ==> Stage 6/6: compress-images (2 files)
//!     media/photo.jpg (52311 B → 40110 B, -23%)
//!     media/logo.gif: skipped (unsupported format)
//! ==> Done: exports/optimiert (1.42s)
//! ```
//!
//! # Architecture
//!
//! [`format_event`] is pure (returns `Vec<String>`) for testability and
//! [`print_event`] writes its lines to stdout. Files within a stage are
//! processed in parallel, so their lines arrive in completion order.

use crate::pipeline::{PipelineEvent, SkipReason};
use std::time::Duration;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn format_bytes(bytes: u64) -> String {
    format!("{} B", bytes)
}

/// Percentage saved, rounded to the nearest whole percent.
fn savings_percent(before: u64, after: u64) -> u64 {
    if before == 0 || after >= before {
        return 0;
    }
    ((before - after) * 100 + before / 2) / before
}

fn format_elapsed(elapsed: Duration) -> String {
    if elapsed.as_secs() >= 1 {
        format!("{:.2}s", elapsed.as_secs_f64())
    } else {
        format!("{}ms", elapsed.as_millis())
    }
}

fn plural(count: usize, one: &str, many: &str) -> String {
    if count == 1 {
        format!("{} {}", count, one)
    } else {
        format!("{} {}", count, many)
    }
}

fn skip_reason(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::NotFound => "not found",
        SkipReason::AlreadyMinified => "already minified",
        SkipReason::Unchanged => "no references to rewrite",
        SkipReason::NoSmallerEncoding => "no smaller encoding",
        SkipReason::UnsupportedFormat => "unsupported format",
        SkipReason::Animated => "animated",
    }
}

/// Format a single pipeline event as display lines.
pub fn format_event(event: &PipelineEvent) -> Vec<String> {
    match event {
        PipelineEvent::RunStarted {
            input,
            output,
            purged,
        } => {
            let mut lines = vec![format!(
                "==> putzfish {} \u{2192} {}",
                input.display(),
                output.display()
            )];
            if *purged {
                lines.push(format!("{}removed previous output", indent(1)));
            }
            lines
        }
        PipelineEvent::StageStarted {
            stage,
            index,
            total,
            files,
        } => vec![format!(
            "==> Stage {}/{}: {} ({})",
            index,
            total,
            stage.name(),
            plural(*files, "file", "files")
        )],
        PipelineEvent::FileCopied { path } => {
            vec![format!("{}{}", indent(1), path.display())]
        }
        PipelineEvent::FileMinified {
            source,
            target,
            before,
            after,
            ..
        } => vec![format!(
            "{}{} \u{2192} {} ({} \u{2192} {})",
            indent(1),
            source.display(),
            target.display(),
            format_bytes(*before),
            format_bytes(*after)
        )],
        PipelineEvent::SelectorsPruned {
            path,
            kept,
            removed,
        } => vec![format!(
            "{}{}: {} kept, {} removed",
            indent(1),
            path.display(),
            plural(*kept, "selector", "selectors"),
            removed
        )],
        PipelineEvent::FileRewritten { path } => {
            vec![format!("{}{}: references rewritten", indent(1), path.display())]
        }
        PipelineEvent::ImageCompressed {
            path,
            before,
            after,
        } => vec![format!(
            "{}{} ({} \u{2192} {}, -{}%)",
            indent(1),
            path.display(),
            format_bytes(*before),
            format_bytes(*after),
            savings_percent(*before, *after)
        )],
        PipelineEvent::FileSkipped { path, reason, .. } => vec![format!(
            "{}{}: skipped ({})",
            indent(1),
            path.display(),
            skip_reason(*reason)
        )],
        PipelineEvent::StageFinished { .. } => Vec::new(),
        PipelineEvent::RunFinished { output, elapsed } => vec![format!(
            "==> Done: {} ({})",
            output.display(),
            format_elapsed(*elapsed)
        )],
    }
}

/// Print a pipeline event to stdout.
pub fn print_event(event: &PipelineEvent) {
    for line in format_event(event) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
