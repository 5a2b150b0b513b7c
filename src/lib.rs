//! # putzfish
//!
//! Optimizes a static website export for deployment. The export directory is
//! never touched: everything happens in a derived sibling directory named
//! `optimiert`, which is purged and rebuilt on every run.
//!
//! # Architecture: Staged Pipeline
//!
//! A run copies the export, then transforms the copy in place through a fixed
//! set of stages:
//!
//! ```text
//! 1. copy                 export/           →  optimiert/         (verbatim mirror)
//! 2. minify-styles        support/*.css     →  support/*.min.css
//! 3. prune-styles         global_style.css  →  global_style.min.css (unused selectors removed)
//! 4. minify-scripts       support/*.js      →  support/*.min.js
//! 5. rewrite-references   **/*.html         →  same files, pointing at the .min assets
//! 6. compress-images      media/*           →  same files, re-encoded when smaller
//! ```
//!
//! Stages declare their dependencies and the asset classes they read and
//! write. The order above comes from a deterministic topological sort, and
//! each stage finishes before the next one starts. Within a stage, files are
//! processed in parallel on the rayon pool.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | Settings file loading, validation, output directory derivation |
//! | [`pipeline`] | Stage declarations, scheduling, run orchestration, events |
//! | [`stages`] | Per-stage file selection and execution |
//! | [`plan`] | Include/exclude glob selections per asset class |
//! | [`naming`] | The `.min` rename policy |
//! | [`rewrite`] | Reference rewrite rules for markup |
//! | [`copy`] | Output purge and verbatim mirroring |
//! | [`minify`] | CSS (lightningcss) and JS (oxc) minification |
//! | [`prune`] | Unused-selector removal for the global stylesheet |
//! | [`imaging`] | Pure-Rust image re-encoding |
//! | [`output`] | CLI output formatting of pipeline events |
//!
//! # Design Decisions
//!
//! ## Originals Are Kept
//!
//! Minified assets are written next to their sources (`style.css` and
//! `style.min.css`). The markup only points at the minified files after the
//! rewrite stage, but the originals stay in place so hand-written references
//! that the rewrite rules do not cover keep working.
//!
//! ## Fail Fast, No Rollback
//!
//! The first error aborts the run. A half-optimized output directory is left
//! behind for inspection; the next run purges it anyway.

pub mod config;
pub mod copy;
pub mod imaging;
pub mod minify;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod plan;
pub mod prune;
pub mod rewrite;
pub mod stages;

#[cfg(test)]
pub(crate) mod test_helpers;
