//! Pipeline orchestration.
//!
//! A run is six [`Stage`]s over one output tree. Each stage declares the
//! stages it depends on and the asset classes it reads and writes; the
//! orchestrator orders them with a deterministic topological sort and runs
//! them one at a time with a barrier in between:
//!
//! ```text
//!                 ┌─> minify-styles ──┐
//!                 │                   │
//!   copy ─────────┼─> prune-styles ───┼─> rewrite-references
//!                 │                   │
//!                 ├─> minify-scripts ─┘
//!                 │
//!                 └─> compress-images
//! ```
//!
//! Ties are broken by declaration order, which yields
//! copy, minify-styles, prune-styles, minify-scripts, rewrite-references,
//! compress-images.
//!
//! ## Failure
//!
//! The first error aborts the run and is returned unchanged. Nothing is
//! rolled back: the output tree keeps whatever the completed stages wrote.
//! The input directory is only ever read.
//!
//! ## Concurrency
//!
//! Runs against the same output directory must not overlap. Nothing locks
//! the directory; the purge at the start of a run is the only isolation.

use crate::config::{ConfigError, PipelineConfig, Settings};
use crate::copy;
use crate::imaging::BackendError;
use crate::minify::MinifyError;
use crate::naming::RenamePolicy;
use crate::plan::{self, AssetClass, PlanError};
use crate::prune::PruneError;
use crate::rewrite::RewriteRules;
use crate::stages::{self, StageContext};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input error: {0}")]
    Input(#[from] ConfigError),
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot transform {}: {source}", .path.display())]
    Transform {
        path: PathBuf,
        #[source]
        source: MinifyError,
    },
    #[error("Unused-selector analysis of {} exceeded {timeout:?}", .path.display())]
    AnalysisTimeout { path: PathBuf, timeout: Duration },
    #[error("Unused-selector analysis of {} failed: {source}", .path.display())]
    Analysis {
        path: PathBuf,
        #[source]
        source: PruneError,
    },
    #[error("Cannot compress {}: {source}", .path.display())]
    Imaging {
        path: PathBuf,
        #[source]
        source: BackendError,
    },
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("Invalid stage schedule: {0}")]
    Schedule(String),
}

impl From<copy::CopyError> for PipelineError {
    fn from(err: copy::CopyError) -> Self {
        match err {
            copy::CopyError::Io { path, source } => PipelineError::Io { path, source },
        }
    }
}

impl PipelineError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Attribute an analysis failure to the stylesheet being pruned.
    pub(crate) fn from_prune(path: &Path, err: PruneError) -> Self {
        let path = path.to_path_buf();
        match err {
            PruneError::Io { path, source } => PipelineError::Io { path, source },
            PruneError::Minify(source) => PipelineError::Transform { path, source },
            PruneError::Timeout(timeout) => PipelineError::AnalysisTimeout { path, timeout },
            other => PipelineError::Analysis {
                path,
                source: other,
            },
        }
    }
}

/// The pipeline stages, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Copy,
    MinifyStyles,
    PruneStyles,
    MinifyScripts,
    RewriteReferences,
    CompressImages,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Copy,
        Stage::MinifyStyles,
        Stage::PruneStyles,
        Stage::MinifyScripts,
        Stage::RewriteReferences,
        Stage::CompressImages,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Copy => "copy",
            Stage::MinifyStyles => "minify-styles",
            Stage::PruneStyles => "prune-styles",
            Stage::MinifyScripts => "minify-scripts",
            Stage::RewriteReferences => "rewrite-references",
            Stage::CompressImages => "compress-images",
        }
    }

    /// Stages that must have finished before this one starts.
    pub fn depends_on(self) -> &'static [Stage] {
        match self {
            Stage::Copy => &[],
            Stage::MinifyStyles | Stage::PruneStyles | Stage::MinifyScripts => &[Stage::Copy],
            // Markup is rewritten to names that only exist once every minify stage ran;
            // pruning must also see the markup before it changes.
            Stage::RewriteReferences => &[
                Stage::MinifyStyles,
                Stage::PruneStyles,
                Stage::MinifyScripts,
            ],
            Stage::CompressImages => &[Stage::Copy],
        }
    }

    /// Asset classes this stage selects or inspects.
    pub fn reads(self) -> &'static [AssetClass] {
        match self {
            Stage::Copy => &[],
            Stage::MinifyStyles => &[AssetClass::Styles],
            Stage::PruneStyles => &[AssetClass::GlobalStylesheet, AssetClass::Markup],
            Stage::MinifyScripts => &[AssetClass::Scripts],
            Stage::RewriteReferences => &[AssetClass::Markup],
            Stage::CompressImages => &[AssetClass::Images],
        }
    }

    /// Asset classes this stage creates or modifies in the output tree.
    pub fn writes(self) -> &'static [AssetClass] {
        match self {
            Stage::Copy => &AssetClass::ALL,
            Stage::MinifyStyles => &[AssetClass::Styles],
            Stage::PruneStyles => &[AssetClass::GlobalStylesheet],
            Stage::MinifyScripts => &[AssetClass::Scripts],
            Stage::RewriteReferences => &[AssetClass::Markup],
            Stage::CompressImages => &[AssetClass::Images],
        }
    }
}

/// Order `stages` so every stage follows its dependencies.
///
/// Deterministic: among ready stages, the one declared first in `stages`
/// goes first. Fails on a cycle, on a dependency missing from `stages`, or
/// when a stage reads an asset class none of its upstream stages writes.
pub fn schedule(stages: &[Stage]) -> Result<Vec<Stage>, PipelineError> {
    let order = order_by_dependencies(stages, |s| s.depends_on().to_vec())?;
    verify_inputs(
        &order,
        |s| s.depends_on().to_vec(),
        |s| s.reads().to_vec(),
        |s| s.writes().to_vec(),
    )?;
    Ok(order)
}

/// Every class a node reads must be written by one of its transitive dependencies.
fn verify_inputs<T, C, D, R, W>(
    nodes: &[T],
    deps: D,
    reads: R,
    writes: W,
) -> Result<(), PipelineError>
where
    T: Copy + PartialEq + std::fmt::Debug,
    C: PartialEq + std::fmt::Debug,
    D: Fn(T) -> Vec<T>,
    R: Fn(T) -> Vec<C>,
    W: Fn(T) -> Vec<C>,
{
    for &node in nodes {
        let upstream = transitive_deps(node, &deps);
        for class in reads(node) {
            if !upstream.iter().any(|&up| writes(up).contains(&class)) {
                return Err(PipelineError::Schedule(format!(
                    "{node:?} reads {class:?}, which no upstream stage writes"
                )));
            }
        }
    }
    Ok(())
}

fn transitive_deps<T, D>(node: T, deps: &D) -> Vec<T>
where
    T: Copy + PartialEq,
    D: Fn(T) -> Vec<T>,
{
    let mut seen: Vec<T> = Vec::new();
    let mut stack = deps(node);
    while let Some(next) = stack.pop() {
        if !seen.contains(&next) {
            seen.push(next);
            stack.extend(deps(next));
        }
    }
    seen
}

fn order_by_dependencies<T, F>(nodes: &[T], deps: F) -> Result<Vec<T>, PipelineError>
where
    T: Copy + PartialEq + std::fmt::Debug,
    F: Fn(T) -> Vec<T>,
{
    let mut pending: Vec<(T, Vec<T>)> = Vec::with_capacity(nodes.len());
    for &node in nodes {
        let node_deps = deps(node);
        if let Some(missing) = node_deps.iter().find(|d| !nodes.contains(*d)) {
            return Err(PipelineError::Schedule(format!(
                "{node:?} depends on {missing:?}, which is not scheduled"
            )));
        }
        pending.push((node, node_deps));
    }

    let mut order: Vec<T> = Vec::with_capacity(nodes.len());
    while !pending.is_empty() {
        let ready = pending
            .iter()
            .position(|(_, node_deps)| node_deps.iter().all(|d| order.contains(d)));
        match ready {
            Some(pos) => order.push(pending.remove(pos).0),
            None => {
                let stuck: Vec<T> = pending.iter().map(|(n, _)| *n).collect();
                return Err(PipelineError::Schedule(format!(
                    "dependency cycle among {stuck:?}"
                )));
            }
        }
    }
    Ok(order)
}

/// Why a selected file was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The expected file does not exist in the export.
    NotFound,
    /// The file already carries the minified name.
    AlreadyMinified,
    /// No reference needed rewriting.
    Unchanged,
    /// Re-encoding did not make the image smaller.
    NoSmallerEncoding,
    /// Not an image format the compressor handles.
    UnsupportedFormat,
    /// Animated image; re-encoding would keep only the first frame.
    Animated,
}

/// Progress events emitted during a run, for CLI output.
///
/// Paths are relative to the output root (for `Copy`, equivalently the input root).
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    RunStarted {
        input: PathBuf,
        output: PathBuf,
        purged: bool,
    },
    StageStarted {
        stage: Stage,
        index: usize,
        total: usize,
        files: usize,
    },
    FileCopied {
        path: PathBuf,
    },
    FileMinified {
        stage: Stage,
        source: PathBuf,
        target: PathBuf,
        before: u64,
        after: u64,
    },
    SelectorsPruned {
        path: PathBuf,
        kept: usize,
        removed: usize,
    },
    FileRewritten {
        path: PathBuf,
    },
    ImageCompressed {
        path: PathBuf,
        before: u64,
        after: u64,
    },
    FileSkipped {
        stage: Stage,
        path: PathBuf,
        reason: SkipReason,
    },
    StageFinished {
        stage: Stage,
        elapsed: Duration,
    },
    RunFinished {
        output: PathBuf,
        elapsed: Duration,
    },
}

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub output: PathBuf,
    pub stages: Vec<Stage>,
}

/// Resolve `input` and `settings`, then [`run`] the pipeline.
///
/// Input problems are reported as [`PipelineError::Input`] before anything
/// is purged or created.
pub fn optimize(
    input: &Path,
    settings: Settings,
    events: Option<Sender<PipelineEvent>>,
) -> Result<RunSummary, PipelineError> {
    let config = PipelineConfig::resolve(input, settings)?;
    run(&config, events)
}

/// Run every stage against `config`.
///
/// Purges the output directory, then executes the scheduled stages in order.
/// Stops at the first failing stage and returns its error.
pub fn run(
    config: &PipelineConfig,
    events: Option<Sender<PipelineEvent>>,
) -> Result<RunSummary, PipelineError> {
    let started = Instant::now();
    if !config.input().is_dir() {
        return Err(ConfigError::InputNotDirectory(config.input().to_path_buf()).into());
    }
    let order = schedule(&Stage::ALL)?;

    let plan = plan::plan(config.output());
    let policy = RenamePolicy::default();
    let rules = RewriteRules::for_policy(&policy);
    let ctx = StageContext {
        config,
        plan: &plan,
        policy: &policy,
        rules: &rules,
        events: events.as_ref(),
    };

    let purged = copy::purge(config.output())?;
    ctx.emit(PipelineEvent::RunStarted {
        input: config.input().to_path_buf(),
        output: config.output().to_path_buf(),
        purged,
    });

    let total = order.len();
    for (i, &stage) in order.iter().enumerate() {
        let stage_started = Instant::now();
        let files = stages::select(stage, &ctx)?;
        ctx.emit(PipelineEvent::StageStarted {
            stage,
            index: i + 1,
            total,
            files: files.len(),
        });
        stages::run(stage, &ctx, &files)?;
        ctx.emit(PipelineEvent::StageFinished {
            stage,
            elapsed: stage_started.elapsed(),
        });
    }

    ctx.emit(PipelineEvent::RunFinished {
        output: config.output().to_path_buf(),
        elapsed: started.elapsed(),
    });
    Ok(RunSummary {
        output: config.output().to_path_buf(),
        stages: order,
    })
}
