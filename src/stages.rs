//! The six stage runners.
//!
//! Each stage is split in two: [`select`] lists the files the stage will
//! touch (so progress output can announce a count), and [`run`] processes
//! them. Per-file work runs on the rayon pool and collects into a `Result`,
//! so the first failure aborts the stage.
//!
//! | Stage | Files | Effect |
//! |---|---|---|
//! | copy | every file under the input | mirrored into the output |
//! | minify-styles | styles | `x.css` → `x.min.css` beside it |
//! | prune-styles | the global stylesheet | pruned and minified to `global_style.min.css` |
//! | minify-scripts | scripts | `x.js` → `x.min.js` beside it |
//! | rewrite-references | markup | references point at the `.min` names |
//! | compress-images | images | overwritten when a smaller encoding exists |

use crate::config::PipelineConfig;
use crate::copy;
use crate::imaging::{self, CompressOutcome, ImageBackend, Quality, RustBackend};
use crate::minify::{self, MinifyError};
use crate::naming::RenamePolicy;
use crate::pipeline::{PipelineError, PipelineEvent, SkipReason, Stage};
use crate::plan::{self, AssetClass, GLOBAL_STYLESHEET, Plan, SUPPORT_DIR};
use crate::prune::{self, PruneOptions};
use crate::rewrite::RewriteRules;
use rayon::prelude::*;
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

/// Everything a stage needs, built once per run.
pub struct StageContext<'a> {
    pub config: &'a PipelineConfig,
    pub plan: &'a Plan,
    pub policy: &'a RenamePolicy,
    pub rules: &'a RewriteRules,
    pub events: Option<&'a Sender<PipelineEvent>>,
}

impl StageContext<'_> {
    pub fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = self.events {
            // The printer hanging up must not fail the run.
            let _ = tx.send(event);
        }
    }

    /// `path` relative to the output root, for display.
    fn display_path(&self, path: &Path) -> PathBuf {
        path.strip_prefix(self.config.output())
            .unwrap_or(path)
            .to_path_buf()
    }

    fn selection(&self, class: AssetClass) -> Result<Vec<PathBuf>, PipelineError> {
        match self.plan.get(&class) {
            Some(selection) => Ok(plan::select(selection)?),
            None => Ok(Vec::new()),
        }
    }
}

/// List the files `stage` will process.
///
/// For [`Stage::Copy`] the paths are under the input root; for every other
/// stage they are under the output root.
pub fn select(stage: Stage, ctx: &StageContext<'_>) -> Result<Vec<PathBuf>, PipelineError> {
    match stage {
        Stage::Copy => {
            let input = ctx.config.input();
            Ok(copy::list_files(input)?
                .into_iter()
                .map(|rel| input.join(rel))
                .collect())
        }
        Stage::MinifyStyles => ctx.selection(AssetClass::Styles),
        Stage::PruneStyles => ctx.selection(AssetClass::GlobalStylesheet),
        Stage::MinifyScripts => ctx.selection(AssetClass::Scripts),
        Stage::RewriteReferences => ctx.selection(AssetClass::Markup),
        Stage::CompressImages => ctx.selection(AssetClass::Images),
    }
}

/// Process `files` (from [`select`]) for `stage`.
pub fn run(stage: Stage, ctx: &StageContext<'_>, files: &[PathBuf]) -> Result<(), PipelineError> {
    match stage {
        Stage::Copy => copy_export(ctx, files),
        Stage::MinifyStyles => minify_each(ctx, stage, files, minify::minify_css),
        Stage::PruneStyles => prune_global_stylesheet(ctx, files),
        Stage::MinifyScripts => minify_each(ctx, stage, files, minify::minify_js),
        Stage::RewriteReferences => rewrite_references(ctx, files),
        Stage::CompressImages => {
            let quality = Quality::new(ctx.config.settings().images.quality);
            compress_images(&RustBackend::new(), ctx, files, quality)
        }
    }
}

// ============================================================================
// copy
// ============================================================================

fn copy_export(ctx: &StageContext<'_>, files: &[PathBuf]) -> Result<(), PipelineError> {
    let input = ctx.config.input();
    let output = ctx.config.output();
    let relative: Vec<PathBuf> = files
        .iter()
        .map(|f| f.strip_prefix(input).unwrap_or(f).to_path_buf())
        .collect();
    copy::copy_files(input, output, &relative)?;
    for path in relative {
        ctx.emit(PipelineEvent::FileCopied { path });
    }
    if ctx.config.settings().output.helper_page {
        let helper = copy::write_helper_page(output)?;
        ctx.emit(PipelineEvent::FileCopied {
            path: ctx.display_path(&helper),
        });
    }
    Ok(())
}

// ============================================================================
// minify-styles / minify-scripts
// ============================================================================

fn minify_each(
    ctx: &StageContext<'_>,
    stage: Stage,
    files: &[PathBuf],
    transform: fn(&str) -> Result<String, MinifyError>,
) -> Result<(), PipelineError> {
    files.par_iter().try_for_each(|source| {
        let target = ctx.policy.apply_to_path(source);
        if target == *source {
            ctx.emit(PipelineEvent::FileSkipped {
                stage,
                path: ctx.display_path(source),
                reason: SkipReason::AlreadyMinified,
            });
            return Ok(());
        }
        let content = fs::read_to_string(source).map_err(|e| PipelineError::io(source, e))?;
        let minified = transform(&content).map_err(|e| PipelineError::Transform {
            path: source.clone(),
            source: e,
        })?;
        fs::write(&target, &minified).map_err(|e| PipelineError::io(&target, e))?;
        ctx.emit(PipelineEvent::FileMinified {
            stage,
            source: ctx.display_path(source),
            target: ctx.display_path(&target),
            before: content.len() as u64,
            after: minified.len() as u64,
        });
        Ok(())
    })
}

// ============================================================================
// prune-styles
// ============================================================================

fn prune_global_stylesheet(ctx: &StageContext<'_>, files: &[PathBuf]) -> Result<(), PipelineError> {
    let Some(stylesheet) = files.first() else {
        ctx.emit(PipelineEvent::FileSkipped {
            stage: Stage::PruneStyles,
            path: Path::new(SUPPORT_DIR).join(GLOBAL_STYLESHEET),
            reason: SkipReason::NotFound,
        });
        return Ok(());
    };
    let markup = ctx.selection(AssetClass::Markup)?;
    let prune_config = &ctx.config.settings().prune;
    let options = PruneOptions {
        ignore: prune_config.ignore_patterns()?,
        timeout: prune_config.timeout(),
    };

    let before = fs::metadata(stylesheet)
        .map_err(|e| PipelineError::io(stylesheet, e))?
        .len();
    let report = prune::prune_with_timeout(stylesheet, &markup, &options)
        .map_err(|e| PipelineError::from_prune(stylesheet, e))?;
    let target = ctx.policy.apply_to_path(stylesheet);
    fs::write(&target, &report.css).map_err(|e| PipelineError::io(&target, e))?;

    ctx.emit(PipelineEvent::SelectorsPruned {
        path: ctx.display_path(stylesheet),
        kept: report.kept,
        removed: report.removed,
    });
    ctx.emit(PipelineEvent::FileMinified {
        stage: Stage::PruneStyles,
        source: ctx.display_path(stylesheet),
        target: ctx.display_path(&target),
        before,
        after: report.css.len() as u64,
    });
    Ok(())
}

// ============================================================================
// rewrite-references
// ============================================================================

fn rewrite_references(ctx: &StageContext<'_>, files: &[PathBuf]) -> Result<(), PipelineError> {
    files.par_iter().try_for_each(|path| {
        let content = fs::read(path).map_err(|e| PipelineError::io(path, e))?;
        match ctx.rules.apply(&content) {
            Cow::Borrowed(_) => ctx.emit(PipelineEvent::FileSkipped {
                stage: Stage::RewriteReferences,
                path: ctx.display_path(path),
                reason: SkipReason::Unchanged,
            }),
            Cow::Owned(rewritten) => {
                fs::write(path, rewritten).map_err(|e| PipelineError::io(path, e))?;
                ctx.emit(PipelineEvent::FileRewritten {
                    path: ctx.display_path(path),
                });
            }
        }
        Ok(())
    })
}

// ============================================================================
// compress-images
// ============================================================================

/// Compress every image through `backend` (allows testing with a mock).
fn compress_images(
    backend: &impl ImageBackend,
    ctx: &StageContext<'_>,
    files: &[PathBuf],
    quality: Quality,
) -> Result<(), PipelineError> {
    files.par_iter().try_for_each(|path| {
        let outcome =
            imaging::compress_in_place(backend, path, quality).map_err(|e| {
                PipelineError::Imaging {
                    path: path.clone(),
                    source: e,
                }
            })?;
        let shown = ctx.display_path(path);
        ctx.emit(match outcome {
            CompressOutcome::Reduced { before, after } => PipelineEvent::ImageCompressed {
                path: shown,
                before,
                after,
            },
            CompressOutcome::Kept { .. } => PipelineEvent::FileSkipped {
                stage: Stage::CompressImages,
                path: shown,
                reason: SkipReason::NoSmallerEncoding,
            },
            CompressOutcome::Unsupported => PipelineEvent::FileSkipped {
                stage: Stage::CompressImages,
                path: shown,
                reason: SkipReason::UnsupportedFormat,
            },
            CompressOutcome::Animated => PipelineEvent::FileSkipped {
                stage: Stage::CompressImages,
                path: shown,
                reason: SkipReason::Animated,
            },
        });
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::imaging::backend::tests::MockBackend;
    use crate::test_helpers::ExportBuilder;
    use std::sync::mpsc;

    /// Owns everything a [`StageContext`] borrows.
    struct Harness {
        _tmp: tempfile::TempDir,
        config: PipelineConfig,
        plan: Plan,
        policy: RenamePolicy,
        rules: RewriteRules,
        tx: Sender<PipelineEvent>,
        rx: mpsc::Receiver<PipelineEvent>,
    }

    impl Harness {
        fn new(builder: ExportBuilder) -> Self {
            Self::with_settings(builder, Settings::default())
        }

        fn with_settings(builder: ExportBuilder, settings: Settings) -> Self {
            let (tmp, input) = builder.build();
            let config = PipelineConfig::resolve(&input, settings).unwrap();
            let plan = plan::plan(config.output());
            let policy = RenamePolicy::default();
            let rules = RewriteRules::for_policy(&policy);
            let (tx, rx) = mpsc::channel();
            Self {
                _tmp: tmp,
                config,
                plan,
                policy,
                rules,
                tx,
                rx,
            }
        }

        fn ctx(&self) -> StageContext<'_> {
            StageContext {
                config: &self.config,
                plan: &self.plan,
                policy: &self.policy,
                rules: &self.rules,
                events: Some(&self.tx),
            }
        }

        fn stage(&self, stage: Stage) -> Result<(), PipelineError> {
            let ctx = self.ctx();
            let files = select(stage, &ctx)?;
            run(stage, &ctx, &files)
        }

        fn out(&self, rel: &str) -> PathBuf {
            self.config.output().join(rel)
        }

        fn events(&self) -> Vec<PipelineEvent> {
            self.rx.try_iter().collect()
        }
    }

    #[test]
    fn copy_mirrors_input() {
        let h = Harness::new(
            ExportBuilder::new()
                .file("index.html", "<p>hi</p>")
                .file("support/style.css", ".a { color: red }"),
        );
        h.stage(Stage::Copy).unwrap();
        assert_eq!(fs::read_to_string(h.out("index.html")).unwrap(), "<p>hi</p>");
        assert!(h.out("support/style.css").is_file());
        assert!(!h.out("putzfish.html").exists());

        let copied: Vec<_> = h
            .events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::FileCopied { path } => Some(path),
                _ => None,
            })
            .collect();
        assert_eq!(
            copied,
            vec![PathBuf::from("index.html"), PathBuf::from("support/style.css")]
        );
    }

    #[test]
    fn copy_writes_helper_page_when_enabled() {
        let mut settings = Settings::default();
        settings.output.helper_page = true;
        let h = Harness::with_settings(ExportBuilder::new().file("index.html", ""), settings);
        h.stage(Stage::Copy).unwrap();
        assert!(h.out(copy::HELPER_PAGE_NAME).is_file());
    }

    #[test]
    fn minify_styles_writes_beside_original() {
        let original = ".a {\n  color: red;\n}\n";
        let h = Harness::new(ExportBuilder::new().file("support/style.css", original));
        h.stage(Stage::Copy).unwrap();
        h.stage(Stage::MinifyStyles).unwrap();

        assert_eq!(fs::read_to_string(h.out("support/style.css")).unwrap(), original);
        assert_eq!(
            fs::read_to_string(h.out("support/style.min.css")).unwrap(),
            ".a{color:red}"
        );
    }

    #[test]
    fn malformed_style_names_the_file() {
        let h = Harness::new(ExportBuilder::new().file("support/broken.css", ".a..b { color: red }"));
        h.stage(Stage::Copy).unwrap();
        let err = h.stage(Stage::MinifyStyles).unwrap_err();
        assert!(
            matches!(&err, PipelineError::Transform { path, .. } if path.ends_with("support/broken.css")),
            "{err:?}"
        );
        assert!(!h.out("support/broken.min.css").exists());
    }

    #[test]
    fn minify_scripts_writes_beside_original() {
        let h = Harness::new(
            ExportBuilder::new()
                .file("support/app.js", "function hello() {\n  return 1 + 2;\n}\n")
                .file("support/jquery.min.js", "already"),
        );
        h.stage(Stage::Copy).unwrap();
        h.stage(Stage::MinifyScripts).unwrap();
        assert!(h.out("support/app.min.js").is_file());
        assert_eq!(
            fs::read_to_string(h.out("support/jquery.min.js")).unwrap(),
            "already"
        );
    }

    #[test]
    fn prune_without_global_stylesheet_is_skipped() {
        let h = Harness::new(ExportBuilder::new().file("index.html", "<p></p>"));
        h.stage(Stage::Copy).unwrap();
        h.stage(Stage::PruneStyles).unwrap();
        assert!(h.events().iter().any(|e| matches!(
            e,
            PipelineEvent::FileSkipped {
                reason: SkipReason::NotFound,
                ..
            }
        )));
    }

    #[test]
    fn prune_keeps_used_and_ignored_selectors() {
        let h = Harness::new(
            ExportBuilder::new()
                .file("index.html", r#"<div class="used"></div>"#)
                .file(
                    "support/global_style.css",
                    ".used { color: red } .unused { color: blue } #overlay { top: 0 }",
                ),
        );
        h.stage(Stage::Copy).unwrap();
        h.stage(Stage::PruneStyles).unwrap();
        let css = fs::read_to_string(h.out("support/global_style.min.css")).unwrap();
        assert!(css.contains(".used"));
        assert!(css.contains("#overlay"));
        assert!(!css.contains(".unused"));
    }

    #[test]
    fn rewrite_only_touches_changed_files() {
        let h = Harness::new(
            ExportBuilder::new()
                .file("index.html", r#"<link href="support/style.css">"#)
                .file("about.php", "<p>no references</p>"),
        );
        h.stage(Stage::Copy).unwrap();
        h.events();
        h.stage(Stage::RewriteReferences).unwrap();

        assert_eq!(
            fs::read_to_string(h.out("index.html")).unwrap(),
            r#"<link href="support/style.min.css">"#
        );
        let events = h.events();
        assert!(events.contains(&PipelineEvent::FileRewritten {
            path: PathBuf::from("index.html")
        }));
        assert!(events.contains(&PipelineEvent::FileSkipped {
            stage: Stage::RewriteReferences,
            path: PathBuf::from("about.php"),
            reason: SkipReason::Unchanged,
        }));
    }

    #[test]
    fn compress_reports_each_outcome() {
        let h = Harness::new(
            ExportBuilder::new()
                .file("media/big.jpg", "x".repeat(100))
                .file("media/small.png", "x")
                .file("media/anim.gif", "GIF89a"),
        );
        h.stage(Stage::Copy).unwrap();
        h.events();

        let ctx = h.ctx();
        let files = select(Stage::CompressImages, &ctx).unwrap();
        let backend = MockBackend::with_output(vec![0u8; 10]);
        compress_images(&backend, &ctx, &files, Quality::default()).unwrap();

        let events = h.events();
        assert!(events.contains(&PipelineEvent::ImageCompressed {
            path: PathBuf::from("media/big.jpg"),
            before: 100,
            after: 10,
        }));
        assert!(events.contains(&PipelineEvent::FileSkipped {
            stage: Stage::CompressImages,
            path: PathBuf::from("media/small.png"),
            reason: SkipReason::NoSmallerEncoding,
        }));
        assert!(events.contains(&PipelineEvent::FileSkipped {
            stage: Stage::CompressImages,
            path: PathBuf::from("media/anim.gif"),
            reason: SkipReason::UnsupportedFormat,
        }));
        assert_eq!(backend.get_operations().len(), 2);
    }

    #[test]
    fn compress_skips_animated_images() {
        let h = Harness::new(ExportBuilder::new().file("media/spinner.png", "x".repeat(100)));
        h.stage(Stage::Copy).unwrap();
        h.events();

        let ctx = h.ctx();
        let files = select(Stage::CompressImages, &ctx).unwrap();
        compress_images(&MockBackend::animated(), &ctx, &files, Quality::default()).unwrap();

        assert!(h.events().contains(&PipelineEvent::FileSkipped {
            stage: Stage::CompressImages,
            path: PathBuf::from("media/spinner.png"),
            reason: SkipReason::Animated,
        }));
        assert_eq!(fs::read_to_string(h.out("media/spinner.png")).unwrap(), "x".repeat(100));
    }

    #[test]
    fn compress_failure_names_the_image() {
        let h = Harness::new(ExportBuilder::new().file("media/photo.jpg", "x".repeat(50)));
        h.stage(Stage::Copy).unwrap();
        let ctx = h.ctx();
        let files = select(Stage::CompressImages, &ctx).unwrap();
        let err = compress_images(&MockBackend::failing(), &ctx, &files, Quality::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Imaging { ref path, .. } if path.ends_with("media/photo.jpg")));
    }
}
