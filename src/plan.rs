//! File selection per asset class.
//!
//! The planner maps the output root to one include/exclude glob set per
//! [`AssetClass`]. [`plan`] is pure: it only builds pattern strings. [`select`]
//! expands a [`Selection`] against the filesystem.
//!
//! ## Export layout
//!
//! ```text
//! optimiert/
//! ├── index.html               # markup, anywhere in the tree
//! ├── contact.php
//! ├── support/
//! │   ├── global_style.css     # global stylesheet (pruned separately)
//! │   ├── style.css            # styles
//! │   ├── animation.js         # scripts
//! │   └── jquery.min.js        # already minified: never selected
//! └── media/
//!     └── photo.jpg            # images (top level only)
//! ```
//!
//! Excludes always win over includes. The `*.min.*` excludes keep a second
//! run over an unpurged tree from minifying the previous run's outputs.

use glob::{MatchOptions, Pattern};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory holding styles and scripts.
pub const SUPPORT_DIR: &str = "support";
/// Directory holding images (not searched recursively).
pub const MEDIA_DIR: &str = "media";
/// Stylesheet that gets unused-selector pruning instead of plain minification.
pub const GLOBAL_STYLESHEET: &str = "global_style.css";
/// A script with a stylesheet-adjacent role, excluded from the styles class.
pub const LEGACY_STYLE_SCRIPT: &str = "animation.js";

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("Unreadable path while selecting files: {0}")]
    Glob(#[from] glob::GlobError),
}

/// Categories of files in an export bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetClass {
    Markup,
    Styles,
    GlobalStylesheet,
    Scripts,
    Images,
}

impl AssetClass {
    pub const ALL: [AssetClass; 5] = [
        AssetClass::Markup,
        AssetClass::Styles,
        AssetClass::GlobalStylesheet,
        AssetClass::Scripts,
        AssetClass::Images,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AssetClass::Markup => "markup",
            AssetClass::Styles => "styles",
            AssetClass::GlobalStylesheet => "global-stylesheet",
            AssetClass::Scripts => "scripts",
            AssetClass::Images => "images",
        }
    }
}

/// Include and exclude globs for one asset class, both in evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Selection {
    /// Whether `path` matches an include and no exclude. No filesystem access.
    pub fn matches(&self, path: &Path) -> Result<bool, PlanError> {
        let included = any_matches(&self.include, path)?;
        Ok(included && !any_matches(&self.exclude, path)?)
    }
}

/// The full plan: one [`Selection`] per [`AssetClass`].
pub type Plan = BTreeMap<AssetClass, Selection>;

/// Compute the selection globs for every asset class under `output_root`.
pub fn plan(output_root: &Path) -> Plan {
    let root = Pattern::escape(&output_root.to_string_lossy());
    let root = root.trim_end_matches('/');
    let support = format!("{root}/{SUPPORT_DIR}");
    let media = format!("{root}/{MEDIA_DIR}");

    let mut plan = Plan::new();
    plan.insert(
        AssetClass::Markup,
        Selection {
            include: vec![format!("{root}/**/*.html"), format!("{root}/**/*.php")],
            exclude: vec![],
        },
    );
    plan.insert(
        AssetClass::Styles,
        Selection {
            include: vec![format!("{support}/**/*.css")],
            exclude: vec![
                format!("{support}/**/*.min.css"),
                format!("{support}/{GLOBAL_STYLESHEET}"),
                format!("{support}/{LEGACY_STYLE_SCRIPT}"),
            ],
        },
    );
    plan.insert(
        AssetClass::GlobalStylesheet,
        Selection {
            include: vec![format!("{support}/{GLOBAL_STYLESHEET}")],
            exclude: vec![],
        },
    );
    plan.insert(
        AssetClass::Scripts,
        Selection {
            include: vec![format!("{support}/**/*.js")],
            exclude: vec![format!("{support}/**/*.min.js")],
        },
    );
    plan.insert(
        AssetClass::Images,
        Selection {
            include: vec![format!("{media}/*")],
            exclude: vec![],
        },
    );
    plan
}

/// Expand `selection` against the filesystem.
///
/// Returns regular files only, sorted and de-duplicated. A file matching any
/// exclude is dropped even when an include matched it.
pub fn select(selection: &Selection) -> Result<Vec<PathBuf>, PlanError> {
    let excludes = compile(&selection.exclude)?;
    let mut found = BTreeSet::new();
    for include in &selection.include {
        for entry in glob::glob_with(include, match_options())? {
            let path = entry?;
            if !path.is_file() {
                continue;
            }
            if excludes.iter().any(|p| p.matches_path_with(&path, match_options())) {
                continue;
            }
            found.insert(path);
        }
    }
    Ok(found.into_iter().collect())
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, PlanError> {
    patterns
        .iter()
        .map(|p| Pattern::new(p).map_err(PlanError::from))
        .collect()
}

fn any_matches(patterns: &[String], path: &Path) -> Result<bool, PlanError> {
    for pattern in compile(patterns)? {
        if pattern.matches_path_with(path, match_options()) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `*` stops at `/`, so `media/*` stays non-recursive when used as an exclude.
fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    fn relative(root: &Path, files: Vec<PathBuf>) -> Vec<String> {
        files
            .into_iter()
            .map(|f| f.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    fn layout() -> TempDir {
        let tmp = TempDir::new().unwrap();
        for rel in [
            "index.html",
            "about/team.html",
            "contact.php",
            "support/style.css",
            "support/nested/print.css",
            "support/vendor.min.css",
            "support/global_style.css",
            "support/animation.js",
            "support/app.js",
            "support/lib/jquery.min.js",
            "media/photo.jpg",
            "media/logo.png",
            "media/thumbs/small.jpg",
            "notes.txt",
        ] {
            touch(tmp.path(), rel);
        }
        tmp
    }

    #[test]
    fn plan_covers_every_class() {
        let plan = plan(Path::new("/out"));
        for class in AssetClass::ALL {
            assert!(plan.contains_key(&class), "missing {}", class.name());
        }
    }

    #[test]
    fn plan_is_deterministic() {
        assert_eq!(plan(Path::new("/out")), plan(Path::new("/out")));
    }

    #[test]
    fn plan_escapes_glob_metacharacters_in_root() {
        let plan = plan(Path::new("/exports/site[1]"));
        let markup = &plan[&AssetClass::Markup];
        assert!(markup.include[0].starts_with("/exports/site[[]1[]]/"));
    }

    #[test]
    fn markup_selects_html_and_php_recursively() {
        let tmp = layout();
        let plan = plan(tmp.path());
        let files = relative(tmp.path(), select(&plan[&AssetClass::Markup]).unwrap());
        assert_eq!(files, vec!["about/team.html", "contact.php", "index.html"]);
    }

    #[test]
    fn styles_exclude_minified_and_global_stylesheet() {
        let tmp = layout();
        let plan = plan(tmp.path());
        let files = relative(tmp.path(), select(&plan[&AssetClass::Styles]).unwrap());
        assert_eq!(files, vec!["support/nested/print.css", "support/style.css"]);
    }

    #[test]
    fn global_stylesheet_is_exactly_one_file() {
        let tmp = layout();
        let plan = plan(tmp.path());
        let files = relative(
            tmp.path(),
            select(&plan[&AssetClass::GlobalStylesheet]).unwrap(),
        );
        assert_eq!(files, vec!["support/global_style.css"]);
    }

    #[test]
    fn scripts_exclude_minified() {
        let tmp = layout();
        let plan = plan(tmp.path());
        let files = relative(tmp.path(), select(&plan[&AssetClass::Scripts]).unwrap());
        assert_eq!(files, vec!["support/animation.js", "support/app.js"]);
    }

    #[test]
    fn images_are_not_recursive() {
        let tmp = layout();
        let plan = plan(tmp.path());
        let files = relative(tmp.path(), select(&plan[&AssetClass::Images]).unwrap());
        assert_eq!(files, vec!["media/logo.png", "media/photo.jpg"]);
    }

    #[test]
    fn exclude_dominates_include() {
        let root = Path::new("/out");
        let plan = plan(root);
        for (class, selection) in &plan {
            for exclude in &selection.exclude {
                // Turn each exclude into a concrete path that also matches an include.
                let concrete = exclude.replace("**/", "").replace('*', "sample");
                let path = PathBuf::from(&concrete);
                assert!(
                    !selection.matches(&path).unwrap(),
                    "{} selected excluded path {concrete}",
                    class.name()
                );
            }
        }
    }

    #[test]
    fn styles_and_global_stylesheet_are_disjoint() {
        let plan = plan(Path::new("/out"));
        let global = Path::new("/out/support/global_style.css");
        assert!(plan[&AssetClass::GlobalStylesheet].matches(global).unwrap());
        assert!(!plan[&AssetClass::Styles].matches(global).unwrap());
    }

    #[test]
    fn rerun_outputs_are_never_selected() {
        let tmp = layout();
        touch(tmp.path(), "support/style.min.css");
        touch(tmp.path(), "support/app.min.js");
        touch(tmp.path(), "support/global_style.min.css");
        let plan = plan(tmp.path());
        for class in [AssetClass::Styles, AssetClass::Scripts, AssetClass::GlobalStylesheet] {
            for file in select(&plan[&class]).unwrap() {
                let name = file.file_name().unwrap().to_string_lossy().into_owned();
                assert!(!name.contains(".min."), "{} re-selected {name}", class.name());
            }
        }
    }

    #[test]
    fn missing_directories_select_nothing() {
        let tmp = TempDir::new().unwrap();
        let plan = plan(tmp.path());
        for class in AssetClass::ALL {
            assert!(select(&plan[&class]).unwrap().is_empty());
        }
    }
}
