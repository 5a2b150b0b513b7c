//! Unused-selector pruning for the global stylesheet.
//!
//! The global stylesheet of an export carries the styles for every page of
//! the site, most of them unused by any given export. This module removes the
//! selectors that no markup document can match and minifies what is left.
//!
//! ## Matching
//!
//! Markup is scanned once (tl parser) for the class names, ids and element
//! names it uses. A selector is kept when every class, id and element it
//! mentions was seen:
//!
//! ```text
//! markup: <div class="card"><h2 id="title">…</h2></div>
//!
//! .card h2          kept
//! .card #title      kept
//! .card.featured    removed   (no element has class "featured")
//! table td          removed   (no <table>)
//! a:hover           removed   (no <a>; pseudo-classes are not consulted)
//! :root             kept      (no class/id/element constraint)
//! ```
//!
//! Pseudo-classes, pseudo-elements and attribute selectors never cause a
//! removal. Selectors are read from the parsed stylesheet, so escaped
//! identifiers (`.md\:flex`) compare in their decoded form. A rule keeps
//! whichever selectors of its list survive; a rule with none left is
//! dropped. Grouping blocks (`@media`, `@supports`, `@layer`, `@container`,
//! `@scope`, `@starting-style`) and nested style rules are pruned
//! recursively and dropped when left empty. Other at-rules (`@font-face`,
//! `@keyframes`, …) are untouched.
//!
//! ## Ignore list
//!
//! Some selectors are only ever applied by scripts at runtime (overlays,
//! lightbox containers with generated ids) and cannot be found in markup.
//! [`IgnorePattern`]s preserve them unconditionally. Entries written as
//! `/regex/` are regular expressions tested against the selector text; all
//! others are literal and match the whole selector or one of its
//! `.class`/`#id`/element parts.
//!
//! ## Timeout
//!
//! [`prune_with_timeout`] runs the analysis on a worker thread and gives up
//! with [`PruneError::Timeout`] when the bound is exceeded.

use crate::minify::{self, MinifyError};
use lightningcss::rules::style::StyleRule;
use lightningcss::rules::{CssRule, CssRuleList};
use lightningcss::selector::{Component, Selector};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::traits::ToCss;
use rayon::prelude::*;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use thiserror::Error;

/// Elements every HTML document has, whether or not the markup spells them out.
const IMPLIED_ELEMENTS: &[&str] = &["html", "head", "body"];

#[derive(Error, Debug)]
pub enum PruneError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot parse markup {}: {message}", .path.display())]
    Markup { path: PathBuf, message: String },
    #[error(transparent)]
    Minify(#[from] MinifyError),
    #[error("Unused-selector analysis exceeded {0:?}")]
    Timeout(Duration),
    #[error("Unused-selector analysis worker exited without a result")]
    WorkerLost,
}

/// A selector the pruner must keep even when no markup uses it.
#[derive(Debug, Clone)]
pub enum IgnorePattern {
    Literal(String),
    Regex(Regex),
}

impl IgnorePattern {
    /// Parse a config entry. `/…/` is a regex, anything else a literal.
    pub fn parse(entry: &str) -> Result<Self, regex::Error> {
        let entry = entry.trim();
        if entry.len() > 2 && entry.starts_with('/') && entry.ends_with('/') {
            Ok(Self::Regex(Regex::new(&entry[1..entry.len() - 1])?))
        } else {
            Ok(Self::Literal(entry.to_string()))
        }
    }

    fn matches(&self, selector: &str, names: &SelectorNames) -> bool {
        match self {
            Self::Regex(re) => re.is_match(selector),
            Self::Literal(literal) => {
                selector.trim() == literal
                    || names.classes.iter().any(|c| literal.strip_prefix('.') == Some(c.as_str()))
                    || names.ids.iter().any(|id| literal.strip_prefix('#') == Some(id.as_str()))
                    || names.elements.iter().any(|e| e.eq_ignore_ascii_case(literal))
            }
        }
    }
}

/// Class names, ids and element names found in markup.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UsedNames {
    classes: HashSet<String>,
    ids: HashSet<String>,
    elements: HashSet<String>,
}

impl UsedNames {
    /// Collect names from one markup document.
    pub fn from_markup(markup: &str) -> Result<Self, tl::ParseError> {
        let dom = tl::parse(markup, tl::ParserOptions::default())?;
        let mut used = Self::default();
        for node in dom.nodes() {
            let Some(tag) = node.as_tag() else {
                continue;
            };
            used.elements
                .insert(tag.name().as_utf8_str().to_ascii_lowercase());
            for (key, value) in tag.attributes().iter() {
                let Some(value) = value else {
                    continue;
                };
                let key: &str = key.as_ref();
                if key.eq_ignore_ascii_case("class") {
                    used.classes
                        .extend(value.split_whitespace().map(str::to_string));
                } else if key.eq_ignore_ascii_case("id") {
                    let id = value.trim();
                    if !id.is_empty() {
                        used.ids.insert(id.to_string());
                    }
                }
            }
        }
        Ok(used)
    }

    pub fn merge(&mut self, other: UsedNames) {
        self.classes.extend(other.classes);
        self.ids.extend(other.ids);
        self.elements.extend(other.elements);
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains(name)
    }

    pub fn has_id(&self, name: &str) -> bool {
        self.ids.contains(name)
    }

    fn has_element(&self, name: &str) -> bool {
        IMPLIED_ELEMENTS.contains(&name) || self.elements.contains(name)
    }

    fn covers(&self, names: &SelectorNames) -> bool {
        names.classes.iter().all(|c| self.has_class(c))
            && names.ids.iter().all(|id| self.has_id(id))
            && names.elements.iter().all(|e| self.has_element(e))
    }
}

/// Collect [`UsedNames`] from every document, in parallel.
pub fn collect_used(documents: &[PathBuf]) -> Result<UsedNames, PruneError> {
    documents
        .par_iter()
        .map(|path| {
            let bytes = fs::read(path).map_err(|source| PruneError::Io {
                path: path.clone(),
                source,
            })?;
            let text = String::from_utf8_lossy(&bytes);
            UsedNames::from_markup(&text).map_err(|e| PruneError::Markup {
                path: path.clone(),
                message: e.to_string(),
            })
        })
        .try_reduce(UsedNames::default, |mut acc, next| {
            acc.merge(next);
            Ok(acc)
        })
}

/// The class, id and element constraints of one selector.
#[derive(Debug, Default, PartialEq, Eq)]
struct SelectorNames {
    classes: Vec<String>,
    ids: Vec<String>,
    elements: Vec<String>,
}

/// Collect the names a parsed selector constrains on.
///
/// Only top-level compounds count: the arguments of `:not()`, `:is()` and
/// other functional pseudo-classes are not consulted.
fn selector_names(selector: &Selector<'_>) -> SelectorNames {
    let mut names = SelectorNames::default();
    for component in selector.iter_raw_match_order() {
        match component {
            Component::Class(ident) => names.classes.push(ident.0.to_string()),
            Component::ID(ident) => names.ids.push(ident.0.to_string()),
            Component::LocalName(local) => names.elements.push(local.lower_name.0.to_string()),
            _ => {}
        }
    }
    names
}

fn is_preserved(selector: &Selector<'_>, used: &UsedNames, ignore: &[IgnorePattern]) -> bool {
    let names = selector_names(selector);
    if used.covers(&names) {
        return true;
    }
    if ignore.is_empty() {
        return false;
    }
    // A selector that cannot be printed is kept rather than guessed at.
    match selector.to_css_string(PrinterOptions::default()) {
        Ok(text) => ignore.iter().any(|p| p.matches(&text, &names)),
        Err(_) => true,
    }
}

/// Outcome of pruning one stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneReport {
    /// Pruned and minified stylesheet.
    pub css: String,
    /// Selectors kept, counted before minification merges rules.
    pub kept: usize,
    pub removed: usize,
}

#[derive(Default)]
struct Counts {
    kept: usize,
    removed: usize,
}

/// Remove unused selectors from `css`, then minify the remainder.
pub fn prune_stylesheet(
    css: &str,
    used: &UsedNames,
    ignore: &[IgnorePattern],
) -> Result<PruneReport, MinifyError> {
    let mut sheet = StyleSheet::parse(css, ParserOptions::default())
        .map_err(|e| MinifyError::Css(e.to_string()))?;
    let mut counts = Counts::default();
    prune_rules(
        &mut sheet.rules,
        &|selector| is_preserved(selector, used, ignore),
        &mut counts,
    );
    let css = minify::print_minified(sheet)?;
    Ok(PruneReport {
        css,
        kept: counts.kept,
        removed: counts.removed,
    })
}

fn prune_rules(
    rules: &mut CssRuleList<'_>,
    keep: &dyn Fn(&Selector<'_>) -> bool,
    counts: &mut Counts,
) {
    rules.0.retain_mut(|rule| match rule {
        CssRule::Style(style) => prune_style(style, keep, counts),
        CssRule::Nesting(nesting) => prune_style(&mut nesting.style, keep, counts),
        CssRule::Media(media) => prune_block(&mut media.rules, keep, counts),
        CssRule::Supports(supports) => prune_block(&mut supports.rules, keep, counts),
        CssRule::LayerBlock(layer) => prune_block(&mut layer.rules, keep, counts),
        CssRule::Container(container) => prune_block(&mut container.rules, keep, counts),
        CssRule::Scope(scope) => prune_block(&mut scope.rules, keep, counts),
        CssRule::StartingStyle(starting) => prune_block(&mut starting.rules, keep, counts),
        _ => true,
    });
}

/// Prune a style rule's selector list. Returns whether any selector is left.
fn prune_style(
    style: &mut StyleRule<'_>,
    keep: &dyn Fn(&Selector<'_>) -> bool,
    counts: &mut Counts,
) -> bool {
    style.selectors.0.retain(|selector| {
        let kept = keep(selector);
        if kept {
            counts.kept += 1;
        } else {
            counts.removed += 1;
        }
        kept
    });
    if style.selectors.0.is_empty() {
        return false;
    }
    prune_rules(&mut style.rules, keep, counts);
    true
}

/// Prune a conditional or grouping block. Returns whether any rule is left.
fn prune_block(
    rules: &mut CssRuleList<'_>,
    keep: &dyn Fn(&Selector<'_>) -> bool,
    counts: &mut Counts,
) -> bool {
    prune_rules(rules, keep, counts);
    !rules.0.is_empty()
}

/// Settings for [`prune_with_timeout`].
#[derive(Debug, Clone)]
pub struct PruneOptions {
    pub ignore: Vec<IgnorePattern>,
    pub timeout: Duration,
}

/// Prune `stylesheet` against `documents` on a worker thread bounded by `options.timeout`.
///
/// Reading the markup, matching and minifying all count against the bound.
/// On timeout the worker is abandoned; its result is discarded.
pub fn prune_with_timeout(
    stylesheet: &Path,
    documents: &[PathBuf],
    options: &PruneOptions,
) -> Result<PruneReport, PruneError> {
    let stylesheet = stylesheet.to_path_buf();
    let documents = documents.to_vec();
    let ignore = options.ignore.clone();
    run_bounded(options.timeout, move || {
        let used = collect_used(&documents)?;
        let css = fs::read_to_string(&stylesheet).map_err(|source| PruneError::Io {
            path: stylesheet.clone(),
            source,
        })?;
        Ok(prune_stylesheet(&css, &used, &ignore)?)
    })
}

/// Run `job` on its own thread, waiting at most `timeout` for its result.
fn run_bounded<T, F>(timeout: Duration, job: F) -> Result<T, PruneError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PruneError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(job());
    });
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(PruneError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(PruneError::WorkerLost),
    }
}
