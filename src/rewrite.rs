//! Markup reference rewriting.
//!
//! After the minify stages have written `*.min.css` / `*.min.js` files, every
//! markup file is passed through an ordered list of substitutions that point
//! its stylesheet and script references at the minified names. This is a
//! blind text substitution: the filesystem is never consulted.
//!
//! ## Default rules
//!
//! ```text
//! 1. \.css\b          → .min.css
//! 2. \.js\b           → .min.js
//! 3. (?:\.min){2,}\.  → .min.
//! ```
//!
//! Rules 1 and 2 also hit references that were already minified in the
//! source export (`jquery.min.js` → `jquery.min.min.js`); rule 3 collapses
//! those back. Because of rule 3 the composed list is a fixed point:
//! rewriting already-rewritten markup changes nothing.
//!
//! Rules operate on raw bytes so legacy markup in non-UTF-8 encodings is
//! rewritten without a lossy decode.

use crate::naming::RenamePolicy;
use regex::bytes::{NoExpand, Regex};
use std::borrow::Cow;

/// One substitution: every match of `pattern` becomes `replacement`.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: Regex,
    replacement: Vec<u8>,
}

impl RewriteRule {
    /// Substitute every literal occurrence of `find`.
    pub fn literal(find: &str, replacement: &str) -> Self {
        Self {
            pattern: Regex::new(&regex::escape(find)).expect("escaped literal is a valid regex"),
            replacement: replacement.as_bytes().to_vec(),
        }
    }

    /// Substitute every match of `pattern`. The replacement is inserted verbatim.
    pub fn pattern(pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.as_bytes().to_vec(),
        })
    }

    pub fn apply<'a>(&self, content: &'a [u8]) -> Cow<'a, [u8]> {
        self.pattern.replace_all(content, NoExpand(&self.replacement))
    }
}

/// An ordered list of [`RewriteRule`]s applied in sequence.
#[derive(Debug, Clone)]
pub struct RewriteRules {
    rules: Vec<RewriteRule>,
}

impl RewriteRules {
    pub fn new(rules: Vec<RewriteRule>) -> Self {
        Self { rules }
    }

    /// The stylesheet/script rules for `policy`, followed by the collapse rule.
    pub fn for_policy(policy: &RenamePolicy) -> Self {
        let suffix = policy.suffix();
        let escaped = regex::escape(suffix);
        let mut rules = Vec::with_capacity(3);
        for ext in ["css", "js"] {
            rules.push(RewriteRule {
                pattern: Regex::new(&format!(r"\.{ext}(?-u:\b)"))
                    .expect("extension pattern is valid"),
                replacement: format!("{suffix}.{ext}").into_bytes(),
            });
        }
        rules.push(RewriteRule {
            pattern: Regex::new(&format!(r"(?:{escaped}){{2,}}\."))
                .expect("collapse pattern is valid"),
            replacement: format!("{suffix}.").into_bytes(),
        });
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule over `content`. Borrows when nothing matched.
    pub fn apply<'a>(&self, content: &'a [u8]) -> Cow<'a, [u8]> {
        let mut current = Cow::Borrowed(content);
        for rule in &self.rules {
            let next = match rule.apply(&current) {
                Cow::Borrowed(_) => continue,
                Cow::Owned(bytes) => bytes,
            };
            current = Cow::Owned(next);
        }
        current
    }

    /// Convenience wrapper for UTF-8 text.
    pub fn apply_str(&self, content: &str) -> String {
        String::from_utf8_lossy(&self.apply(content.as_bytes())).into_owned()
    }
}

impl Default for RewriteRules {
    fn default() -> Self {
        Self::for_policy(&RenamePolicy::default())
    }
}
