//! Output naming for minified assets.
//!
//! Minified styles and scripts are written next to their originals under a
//! suffixed name. The suffix goes before the extension:
//!
//! - `support/style.css` → `support/style.min.css`
//! - `support/app.js` → `support/app.min.js`
//! - `support/vendor.min.js` → `support/vendor.min.js` (already suffixed)
//!
//! The markup rewrite stage ([`crate::rewrite`]) hard-codes the same
//! convention textually, so both sides are built from one [`RenamePolicy`].

use std::path::{Path, PathBuf};

/// Suffix marking a minified asset.
pub const MIN_SUFFIX: &str = ".min";

/// Inserts a fixed suffix before the file extension.
///
/// Applying the policy is idempotent: a name that already carries the suffix
/// (once or several times) comes back with exactly one occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePolicy {
    suffix: String,
}

impl Default for RenamePolicy {
    fn default() -> Self {
        Self::new(MIN_SUFFIX)
    }
}

impl RenamePolicy {
    /// Build a policy for `suffix`. A missing leading dot is added.
    pub fn new(suffix: &str) -> Self {
        let suffix = if suffix.starts_with('.') {
            suffix.to_string()
        } else {
            format!(".{suffix}")
        };
        Self { suffix }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Apply the policy to a bare file name.
    ///
    /// - `"style.css"` → `"style.min.css"`
    /// - `"style.min.css"` → `"style.min.css"`
    /// - `"style.min.min.css"` → `"style.min.css"`
    /// - `"LICENSE"` → `"LICENSE.min"`
    pub fn apply(&self, file_name: &str) -> String {
        // `LICENSE.min`: the suffix is the whole tail, there is no real extension.
        let trimmed = self.strip_repeated(file_name);
        if trimmed.len() < file_name.len() {
            return format!("{trimmed}{}", self.suffix);
        }
        let (stem, ext) = split_extension(file_name);
        let stem = self.strip_repeated(stem);
        match ext {
            Some(ext) => format!("{stem}{}.{ext}", self.suffix),
            None => format!("{stem}{}", self.suffix),
        }
    }

    /// Remove every trailing occurrence of the suffix, never emptying `name`.
    fn strip_repeated<'a>(&self, name: &'a str) -> &'a str {
        let mut rest = name;
        while let Some(shorter) = rest.strip_suffix(self.suffix.as_str()) {
            if shorter.is_empty() {
                break;
            }
            rest = shorter;
        }
        rest
    }

    /// Apply the policy to the file name of `path`, keeping its directory.
    pub fn apply_to_path(&self, path: &Path) -> PathBuf {
        let Some(name) = path.file_name() else {
            return path.to_path_buf();
        };
        let renamed = self.apply(&name.to_string_lossy());
        path.with_file_name(renamed)
    }

    /// Whether applying the policy would leave `file_name` as it is.
    pub fn is_applied(&self, file_name: &str) -> bool {
        self.apply(file_name) == file_name
    }
}

/// Split `name` at its last dot. Leading-dot names (`.htaccess`) have no extension.
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(0) | None => (name, None),
        Some(pos) => (&name[..pos], Some(&name[pos + 1..])),
    }
}
