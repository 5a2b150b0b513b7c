//! Mirroring the export into the output directory.
//!
//! Every later stage edits the output tree in place, so the source export is
//! read exactly once, here. The copy is byte-exact and keeps relative paths;
//! symlinks are followed and written as regular files.

use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// File name of the optional helper page written into the output root.
pub const HELPER_PAGE_NAME: &str = "putzfish.html";

const HELPER_PAGE: &str = include_str!("../assets/putzfish.html");

#[derive(Error, Debug)]
pub enum CopyError {
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CopyError {
    pub fn path(&self) -> &Path {
        match self {
            CopyError::Io { path, .. } => path,
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        CopyError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Remove a previous output tree. Returns whether anything was removed.
pub fn purge(output: &Path) -> Result<bool, CopyError> {
    match fs::remove_dir_all(output) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CopyError::io(output, e)),
    }
}

/// List every regular file under `root` as a path relative to `root`, sorted.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>, CopyError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            CopyError::Io {
                path,
                source: e.into(),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    Ok(files)
}

/// Copy `files` (relative paths from [`list_files`]) from `input` to `output`.
///
/// Directories are created as needed, then the files are copied in parallel.
/// Fails on the first unreadable or unwritable file.
pub fn copy_files(input: &Path, output: &Path, files: &[PathBuf]) -> Result<(), CopyError> {
    fs::create_dir_all(output).map_err(|e| CopyError::io(output, e))?;
    for relative in files {
        if let Some(parent) = relative.parent() {
            let dir = output.join(parent);
            fs::create_dir_all(&dir).map_err(|e| CopyError::io(&dir, e))?;
        }
    }
    files.par_iter().try_for_each(|relative| {
        let source = input.join(relative);
        let target = output.join(relative);
        let bytes = fs::read(&source).map_err(|e| CopyError::io(&source, e))?;
        fs::write(&target, bytes).map_err(|e| CopyError::io(&target, e))
    })
}

/// Write the helper page into `output`, returning its path.
pub fn write_helper_page(output: &Path) -> Result<PathBuf, CopyError> {
    let path = output.join(HELPER_PAGE_NAME);
    fs::write(&path, HELPER_PAGE).map_err(|e| CopyError::io(&path, e))?;
    Ok(path)
}
