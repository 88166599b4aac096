use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};

pub const SUPPORTED_EXTENSIONS: &[&str] = &["md", "mdx", "txt", "rst"];

/// Dependency and build directories that never hold source documents.
pub const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "dist",
    "build",
    "vendor",
    "venv",
    "__pycache__",
    "site-packages",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Canonical absolute path.
    pub path: PathBuf,
    /// `path` as a string; the source identity in the store, so the same
    /// file keeps one identity whichever root it was reached from.
    pub source_path: String,
    /// Path relative to the scan root with `/` separators, for display.
    pub relative_path: String,
    pub extension: String,
    pub size: u64,
}

pub fn is_eligible(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIP_DIRS.contains(&name.as_ref())
}

/// Absolute form of a path used as a source identity.
pub fn source_identity(path: &Path) -> Result<String> {
    Ok(path.canonicalize()?.to_string_lossy().into_owned())
}

/// Recursively collect eligible documents under `root`, sorted by relative path.
pub fn scan_directory(root: &Path) -> Result<Vec<SourceFile>> {
    if !root.is_dir() {
        return Err(Error::Validation(format!(
            "not a directory: {}",
            root.display()
        )));
    }
    let root = root.canonicalize()?;
    let root = root.as_path();

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_eligible(entry.path()) {
            continue;
        }

        let path = entry.path();
        let relative_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);

        files.push(SourceFile {
            path: path.to_path_buf(),
            source_path: path.to_string_lossy().into_owned(),
            relative_path,
            extension,
            size,
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    debug!(root = %root.display(), files = files.len(), "scan complete");
    Ok(files)
}
