//! Input discovery.
//!
//! Walks a directory tree and returns every file whose extension is
//! recognised, sorted by path so planning is deterministic. Matching is
//! case-insensitive; unrecognised files are silently ignored, never
//! reported as errors.
//!
//! Hidden entries (name starting with `.`) are skipped. This keeps macOS
//! `._IMG_0001.JPG` resource forks and our own `.name.part` temp files out
//! of the job.

use crate::types::InputFormat;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to read input tree: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Input is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("Output directory is the input directory: {}", .0.display())]
    OutputIsInput(PathBuf),
}

/// One discovered input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputAsset {
    /// Path as found during the walk (rooted at the input directory).
    pub path: PathBuf,
    /// Path relative to the input directory.
    pub relative: PathBuf,
    pub format: InputFormat,
}

/// All recognised images under `root`, sorted by path.
///
/// `exclude` names a directory to skip entirely, typically the output
/// directory when it lives inside the input tree.
pub fn discover(root: &Path, exclude: Option<&Path>) -> Result<Vec<InputAsset>, ScanError> {
    let files = find_files(root, exclude, |p| InputFormat::from_path(p).is_some())?;
    Ok(files
        .into_iter()
        .filter_map(|path| {
            let format = InputFormat::from_path(&path)?;
            let relative = path.strip_prefix(root).ok()?.to_path_buf();
            Some(InputAsset {
                path,
                relative,
                format,
            })
        })
        .collect())
}

/// Fail when `output` resolves to the same directory as `input`.
///
/// A missing output directory can't be the input, so only paths that
/// already exist are compared.
pub fn ensure_distinct_output(input: &Path, output: &Path) -> Result<(), ScanError> {
    match (input.canonicalize(), output.canonicalize()) {
        (Ok(a), Ok(b)) if a == b => Err(ScanError::OutputIsInput(output.to_path_buf())),
        _ => Ok(()),
    }
}

/// Every regular file under `root` accepted by `accept`, sorted by path.
pub fn find_files(
    root: &Path,
    exclude: Option<&Path>,
    accept: impl Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    let excluded = exclude.and_then(|p| p.canonicalize().ok());
    let keep = |entry: &DirEntry| {
        if entry.depth() == 0 {
            return true;
        }
        if is_hidden(entry) {
            return false;
        }
        match &excluded {
            Some(ex) if entry.file_type().is_dir() => {
                entry.path().canonicalize().map_or(true, |p| &p != ex)
            }
            _ => true,
        }
    };

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name().into_iter().filter_entry(keep) {
        let entry = entry?;
        if entry.file_type().is_file() && accept(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}
