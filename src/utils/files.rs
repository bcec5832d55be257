//! Input discovery and file naming helpers.

use crate::core::error::{BatchError, ConfigError};
use crate::core::types::ImageFormat;
use log::{debug, info, warn};
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

fn ensure_dir(dir: &Path) -> io::Result<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Directory not found: {}", dir.display()),
        ))
    }
}

/// Files under `dir` whose extension is one of `extensions`.
///
/// Extensions match case-insensitively, with or without a leading dot.
/// Results are sorted by path.
pub fn files_by_extension(
    dir: impl AsRef<Path>,
    extensions: &[&str],
    recursive: bool,
) -> io::Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    ensure_dir(dir)?;

    let wanted: HashSet<String> = extensions
        .iter()
        .map(|ext| ext.trim_start_matches('.').to_lowercase())
        .collect();
    let max_depth = if recursive { usize::MAX } else { 1 };

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| wanted.contains(&e.to_lowercase()))
            .unwrap_or(false);
        if matches {
            files.push(entry.into_path());
        }
    }

    files.sort();
    debug!("Found {} file(s) in {}", files.len(), dir.display());
    Ok(files)
}

/// Every file under `dir` with a supported image extension.
pub fn find_images(dir: impl AsRef<Path>, recursive: bool) -> io::Result<Vec<PathBuf>> {
    files_by_extension(dir, &ImageFormat::EXTENSIONS, recursive)
}

/// Expand glob patterns into a de-duplicated file list.
///
/// Order follows the patterns, then the glob's own (alphabetical) order.
/// A pattern that matches no file is an error.
pub fn expand_globs<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<PathBuf>, BatchError> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for pattern in patterns {
        let pattern = pattern.as_ref();
        let paths = glob::glob(pattern).map_err(|e| BatchError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        let mut matched = 0;
        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => {
                    matched += 1;
                    if seen.insert(path.clone()) {
                        files.push(path);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable path {}: {}", e.path().display(), e.error()),
            }
        }

        if matched == 0 {
            return Err(BatchError::NoInputsFound {
                pattern: pattern.to_string(),
            });
        }
    }

    Ok(files)
}

/// How file names are rewritten by [`plan_renames`].
#[derive(Debug, Clone)]
pub enum RenameRule {
    /// Replace every occurrence of a literal substring.
    Literal {
        /// Substring to look for. Empty matches nothing.
        pattern: String,
        /// Text put in its place.
        replacement: String,
    },
    /// Replace every regex match.
    Regex {
        /// Compiled pattern.
        regex: Regex,
        /// Replacement; may refer to groups as `${1}` or `${name}`.
        replacement: String,
    },
}

impl RenameRule {
    /// Literal substring rule.
    pub fn literal(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        RenameRule::Literal {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }

    /// Regex rule. Fails if `pattern` does not compile.
    pub fn regex(pattern: &str, replacement: impl Into<String>) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidValue {
            key: "rename.pattern".to_string(),
            message: e.to_string(),
        })?;
        Ok(RenameRule::Regex {
            regex,
            replacement: replacement.into(),
        })
    }

    /// Rewrite one file name.
    pub fn apply(&self, name: &str) -> String {
        match self {
            RenameRule::Literal {
                pattern,
                replacement,
            } => {
                if pattern.is_empty() {
                    name.to_string()
                } else {
                    name.replace(pattern.as_str(), replacement)
                }
            }
            RenameRule::Regex { regex, replacement } => {
                regex.replace_all(name, replacement.as_str()).into_owned()
            }
        }
    }
}

/// One planned rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    /// Current path.
    pub from: PathBuf,
    /// New path.
    pub to: PathBuf,
}

/// Plan renames of the file names of `files`; nothing is touched on disk.
///
/// Only the final path component is rewritten; files stay in their directory.
pub fn plan_renames<P: AsRef<Path>>(files: &[P], rule: &RenameRule) -> Vec<Rename> {
    files
        .iter()
        .map(|file| {
            let from = file.as_ref().to_path_buf();
            let name = from
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let to = from.with_file_name(rule.apply(&name));
            Rename { from, to }
        })
        .collect()
}

/// Result of applying one [`Rename`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    /// The file was moved.
    Renamed,
    /// The new name equals the old one.
    Unchanged,
    /// Something already exists at the destination; it was left alone.
    DestinationExists,
    /// The rename itself failed; holds the error message.
    Failed(String),
}

/// Apply a rename plan in order, never overwriting existing files.
pub fn apply_renames(plan: &[Rename]) -> Vec<RenameOutcome> {
    let outcomes: Vec<RenameOutcome> = plan
        .iter()
        .map(|rename| {
            if rename.from == rename.to {
                return RenameOutcome::Unchanged;
            }
            if rename.to.exists() {
                warn!(
                    "Not renaming {}: {} already exists",
                    rename.from.display(),
                    rename.to.display()
                );
                return RenameOutcome::DestinationExists;
            }
            match fs::rename(&rename.from, &rename.to) {
                Ok(()) => RenameOutcome::Renamed,
                Err(e) => RenameOutcome::Failed(e.to_string()),
            }
        })
        .collect();

    let renamed = outcomes
        .iter()
        .filter(|o| **o == RenameOutcome::Renamed)
        .count();
    info!("Renamed {} of {} file(s)", renamed, plan.len());
    outcomes
}

/// One sequential name per file currently in `dir`.
///
/// Names look like `img001.jpg` for base `img`, extension `jpg`, start 1 and
/// padding 3. Numbers wider than `padding` are not truncated.
pub fn sequential_names(
    dir: impl AsRef<Path>,
    base_name: &str,
    extension: &str,
    start: usize,
    padding: usize,
) -> io::Result<Vec<String>> {
    let dir = dir.as_ref();
    ensure_dir(dir)?;

    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        if entry?.file_type()?.is_file() {
            count += 1;
        }
    }

    let extension = extension.trim_start_matches('.');
    Ok((start..start + count)
        .map(|n| format!("{}{:0width$}.{}", base_name, n, extension, width = padding))
        .collect())
}
