// src/fs/glob.rs

//! Expansion of input path patterns into concrete files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};

use super::FileSystem;

/// A file selected by an input pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// Absolute (root-joined) path of the file.
    pub path: PathBuf,
    /// Path below the pattern's literal base, used to lay out outputs.
    ///
    /// For `src/js/*/*.js` matching `src/js/views/app.js` this is
    /// `views/app.js`.
    pub relative: PathBuf,
}

const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Expand `patterns` (relative to `root`) into the files they select.
///
/// - `*` does not cross `/`; `**` does.
/// - Patterns starting with `!` exclude matches of the other patterns.
/// - A pattern without glob characters names a file, or a directory whose
///   files are all selected.
///
/// Results are sorted by path and contain no duplicates.
pub fn expand_inputs(
    fs: &dyn FileSystem,
    root: &Path,
    patterns: &[String],
) -> Result<Vec<InputFile>> {
    let (negated, positive): (Vec<&String>, Vec<&String>) =
        patterns.iter().partition(|p| p.starts_with('!'));

    let excludes = build_exclude_set(&negated)?;
    let mut selected: BTreeMap<PathBuf, InputFile> = BTreeMap::new();

    for pattern in positive {
        let pattern = pattern.trim_start_matches("./");
        match literal_base(pattern) {
            None => {
                let path = root.join(pattern);
                if fs.is_file(&path) {
                    let relative = path
                        .file_name()
                        .map(PathBuf::from)
                        .unwrap_or_else(|| path.clone());
                    insert_unless_excluded(&mut selected, root, &excludes, path, relative);
                } else if fs.is_dir(&path) {
                    for file in walk_files(fs, &path)? {
                        let relative = file.strip_prefix(&path).unwrap_or(&file).to_path_buf();
                        insert_unless_excluded(&mut selected, root, &excludes, file, relative);
                    }
                }
            }
            Some(base) => {
                let matcher = compile(pattern)?;
                let base_dir = root.join(&base);
                if !fs.is_dir(&base_dir) {
                    continue;
                }
                for file in walk_files(fs, &base_dir)? {
                    let Some(rel_root) = root_relative(root, &file) else {
                        continue;
                    };
                    if !matcher.is_match(&rel_root) {
                        continue;
                    }
                    let relative = file
                        .strip_prefix(&base_dir)
                        .unwrap_or(&file)
                        .to_path_buf();
                    insert_unless_excluded(&mut selected, root, &excludes, file, relative);
                }
            }
        }
    }

    Ok(selected.into_values().collect())
}

/// Literal leading directory of a glob pattern, or `None` if the pattern has
/// no glob characters at all.
pub fn literal_base(pattern: &str) -> Option<String> {
    if !pattern.contains(GLOB_META) {
        return None;
    }
    let literal: Vec<&str> = pattern
        .split('/')
        .take_while(|component| !component.contains(GLOB_META))
        .collect();
    Some(literal.join("/"))
}

fn compile(pattern: &str) -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .with_context(|| format!("invalid glob pattern: {pattern}"))?;
    Ok(glob.compile_matcher())
}

fn build_exclude_set(negated: &[&String]) -> Result<Option<GlobSet>> {
    if negated.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pat in negated {
        let pat = pat.trim_start_matches('!').trim_start_matches("./");
        let glob = GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid glob pattern: !{pat}"))?;
        builder.add(glob);
    }
    Ok(Some(builder.build()?))
}

fn insert_unless_excluded(
    selected: &mut BTreeMap<PathBuf, InputFile>,
    root: &Path,
    excludes: &Option<GlobSet>,
    path: PathBuf,
    relative: PathBuf,
) {
    if let (Some(excludes), Some(rel_root)) = (excludes, root_relative(root, &path)) {
        if excludes.is_match(&rel_root) {
            return;
        }
    }
    selected
        .entry(path.clone())
        .or_insert(InputFile { path, relative });
}

/// Path relative to `root` with forward slashes.
fn root_relative(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
}

/// Every file below `dir`, recursively.
fn walk_files(fs: &dyn FileSystem, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for path in fs.read_dir(&dir)? {
            if fs.is_dir(&path) {
                stack.push(path);
            } else if fs.is_file(&path) {
                files.push(path);
            }
        }
    }

    Ok(files)
}
