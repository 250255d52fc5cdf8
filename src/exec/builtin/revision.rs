// src/exec/builtin/revision.rs

//! Cache-busting: content-hashed filenames plus the manifest that maps
//! original names to hashed ones, and the rewrite step that consumes it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::exec::transform::{Transform, WorkFuture, WorkRequest};
use crate::fs::{expand_inputs, FileSystem};

/// Length of the hex content hash inserted into filenames.
pub const HASH_LEN: usize = 10;

/// Extensions whose contents `rev-replace` rewrites.
const TEXT_EXTENSIONS: &[&str] = &["html", "htm", "css", "js", "json", "svg", "txt", "xml"];

/// Original relative path -> revisioned relative path (forward slashes).
pub type Manifest = BTreeMap<String, String>;

/// `app.css` + hash -> `app-<hash>.css`; `LICENSE` + hash -> `LICENSE-<hash>`.
pub fn revisioned_name(relative: &Path, hash: &str) -> PathBuf {
    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match relative.extension() {
        Some(ext) => format!("{stem}-{hash}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{hash}"),
    };
    relative.with_file_name(file_name)
}

/// First [`HASH_LEN`] hex characters of the blake3 hash of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let hex = blake3::hash(bytes).to_hex();
    hex.as_str()[..HASH_LEN].to_string()
}

fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Copies inputs into `output_dir` under content-hashed names and writes the
/// manifest. With `cache_busting = false` names are kept and the manifest is
/// the identity mapping.
#[derive(Debug, Clone)]
pub struct Revision {
    fs: Arc<dyn FileSystem>,
}

impl Revision {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl Transform for Revision {
    fn run(&self, request: WorkRequest) -> WorkFuture {
        let fs = Arc::clone(&self.fs);
        super::blocking(move || revision(fs.as_ref(), &request))
    }
}

fn revision(fs: &dyn FileSystem, request: &WorkRequest) -> Result<()> {
    let out = request.output_path()?;
    let manifest_path = request.manifest_path()?;
    let cache_busting = request.options.cache_busting();

    let mut manifest = Manifest::new();
    for file in expand_inputs(fs, &request.root, &request.inputs)? {
        let bytes = fs.read(&file.path)?;
        let target = if cache_busting {
            revisioned_name(&file.relative, &content_hash(&bytes))
        } else {
            file.relative.clone()
        };

        debug!(task = %request.task, from = ?file.relative, to = ?target, "revisioning");
        fs.write(&out.join(&target), &bytes)?;
        manifest.insert(slash_path(&file.relative), slash_path(&target));
    }

    let json = serde_json::to_string_pretty(&manifest).context("serialising manifest")?;
    fs.write(&manifest_path, json.as_bytes())?;
    info!(
        task = %request.task,
        entries = manifest.len(),
        manifest = ?manifest_path,
        "wrote revision manifest"
    );
    Ok(())
}

/// Load a manifest written by [`Revision`].
pub fn load_manifest(fs: &dyn FileSystem, path: &Path) -> Result<Manifest> {
    let contents = fs
        .read_to_string(path)
        .with_context(|| format!("reading manifest {:?}", path))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing manifest {:?}", path))
}

/// Replace every manifest key in `text` with its revisioned value.
///
/// Longer keys are replaced first so `js/app.js` wins over `app.js`.
pub fn rewrite_references(text: &str, manifest: &Manifest) -> String {
    let mut entries: Vec<(&String, &String)> =
        manifest.iter().filter(|(from, to)| from != to).collect();
    entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

    // Two passes through placeholders so a replaced value is never rewritten
    // again by a shorter key.
    let mut out = text.to_string();
    for (idx, (from, _)) in entries.iter().enumerate() {
        out = out.replace(from.as_str(), &format!("\u{0}{idx}\u{0}"));
    }
    for (idx, (_, to)) in entries.iter().enumerate() {
        out = out.replace(&format!("\u{0}{idx}\u{0}"), to);
    }
    out
}

/// Rewrites references in text files matching `inputs` using the manifest.
/// Files are written under `output_dir` when set, otherwise in place.
#[derive(Debug, Clone)]
pub struct RevReplace {
    fs: Arc<dyn FileSystem>,
}

impl RevReplace {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl Transform for RevReplace {
    fn run(&self, request: WorkRequest) -> WorkFuture {
        let fs = Arc::clone(&self.fs);
        super::blocking(move || rev_replace(fs.as_ref(), &request))
    }
}

fn rev_replace(fs: &dyn FileSystem, request: &WorkRequest) -> Result<()> {
    let manifest_path = request.manifest_path()?;
    let manifest = load_manifest(fs, &manifest_path)?;
    let out = request.output_dir.as_ref().map(|dir| request.resolve(dir));

    let mut rewritten = 0usize;
    for file in expand_inputs(fs, &request.root, &request.inputs)? {
        if file.path == manifest_path || !is_text_file(&file.path) {
            continue;
        }
        let text = fs.read_to_string(&file.path)?;
        let updated = rewrite_references(&text, &manifest);
        let dest = match &out {
            Some(dir) => dir.join(&file.relative),
            None => file.path.clone(),
        };
        if updated != text || dest != file.path {
            fs.write(&dest, updated.as_bytes())?;
            rewritten += 1;
        }
    }

    info!(task = %request.task, rewritten, "rewrote revisioned references");
    Ok(())
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
