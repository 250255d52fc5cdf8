// src/exec/builtin/clean.rs

use std::sync::Arc;

use anyhow::bail;
use tracing::info;

use crate::exec::transform::{Transform, WorkFuture, WorkRequest};
use crate::fs::{expand_inputs, FileSystem};
use crate::fs::glob::literal_base;

/// Deletes every path listed in `inputs`. Missing paths are fine.
///
/// Glob inputs delete the matching files only; literal inputs delete the
/// whole file or directory tree.
#[derive(Debug, Clone)]
pub struct Clean {
    fs: Arc<dyn FileSystem>,
}

impl Clean {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl Transform for Clean {
    fn run(&self, request: WorkRequest) -> WorkFuture {
        let fs = Arc::clone(&self.fs);
        super::blocking(move || {
            for input in &request.inputs {
                let trimmed = input.trim_start_matches("./").trim_end_matches('/');
                if trimmed.is_empty() || trimmed == "." {
                    bail!("refusing to clean the project root (input '{input}')");
                }

                if literal_base(trimmed).is_some() {
                    let files = expand_inputs(fs.as_ref(), &request.root, &[trimmed.to_string()])?;
                    for file in files {
                        fs.remove_all(&file.path)?;
                    }
                } else {
                    let path = request.resolve(trimmed);
                    if fs.exists(&path) {
                        info!(task = %request.task, path = ?path, "removing");
                    }
                    fs.remove_all(&path)?;
                }
            }
            Ok(())
        })
    }
}
