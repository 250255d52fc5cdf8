// src/exec/builtin/copy.rs

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::exec::transform::{Transform, WorkFuture, WorkRequest};
use crate::fs::{expand_inputs, FileSystem};

/// Copies files matching `inputs` into `output_dir`, keeping each file's
/// path below its pattern's literal base. With `extension` set, copied files
/// get that extension instead of their own.
#[derive(Debug, Clone)]
pub struct CopyFiles {
    fs: Arc<dyn FileSystem>,
}

impl CopyFiles {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl Transform for CopyFiles {
    fn run(&self, request: WorkRequest) -> WorkFuture {
        let fs = Arc::clone(&self.fs);
        let out = match request.output_path() {
            Ok(out) => out,
            Err(err) => return Box::pin(async move { Err::<(), _>(err) }),
        };

        super::blocking(move || {
            let files = expand_inputs(fs.as_ref(), &request.root, &request.inputs)?;
            if files.is_empty() {
                warn!(task = %request.task, inputs = ?request.inputs, "no input files matched");
            }

            for file in files {
                let mut relative: PathBuf = file.relative.clone();
                if let Some(ext) = &request.options.extension {
                    relative.set_extension(ext.trim_start_matches('.'));
                }
                let dest = out.join(&relative);
                debug!(task = %request.task, from = ?file.path, to = ?dest, "copying");
                let bytes = fs.read(&file.path)?;
                fs.write(&dest, &bytes)?;
            }
            Ok(())
        })
    }
}
