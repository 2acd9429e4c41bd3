// src/exec/inputs.rs

//! Temporary input files owned by a session.
//!
//! Uploaded images and other per-request inputs are written into a scratch
//! directory before the worker starts. The files are deleted when the
//! [`StagedInputs`] value is dropped, which the session driver does on every
//! exit path (success, failure, cancellation, timeout, failed launch).

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempPath};
use tracing::debug;

#[derive(Debug, Default)]
pub struct StagedInputs {
    dir: Option<PathBuf>,
    files: Vec<TempPath>,
}

impl StagedInputs {
    /// No inputs; staging will use the system temp directory.
    pub fn none() -> Self {
        Self::default()
    }

    /// Stage files into `dir` (created on first use).
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            files: Vec::new(),
        }
    }

    fn scratch_dir(&self) -> std::io::Result<PathBuf> {
        let dir = self.dir.clone().unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Write `bytes` to a fresh file named `<prefix><random><suffix>`.
    pub fn stage_bytes(
        &mut self,
        prefix: &str,
        suffix: &str,
        bytes: &[u8],
    ) -> std::io::Result<PathBuf> {
        let dir = self.scratch_dir()?;
        let mut file = Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&dir)?;
        file.write_all(bytes)?;
        file.flush()?;

        let path = file.into_temp_path();
        let staged = path.to_path_buf();
        debug!(path = %staged.display(), len = bytes.len(), "staged input file");
        self.files.push(path);
        Ok(staged)
    }

    /// Copy an existing file into the scratch directory, keeping its
    /// extension. The original is left alone.
    pub fn stage_copy(&mut self, src: impl AsRef<Path>) -> std::io::Result<PathBuf> {
        let src = src.as_ref();
        let bytes = std::fs::read(src)?;
        let suffix = src
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        self.stage_bytes("input_", &suffix, &bytes)
    }

    /// Take ownership of a file created elsewhere; it is deleted with the
    /// other staged inputs.
    pub fn adopt(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = TempPath::from_path(path.into());
        let owned = path.to_path_buf();
        self.files.push(path);
        owned
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|p| p.to_path_buf()).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
