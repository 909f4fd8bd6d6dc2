//! Transient source files

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A source file that lives exactly as long as one invocation.
///
/// The file is removed when the value is dropped, which covers normal
/// returns, early `?` returns, timeouts and panics alike. A failed removal
/// is logged and otherwise ignored.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
}

impl Artifact {
    /// Create `luma-<uuid>.<extension>` inside `dir` and write `source` to it.
    ///
    /// Uses create-new semantics so an existing file is never reused.
    pub fn create(dir: &Path, extension: &str, source: &str) -> std::io::Result<Self> {
        let name = format!("luma-{}.{}", uuid::Uuid::new_v4(), extension);
        let path = dir.join(name);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;

        // From here on the file exists, so hand ownership to the guard
        // before anything else can fail.
        let artifact = Self { path };
        file.write_all(source.as_bytes())?;
        file.flush()?;

        tracing::debug!(path = %artifact.path.display(), bytes = source.len(), "artifact written");
        Ok(artifact)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "artifact removed"),
            Err(e) => tracing::debug!(path = %self.path.display(), error = %e, "artifact removal failed"),
        }
    }
}
