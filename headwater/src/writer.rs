//! Scoped output for encoded artifacts.
//!
//! Lines go to a temporary file next to the destination. [`SampleWriter::finish`]
//! flushes it into a [`StagedArtifact`], and [`commit_all`] renames a set of
//! staged artifacts into place together. Dropping a writer or a staged artifact
//! deletes its temporary file, so a failed run never leaves a partial artifact.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::common::Result;
use crate::scheduler::SampleSink;

pub struct SampleWriter {
    target: PathBuf,
    inner: BufWriter<NamedTempFile>,
    lines: usize,
}

impl SampleWriter {
    pub fn create(target: &Path) -> Result<Self> {
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp = NamedTempFile::new_in(dir)?;
        debug!("  Staging {} at {}", target.display(), tmp.path().display());
        Ok(Self {
            target: target.to_path_buf(),
            inner: BufWriter::with_capacity(1 << 20, tmp),
            lines: 0,
        })
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Flush and sync the temporary file. Nothing is visible at the
    /// destination until the returned artifact is committed.
    pub fn finish(self) -> Result<StagedArtifact> {
        let tmp = self.inner.into_inner().map_err(|e| e.into_error())?;
        tmp.as_file().sync_all()?;
        Ok(StagedArtifact {
            target: self.target,
            tmp,
            lines: self.lines,
        })
    }
}

impl SampleSink for SampleWriter {
    fn push_line(&mut self, line: &str) -> Result<()> {
        self.inner.write_all(line.as_bytes())?;
        self.inner.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }
}

/// A complete artifact still held in its temporary file.
pub struct StagedArtifact {
    target: PathBuf,
    tmp: NamedTempFile,
    lines: usize,
}

impl StagedArtifact {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Atomically move the artifact to its destination.
    pub fn commit(self) -> Result<()> {
        self.tmp.persist(&self.target)?;
        debug!("  Committed {}", self.target.display());
        Ok(())
    }
}

/// Commit every staged artifact, or none of them.
///
/// If a rename fails, artifacts already moved into place by this call are
/// removed again and the remaining temporary files are deleted.
pub fn commit_all(staged: Vec<StagedArtifact>) -> Result<()> {
    let mut committed: Vec<PathBuf> = Vec::with_capacity(staged.len());
    for artifact in staged {
        let target = artifact.target.clone();
        if let Err(e) = artifact.commit() {
            for path in &committed {
                if let Err(rm) = fs::remove_file(path) {
                    warn!("  Could not remove {} after failed commit: {rm}", path.display());
                }
            }
            return Err(e);
        }
        committed.push(target);
    }
    Ok(())
}
