use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FpscopeError, Result};
use crate::results::{SessionResult, SummaryReport};

/// Append-only JSON store: one file per session record, one per report.
///
/// Each record is flushed to disk before the next session starts, so a
/// crash mid-run loses at most the in-flight session. Report files carry
/// `report` in their name and are skipped when the corpus is read back.
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    /// Open the store, creating the directory if needed. An unwritable
    /// results directory is fatal to the whole run.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            FpscopeError::StorageError(format!(
                "cannot create results directory {}: {e}",
                dir.display()
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_session(&self, result: &SessionResult) -> Result<PathBuf> {
        let path = self.dir.join(result.filename());
        self.write_json(&path, result)?;
        tracing::debug!("Persisted session record {}", path.display());
        Ok(path)
    }

    pub fn save_report(&self, report: &SummaryReport) -> Result<PathBuf> {
        let path = self.dir.join(report.filename());
        self.write_json(&path, report)?;
        tracing::info!("Summary report saved: {}", path.display());
        Ok(path)
    }

    fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(value)?;
        fs::write(path, content).map_err(|e| {
            FpscopeError::StorageError(format!("cannot write {}: {e}", path.display()))
        })
    }

    /// Load the full session corpus in sorted filename order. This order is
    /// what downstream rankings treat as "original corpus order" when
    /// breaking ties. Report files and unparseable files are skipped, the
    /// latter with a warning.
    pub fn load_sessions(&self) -> Result<Vec<SessionResult>> {
        let mut files: Vec<PathBuf> = Vec::new();

        for entry in fs::read_dir(&self.dir).map_err(|e| {
            FpscopeError::StorageError(format!(
                "cannot read results directory {}: {e}",
                self.dir.display()
            ))
        })? {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            if path.extension().and_then(|e| e.to_str()) == Some("json")
                && !name.contains("report")
            {
                files.push(path);
            }
        }

        files.sort();

        let mut results = Vec::with_capacity(files.len());
        for path in files {
            match fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<SessionResult>(&content) {
                    Ok(result) => results.push(result),
                    Err(e) => tracing::warn!("Skipping malformed record {}: {}", path.display(), e),
                },
                Err(e) => tracing::warn!("Skipping unreadable file {}: {}", path.display(), e),
            }
        }

        Ok(results)
    }
}
