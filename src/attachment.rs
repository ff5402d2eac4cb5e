use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempPath;

use crate::model::StoredFile;

/// Copies stored file content somewhere the mail transport can read it from.
///
/// The returned [`TempPath`] removes the file when closed or dropped.
pub trait AttachmentStore: Send + Sync {
    fn materialize(&self, file: &StoredFile) -> Result<TempPath>;
}

#[derive(Debug, Clone, Default)]
pub struct TempDirAttachmentStore {
    dir: Option<PathBuf>,
}

impl TempDirAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }
}

impl AttachmentStore for TempDirAttachmentStore {
    fn materialize(&self, file: &StoredFile) -> Result<TempPath> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("csmtp-attachment-");

        let created = match &self.dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        let mut tmp = created.context("Failed to create temporary attachment file")?;

        tmp.write_all(&file.content)
            .context("Failed to write attachment content")?;
        tmp.flush().context("Failed to flush attachment content")?;

        log::debug!("Attachment copied to {}", tmp.path().display());
        Ok(tmp.into_temp_path())
    }
}
