//! Single-writer, append-only part file.
//!
//! Grounded on `StorageWriter` in `storage/writer.rs`, simplified from a
//! shared preallocated-and-pwrite file to one small append-only file per
//! Range, since each part file in this design has exactly one owner (§3
//! "Ownership" / §4.2 step 2 "Open the part file for append-only writes").

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// An open part file, positioned at end-of-file for append writes.
pub struct PartFileWriter {
    file: File,
    path: PathBuf,
}

impl PartFileWriter {
    /// Opens `path` for append, creating it if absent. Returns the writer and
    /// the file's current length (the `existing` value used by §4.2 step 1 and
    /// the `Range: bytes=<start+existing>-<end>` resume header).
    pub fn open_for_append(path: &Path) -> Result<(Self, u64)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open part file for append: {}", path.display()))?;
        let existing = file
            .metadata()
            .with_context(|| format!("stat part file: {}", path.display()))?
            .len();
        Ok((
            PartFileWriter {
                file,
                path: path.to_path_buf(),
            },
            existing,
        ))
    }

    /// Appends `data` to the part file. Always writes at the current end,
    /// which is correct because each part file has exactly one writer.
    pub fn append(&self, data: &[u8]) -> Result<()> {
        (&self.file)
            .write_all(data)
            .with_context(|| format!("append to part file: {}", self.path.display()))?;
        Ok(())
    }

    /// Flushes file data to disk. Call before the Coordinator treats a Worker
    /// as durably `Done`.
    pub fn sync(&self) -> Result<()> {
        self.file
            .sync_all()
            .with_context(|| format!("sync part file: {}", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
