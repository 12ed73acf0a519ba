//! Final concatenation of part files into the destination artifact (§4.3).

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::Path;

use crate::plan::Range;

/// Streams each Range's part file into `destination` in ascending index order,
/// deleting the part file once its bytes have been copied. `ranges` must
/// already be sorted by `index` (the Coordinator guarantees this, §3).
///
/// `destination` is truncated on open rather than appended to: §4.3 does not
/// expect the destination to pre-exist, and composition also deletes each
/// part file as it is copied, so a partially composed destination left
/// behind by a failed attempt has no corresponding part files left to
/// recompose from cleanly. Appending to it on a later attempt would
/// duplicate the already-copied bytes instead of rebuilding the file.
///
/// Any I/O error aborts immediately; `destination` may be left partially
/// written in that case, matching §4.3 ("Any I/O error rejects").
pub fn compose_file(ranges: &[Range], destination: &Path) -> Result<()> {
    let mut out = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(destination)
        .with_context(|| format!("open destination truncated: {}", destination.display()))?;

    for range in ranges {
        let part = File::open(&range.part_path)
            .with_context(|| format!("open part file: {}", range.part_path.display()))?;
        let mut reader = BufReader::new(part);
        std::io::copy(&mut reader, &mut out).with_context(|| {
            format!(
                "copy part file {} into {}",
                range.part_path.display(),
                destination.display()
            )
        })?;
        drop(reader);
        fs::remove_file(&range.part_path)
            .with_context(|| format!("remove part file: {}", range.part_path.display()))?;
    }

    out.flush().context("flush destination file")?;
    Ok(())
}
