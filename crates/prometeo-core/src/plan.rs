//! The data model: `Plan`, `Range`, and the derived `PartState` (§3).
//!
//! Range partitioning is grounded on `segmenter/range.rs`'s `plan_segments`,
//! adapted from a half-open `[start, end)` convention to an inclusive
//! `[start, end]` convention with this rule: the last range absorbs the
//! remainder of `size / N` rather than spreading it evenly over the first
//! `remainder` ranges.
//!
//! Offsets are `i64` rather than `u64` so a degenerate range (`size < N`,
//! §3 "ranges may be degenerate (empty/inverted)") is representable directly
//! as `start > end` instead of needing a sentinel or saturating hack; no real
//! download exceeds `i64::MAX` bytes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One contiguous byte range owned by one Worker. `start`/`end` are inclusive
/// byte offsets; `start > end` marks a degenerate (already-complete) range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub index: usize,
    pub part_path: PathBuf,
    pub start: i64,
    pub end: i64,
}

impl Range {
    /// Length of this range in bytes, `0` for a degenerate range.
    pub fn len(&self) -> u64 {
        if self.start > self.end {
            0
        } else {
            (self.end - self.start + 1) as u64
        }
    }

    /// `bytes=<a>-<b>` header value for a resumed request starting `existing`
    /// bytes into this range.
    pub fn range_header_value(&self, existing: u64) -> String {
        format!("bytes={}-{}", self.start + existing as i64, self.end)
    }
}

/// Derived, not persisted: whether a Worker still has bytes left to fetch.
///
/// A Worker is `done` iff `remaining <= 0`, which also covers a degenerate
/// range (`start > end`) and an `existing_bytes >= range_length` resume (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartState {
    pub existing: u64,
    pub remaining: i64,
}

impl PartState {
    pub fn compute(range: &Range, existing: u64) -> Self {
        let remaining = range.len() as i64 - existing as i64;
        PartState { existing, remaining }
    }

    pub fn is_done(&self) -> bool {
        self.remaining <= 0
    }
}

/// The immutable-once-written download plan (§3). `speed_bps`, `finished`, and
/// `resumed` are the only fields the Coordinator mutates after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub url: String,
    pub name: String,
    pub size: u64,
    pub destination: PathBuf,
    pub work_dir: PathBuf,
    pub content_type: String,
    pub parts: Vec<Range>,
    pub speed_bps: u64,
    pub finished: bool,
    pub resumed: bool,
}

/// Builds the Range partition for `size` bytes split into `connections`
/// contiguous ranges, per §3's partitioning rule: `slice = floor(size/N)`,
/// `start[i] = i*slice`, `end[i] = start[i]+slice-1` for `i < N-1`, and the
/// last range ends at `size-1`.
///
/// `connections` must be `>= 1`; callers validate this earlier (§7
/// `InvalidArgumentError`). When `size < connections`, the formula produces
/// degenerate ranges (`start > end`) for every index whose slice is empty;
/// `PartState::is_done` treats those as already complete, per §3.
pub fn plan_ranges(size: u64, connections: usize, work_dir: &Path, name: &str) -> Vec<Range> {
    assert!(connections >= 1, "connections must be >= 1");
    let n = connections as i64;
    let size = size as i64;
    let slice = size / n;

    let mut out = Vec::with_capacity(connections);
    for i in 0..connections {
        let idx = i as i64;
        let start = idx * slice;
        let end = if i + 1 < connections {
            start + slice - 1
        } else {
            size - 1
        };
        out.push(Range {
            index: i,
            part_path: work_dir.join(format!("{}{}", name, i)),
            start,
            end,
        });
    }
    out
}
