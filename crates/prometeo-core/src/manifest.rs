//! Manifest Codec (§4.4): the `prometeo.config` encoding and the per-download
//! `prometeo.log` text log.
//!
//! Grounded on the general persistence shape used elsewhere in this crate
//! (`Result` + `anyhow` context, `tracing` for process-level diagnostics) but
//! not on a SQLite job database — just one flat manifest file per work
//! directory.

use crate::plan::Plan;
use anyhow::{anyhow, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

pub const MANIFEST_FILE_NAME: &str = "prometeo.config";
pub const LOG_FILE_NAME: &str = "prometeo.log";

/// Encodes a Plan for on-disk storage: UTF-8 JSON → raw bytes → reversed
/// byte order → lowercase hex string (§4.4). Not cryptographic, just
/// obfuscated enough to discourage casual editing.
pub fn encode(plan: &Plan) -> Result<String> {
    let json = serde_json::to_vec(plan).context("serialize plan to JSON")?;
    let mut reversed = json;
    reversed.reverse();
    Ok(hex_lower(&reversed))
}

/// Reverses `encode` exactly: hex → bytes → un-reverse → parse JSON.
/// Any failure at any stage is reported as "invalid manifest".
pub fn decode(blob: &str) -> Result<Plan> {
    let mut bytes = unhex(blob).map_err(|_| anyhow!("invalid manifest: not valid hex"))?;
    bytes.reverse();
    serde_json::from_slice(&bytes).map_err(|e| anyhow!("invalid manifest: {e}"))
}

/// Writes (overwriting) the manifest file inside `work_dir`.
pub fn write_manifest(work_dir: &Path, plan: &Plan) -> Result<()> {
    let blob = encode(plan)?;
    let path = work_dir.join(MANIFEST_FILE_NAME);
    fs::write(&path, blob).with_context(|| format!("write manifest: {}", path.display()))
}

/// Reads and decodes the manifest file inside `work_dir`.
pub fn read_manifest(work_dir: &Path) -> Result<Plan> {
    let path = work_dir.join(MANIFEST_FILE_NAME);
    let blob = fs::read_to_string(&path)
        .with_context(|| format!("read manifest: {}", path.display()))?;
    decode(&blob)
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

fn unhex(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let hi = hex_digit(bytes[i]).ok_or(())?;
        let lo = hex_digit(bytes[i + 1]).ok_or(())?;
        out.push(hi << 4 | lo);
        i += 2;
    }
    Ok(out)
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Append-only, newline-delimited, timestamped text log for one download
/// (§4.4). Its absence or corruption must never affect resumption — callers
/// treat a write failure here as non-fatal, logging it via `tracing` instead.
pub struct DownloadLog {
    path: std::path::PathBuf,
}

impl DownloadLog {
    pub fn new(work_dir: &Path) -> Self {
        DownloadLog {
            path: work_dir.join(LOG_FILE_NAME),
        }
    }

    pub fn append(&self, message: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open download log: {}", self.path.display()))?;
        let line = format!("{} - {}\n", iso8601_now(), message);
        file.write_all(line.as_bytes())
            .with_context(|| format!("append to download log: {}", self.path.display()))
    }
}

fn iso8601_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Range;
    use std::path::PathBuf;

    fn sample_plan() -> Plan {
        Plan {
            url: "https://example.com/file.iso".to_string(),
            name: "file.iso".to_string(),
            size: 1000,
            destination: PathBuf::from("/tmp/out/file.iso"),
            work_dir: PathBuf::from("/tmp/work/file"),
            content_type: "application/octet-stream".to_string(),
            parts: vec![Range {
                index: 0,
                part_path: PathBuf::from("/tmp/work/file/file.iso0"),
                start: 0,
                end: 999,
            }],
            speed_bps: 1_250_000,
            finished: false,
            resumed: false,
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let plan = sample_plan();
        let encoded = encode(&plan).unwrap();
        assert!(encoded.chars().all(|c| c.is_ascii_hexdigit()));
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, plan);
    }

    #[test]
    fn decode_rejects_non_hex() {
        assert!(decode("not hex at all!!").is_err());
    }

    #[test]
    fn decode_rejects_odd_length_hex() {
        assert!(decode("abc").is_err());
    }

    #[test]
    fn write_then_read_manifest_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let plan = sample_plan();
        write_manifest(dir.path(), &plan).unwrap();
        let read_back = read_manifest(dir.path()).unwrap();
        assert_eq!(read_back, plan);
    }

    #[test]
    fn download_log_appends_timestamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = DownloadLog::new(dir.path());
        log.append("started").unwrap();
        log.append("finished").unwrap();
        let contents = fs::read_to_string(dir.path().join(LOG_FILE_NAME)).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(" - started"));
        assert!(lines[1].contains(" - finished"));
    }
}
