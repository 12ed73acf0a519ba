//! Disk I/O for part files: append-only writes, resume-from-length, and the
//! final ascending-index concatenation into the destination artifact.
//!
//! Unlike a single preallocated download target, each Range in this crate owns
//! its own part file (the Coordinator never interleaves writes from two
//! Workers into one file), so a part file is always append-only and a Worker
//! never needs to seek.

mod compose;
mod writer;

pub use compose::compose_file;
pub use writer::PartFileWriter;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let part_path = dir.path().join("file0");
        let (writer, existing) = PartFileWriter::open_for_append(&part_path).unwrap();
        assert_eq!(existing, 0);
        writer.append(b"hello ").unwrap();
        writer.append(b"world").unwrap();
        writer.sync().unwrap();
        drop(writer);

        let mut f = std::fs::File::open(&part_path).unwrap();
        let mut buf = String::new();
        f.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "hello world");
    }

    #[test]
    fn reopen_for_append_reports_existing_length() {
        let dir = tempfile::tempdir().unwrap();
        let part_path = dir.path().join("file0");
        let (writer, _) = PartFileWriter::open_for_append(&part_path).unwrap();
        writer.append(b"0123456789").unwrap();
        drop(writer);

        let (_writer2, existing) = PartFileWriter::open_for_append(&part_path).unwrap();
        assert_eq!(existing, 10);
    }
}
