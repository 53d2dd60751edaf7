//! Per-entry scratch files.
//!
//! A [`ScratchFile`] stages the bytes of one open entry between download
//! and upload. All engine I/O is positioned (`pread`/`pwrite`) so the file
//! offset is never shared state; upload and download clients get their own
//! duplicated descriptor and may close it whenever they like without
//! affecting the engine's copy. The backing file lives in the configured
//! temporary directory and is unlinked when the scratch is dropped.

use std::{
    fs::File,
    io::{self, Seek, SeekFrom},
    os::unix::fs::FileExt,
    path::Path,
};

use tempfile::NamedTempFile;

/// A local scratch file holding the downloaded or dirty bytes of one
/// entry.
pub struct ScratchFile {
    inner: NamedTempFile,
}

impl ScratchFile {
    /// Create an empty scratch file inside `dir`.
    pub fn new_in(dir: &Path) -> io::Result<Self> {
        let inner = tempfile::Builder::new()
            .prefix("skymount-")
            .tempfile_in(dir)?;
        Ok(Self { inner })
    }

    /// Read at `offset`, filling as much of `buf` as the file allows.
    /// Returns the number of bytes read; zero means end-of-file.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.inner.as_file().read_at(&mut buf[filled..], offset + filled as u64)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Write all of `data` at `offset`, extending the file if needed.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<usize> {
        self.inner.as_file().write_all_at(data, offset)?;
        Ok(data.len())
    }

    /// Current length in bytes.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.inner.as_file().metadata()?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Drop all content (truncate to zero).
    pub fn clear(&self) -> io::Result<()> {
        self.inner.as_file().set_len(0)
    }

    /// A duplicated descriptor positioned at the start, handed to upload
    /// clients. Closing or dropping it leaves this scratch file intact,
    /// so transport layers that consume their request body are harmless.
    pub fn reader(&self) -> io::Result<File> {
        let mut dup = self.inner.as_file().try_clone()?;
        dup.seek(SeekFrom::Start(0))?;
        Ok(dup)
    }

    /// A duplicated descriptor for download clients: truncated and
    /// positioned at the start, ready to receive the full body.
    pub fn writer(&self) -> io::Result<File> {
        let mut dup = self.inner.as_file().try_clone()?;
        dup.set_len(0)?;
        dup.seek(SeekFrom::Start(0))?;
        Ok(dup)
    }
}

impl std::fmt::Debug for ScratchFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchFile")
            .field("path", &self.inner.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    fn scratch() -> (tempfile::TempDir, ScratchFile) {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = ScratchFile::new_in(dir.path()).expect("scratch");
        (dir, file)
    }

    #[test]
    fn positioned_read_write_roundtrip() {
        let (_dir, s) = scratch();
        s.write_at(0, b"hello world").unwrap();

        let mut buf = [0u8; 5];
        let n = s.read_at(&mut buf, 6).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn read_past_end_reports_zero() {
        let (_dir, s) = scratch();
        s.write_at(0, b"abc").unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(s.read_at(&mut buf, 100).unwrap(), 0);

        // Short read at the tail
        assert_eq!(s.read_at(&mut buf, 1).unwrap(), 2);
        assert_eq!(&buf[..2], b"bc");
    }

    #[test]
    fn write_at_offset_extends() {
        let (_dir, s) = scratch();
        s.write_at(0, b"hello").unwrap();
        s.write_at(5, b", world").unwrap();
        assert_eq!(s.len().unwrap(), 12);

        let mut buf = vec![0u8; 12];
        s.read_at(&mut buf, 0).unwrap();
        assert_eq!(&buf, b"hello, world");
    }

    #[test]
    fn clear_truncates() {
        let (_dir, s) = scratch();
        s.write_at(0, b"data").unwrap();
        s.clear().unwrap();
        assert!(s.is_empty().unwrap());
    }

    #[test]
    fn reader_survives_being_dropped_by_client() {
        let (_dir, s) = scratch();
        s.write_at(0, b"payload").unwrap();

        {
            let mut r = s.reader().unwrap();
            let mut out = String::new();
            r.read_to_string(&mut out).unwrap();
            assert_eq!(out, "payload");
            // Client drops (closes) its descriptor here.
        }

        // Engine copy is still readable.
        let mut buf = [0u8; 7];
        assert_eq!(s.read_at(&mut buf, 0).unwrap(), 7);
        assert_eq!(&buf, b"payload");
    }

    #[test]
    fn writer_truncates_before_download() {
        let (_dir, s) = scratch();
        s.write_at(0, b"old old old").unwrap();

        let mut w = s.writer().unwrap();
        w.write_all(b"new").unwrap();
        drop(w);

        assert_eq!(s.len().unwrap(), 3);
        let mut buf = [0u8; 3];
        s.read_at(&mut buf, 0).unwrap();
        assert_eq!(&buf, b"new");
    }
}
