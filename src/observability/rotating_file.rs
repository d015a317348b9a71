//! Size-bounded rotating log file
//!
//! When the next record would push the file past `max_bytes`, `file` is
//! renamed to `file.1` (older backups shift to `file.2`, ...) and a fresh
//! file is started. With `backups = 0` the file is truncated instead.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: File,
    written: u64,
}

impl RotatingFile {
    /// Open (or create) the log file, appending to existing content
    pub fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            max_bytes,
            backups,
            file,
            written,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the n-th backup (`file.1`, `file.2`, ...)
    pub fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.backups == 0 {
            self.file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?;
        } else {
            for index in (1..self.backups).rev() {
                let from = self.backup_path(index);
                if from.exists() {
                    fs::rename(&from, self.backup_path(index + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
            self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        }

        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Shareable `MakeWriter` over one [`RotatingFile`]
#[derive(Debug, Clone)]
pub struct RotatingFileWriter {
    inner: Arc<Mutex<RotatingFile>>,
}

impl RotatingFileWriter {
    pub fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(RotatingFile::open(path, max_bytes, backups)?)),
        })
    }
}

/// Locked handle for writing one record
pub struct RotatingFileGuard<'a>(MutexGuard<'a, RotatingFile>);

impl Write for RotatingFileGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFileWriter {
    type Writer = RotatingFileGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        // A panic while holding the lock leaves the file usable
        RotatingFileGuard(self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap_or_default()
    }

    #[test]
    fn test_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "old\n").unwrap();

        let mut file = RotatingFile::open(&path, 1024, 1).unwrap();
        file.write_all(b"new\n").unwrap();
        file.flush().unwrap();

        assert_eq!(read(&path), "old\nnew\n");
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/logs/app.log");

        let mut file = RotatingFile::open(&path, 1024, 1).unwrap();
        file.write_all(b"hello\n").unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_rotates_into_single_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RotatingFile::open(&path, 10, 1).unwrap();

        file.write_all(b"aaaaaaaa\n").unwrap();
        file.write_all(b"bbbbbbbb\n").unwrap();
        file.write_all(b"cccccccc\n").unwrap();
        file.flush().unwrap();

        assert_eq!(read(&path), "cccccccc\n");
        assert_eq!(read(&file.backup_path(1)), "bbbbbbbb\n");
        assert!(!file.backup_path(2).exists(), "only one backup is kept");
    }

    #[test]
    fn test_multiple_backups_shift() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RotatingFile::open(&path, 4, 2).unwrap();

        for record in [b"one\n", b"two\n", b"thr\n"] {
            file.write_all(record).unwrap();
        }
        file.flush().unwrap();

        assert_eq!(read(&path), "thr\n");
        assert_eq!(read(&file.backup_path(1)), "two\n");
        assert_eq!(read(&file.backup_path(2)), "one\n");
    }

    #[test]
    fn test_zero_backups_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RotatingFile::open(&path, 4, 0).unwrap();

        file.write_all(b"one\n").unwrap();
        file.write_all(b"two\n").unwrap();
        file.flush().unwrap();

        assert_eq!(read(&path), "two\n");
        assert!(!file.backup_path(1).exists());
    }

    #[test]
    fn test_oversized_record_is_still_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RotatingFile::open(&path, 4, 1).unwrap();

        file.write_all(b"this record is longer than the limit\n").unwrap();
        file.flush().unwrap();

        assert_eq!(read(&path), "this record is longer than the limit\n");
    }

    #[test]
    fn test_make_writer_shares_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let writer = RotatingFileWriter::open(&path, 1024, 1).unwrap();
        let clone = writer.clone();

        writer.make_writer().write_all(b"first\n").unwrap();
        clone.make_writer().write_all(b"second\n").unwrap();

        assert_eq!(read(&path), "first\nsecond\n");
    }
}
