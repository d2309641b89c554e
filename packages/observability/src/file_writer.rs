//! Append-only JSONL file sink with a size cap.
//!
//! CLI invocations keep appending to the same file, so once it grows past the
//! cap it is moved aside to `<name>.1` (replacing any older backup) and a
//! fresh file is started.

use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

pub const DEFAULT_LOG_MAX_BYTES: u64 = 8 * 1024 * 1024;

struct LogFile {
    path: PathBuf,
    file: File,
    len: u64,
    max_bytes: u64,
}

impl LogFile {
    fn open(path: PathBuf, max_bytes: u64) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            len,
            max_bytes,
        })
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".1");
        PathBuf::from(name)
    }

    fn roll_over(&mut self) -> io::Result<()> {
        self.file.flush()?;
        fs::rename(&self.path, self.backup_path())?;
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.len = 0;
        Ok(())
    }

    fn append(&mut self, buf: &[u8]) -> io::Result<usize> {
        let incoming = buf.len() as u64;
        if self.len > 0 && self.len.saturating_add(incoming) > self.max_bytes {
            self.roll_over()?;
        }
        // One write call per line keeps lines from concurrent processes whole.
        self.file.write_all(buf)?;
        self.len = self.len.saturating_add(incoming);
        Ok(buf.len())
    }
}

/// Shared handle to the log file.
#[derive(Clone)]
pub struct LogFileWriter {
    inner: Arc<Mutex<LogFile>>,
}

impl LogFileWriter {
    /// Open (creating parent directories) with the default size cap.
    pub fn new(path: &Path) -> io::Result<Self> {
        Self::with_max_bytes(path, DEFAULT_LOG_MAX_BYTES)
    }

    pub fn with_max_bytes(path: &Path, max_bytes: u64) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = LogFile::open(path.to_path_buf(), max_bytes)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(file)),
        })
    }
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().append(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().file.flush()
    }
}

impl<'a> MakeWriter<'a> for LogFileWriter {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
