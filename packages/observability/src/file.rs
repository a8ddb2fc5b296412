//! Append-only log file writer.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// Default log file: `~/.hapien/logs/hapien.jsonl`.
///
/// Returns `None` when the home directory cannot be determined.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".hapien").join("logs").join("hapien.jsonl"))
}

/// Shared handle to the log file. Each write is flushed so lines from
/// concurrent processes do not interleave mid-line.
#[derive(Clone)]
pub struct LogFileWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl LogFileWriter {
    /// Open `path` in append mode, creating parent directories.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let written = guard.write(buf)?;
        guard.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for LogFileWriter {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
