use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use mcpchat_common::Result;

/// Byte range to echo after a change notification, `None` when the file did
/// not grow. A shrunk file keeps the previous cursor.
pub fn next_range(last_size: u64, current_size: u64) -> Option<Range<u64>> {
    (current_size > last_size).then_some(last_size..current_size)
}

/// Destination for echoed log content.
pub trait LogSink: Send + Sync {
    fn echo(&self, server_name: &str, text: &str);
}

/// Prints echoes to stdout with a green server prefix.
#[derive(Debug, Default)]
pub struct ConsoleLogSink;

impl LogSink for ConsoleLogSink {
    fn echo(&self, server_name: &str, text: &str) {
        println!(
            "{} {}",
            format!("[MCP Server Log: \"{server_name}\"]").green(),
            text
        );
    }
}

/// Follows one server's log file and echoes appended bytes.
pub struct LogTailer {
    server_name: String,
    path: PathBuf,
    last_size: u64,
    sink: Arc<dyn LogSink>,
}

impl LogTailer {
    pub fn new(
        server_name: impl Into<String>,
        path: impl Into<PathBuf>,
        last_size: u64,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            path: path.into(),
            last_size,
            sink,
        }
    }

    pub fn last_size(&self) -> u64 {
        self.last_size
    }

    /// Handle one change notification.
    pub fn on_change(&mut self) -> Result<()> {
        let current_size = std::fs::metadata(&self.path)?.len();
        let Some(range) = next_range(self.last_size, current_size) else {
            return Ok(());
        };

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(range.start))?;
        let mut buf = Vec::with_capacity((range.end - range.start) as usize);
        file.take(range.end - range.start).read_to_end(&mut buf)?;

        let text = String::from_utf8_lossy(&buf);
        self.sink.echo(&self.server_name, text.trim());
        self.last_size = range.start + buf.len() as u64;
        Ok(())
    }
}
