use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mcpchat_common::{Error, Result};
use mcpchat_config::StderrHandle;
use tracing::{error, info, warn};

use super::tail::{ConsoleLogSink, LogSink, LogTailer};
use super::watch::{LogWatcher, NotifyLogWatcher, WatchSubscription};

/// Log file name for a server.
pub fn log_file_name(server_name: &str) -> String {
    format!("mcp-server-{server_name}.log")
}

/// One server's log file together with its active watch.
pub struct LogRegistration {
    server_name: String,
    path: PathBuf,
    handle: Option<StderrHandle>,
    subscription: Option<Box<dyn WatchSubscription>>,
}

impl LogRegistration {
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_disposed(&self) -> bool {
        self.handle.is_none() && self.subscription.is_none()
    }

    /// Stop the watch, then close the write handle, including copies handed
    /// out by `register`. Both steps run even if the first fails; later calls
    /// do nothing.
    pub fn dispose(&mut self) -> Result<()> {
        let cancelled = match self.subscription.take() {
            Some(mut sub) => sub.cancel(),
            None => Ok(()),
        };

        let closed = match self.handle.take() {
            Some(handle) => handle.close().map_err(|e| {
                Error::LogLifecycle(format!(
                    "failed to close log file {}: {e}",
                    self.path.display()
                ))
            }),
            None => Ok(()),
        };

        cancelled.and(closed)
    }
}

/// Creates and tails the per-server log files that receive each MCP
/// server's stderr.
pub struct ServerLogManager {
    log_dir: PathBuf,
    dir_ready: bool,
    watcher: Arc<dyn LogWatcher>,
    sink: Arc<dyn LogSink>,
    registrations: Vec<LogRegistration>,
}

impl ServerLogManager {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self::with_parts(log_dir, Arc::new(NotifyLogWatcher), Arc::new(ConsoleLogSink))
    }

    pub fn with_parts(
        log_dir: impl Into<PathBuf>,
        watcher: Arc<dyn LogWatcher>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            log_dir: log_dir.into(),
            dir_ready: false,
            watcher,
            sink,
            registrations: Vec::new(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn registrations(&self) -> &[LogRegistration] {
        &self.registrations
    }

    fn ensure_log_dir(&mut self) -> Result<()> {
        if self.dir_ready {
            return Ok(());
        }
        if !self.log_dir.exists() {
            std::fs::create_dir_all(&self.log_dir).map_err(|e| {
                Error::LogLifecycle(format!(
                    "failed to create log directory {}: {e}",
                    self.log_dir.display()
                ))
            })?;
            println!("Created log directory: {}", self.log_dir.display());
        }
        self.dir_ready = true;
        Ok(())
    }

    /// Open (truncating) the server's log file, start tailing it, and return
    /// the handle to use as the server's stderr.
    pub fn register(&mut self, server_name: &str) -> Result<StderrHandle> {
        self.ensure_log_dir()?;

        let path = self.log_dir.join(log_file_name(server_name));
        println!("Writing MCP server log file: {}", path.display());

        let file = File::create(&path).map_err(|e| {
            Error::LogLifecycle(format!("failed to open log file {}: {e}", path.display()))
        })?;
        let handle = StderrHandle::new(file);

        let mut tailer = LogTailer::new(server_name, &path, 0, Arc::clone(&self.sink));
        let name = server_name.to_string();
        let on_change = Box::new(move || {
            if let Err(e) = tailer.on_change() {
                warn!("failed to read log of MCP server \"{name}\": {e}");
            }
        });

        let subscription = match self.watcher.watch(&path, on_change) {
            Ok(sub) => sub,
            Err(e) => {
                let _ = handle.close();
                return Err(e);
            }
        };

        info!("registered log file for MCP server \"{server_name}\"");
        self.registrations.push(LogRegistration {
            server_name: server_name.to_string(),
            path,
            handle: Some(handle.clone()),
            subscription: Some(subscription),
        });
        Ok(handle)
    }

    /// Dispose every registration. Failures are logged and returned, never
    /// short-circuit the remaining registrations.
    pub fn dispose_all(&mut self) -> Vec<Error> {
        let mut failures = Vec::new();
        for registration in &mut self.registrations {
            if let Err(e) = registration.dispose() {
                error!(
                    "Error closing log file: {}: {e}",
                    registration.path.display()
                );
                failures.push(e);
            }
        }
        failures
    }
}

impl Drop for ServerLogManager {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
