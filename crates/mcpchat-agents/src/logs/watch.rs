use std::path::Path;

use mcpchat_common::{Error, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Callback run on every change of a watched file.
pub type ChangeCallback = Box<dyn FnMut() + Send>;

/// Source of file change notifications.
pub trait LogWatcher: Send + Sync {
    /// Start watching `path`. Callbacks for one subscription never overlap.
    fn watch(&self, path: &Path, on_change: ChangeCallback) -> Result<Box<dyn WatchSubscription>>;
}

/// Handle to an active watch.
pub trait WatchSubscription: Send {
    /// Stop delivering notifications.
    fn cancel(&mut self) -> Result<()>;
}

/// [`LogWatcher`] backed by the platform's native notification API.
///
/// Events are forwarded from the notify thread over a channel to one tokio
/// task per file, which runs the callback.
#[derive(Debug, Default)]
pub struct NotifyLogWatcher;

impl LogWatcher for NotifyLogWatcher {
    fn watch(
        &self,
        path: &Path,
        mut on_change: ChangeCallback,
    ) -> Result<Box<dyn WatchSubscription>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::LogLifecycle(format!("no async runtime for log watch: {e}")))?;

        // Capacity 1: bursts coalesce into a single pending notification.
        let (tx, mut rx) = mpsc::channel::<()>(1);

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        let _ = tx.try_send(());
                    }
                }
                Err(e) => error!("log watch error: {}", e),
            })
            .map_err(|e| watch_error(path, e))?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| watch_error(path, e))?;

        let task = runtime.spawn(async move {
            while rx.recv().await.is_some() {
                on_change();
            }
        });

        debug!("watching {}", path.display());
        Ok(Box::new(NotifySubscription {
            watcher: Some(watcher),
            task: Some(task),
        }))
    }
}

fn watch_error(path: &Path, e: notify::Error) -> Error {
    Error::LogLifecycle(format!("failed to watch {}: {e}", path.display()))
}

struct NotifySubscription {
    watcher: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
}

impl WatchSubscription for NotifySubscription {
    fn cancel(&mut self) -> Result<()> {
        // Dropping the watcher closes the channel, which ends the task.
        drop(self.watcher.take());
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }
}

impl Drop for NotifySubscription {
    fn drop(&mut self) {
        let _ = self.cancel();
    }
}
