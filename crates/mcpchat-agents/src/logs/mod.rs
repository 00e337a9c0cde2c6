pub mod manager;
pub mod tail;
pub mod watch;

pub use manager::{LogRegistration, ServerLogManager, log_file_name};
pub use tail::{ConsoleLogSink, LogSink, LogTailer, next_range};
pub use watch::{ChangeCallback, LogWatcher, NotifyLogWatcher, WatchSubscription};
