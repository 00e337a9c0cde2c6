use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use mcpchat_common::{Error, Result};

use crate::providers::ChatMessage;

/// Identifies the conversation a call to the agent belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadConfig {
    pub thread_id: String,
}

impl ThreadConfig {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
        }
    }
}

/// Stores conversation history between agent invocations.
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// History saved for the thread, empty when the thread is new.
    async fn load(&self, thread: &ThreadConfig) -> Result<Vec<ChatMessage>>;

    /// Replace the thread's history.
    async fn save(&self, thread: &ThreadConfig, messages: &[ChatMessage]) -> Result<()>;
}

/// In-process checkpoint store; history is lost when the process exits.
#[derive(Default)]
pub struct MemorySaver {
    threads: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointSaver for MemorySaver {
    async fn load(&self, thread: &ThreadConfig) -> Result<Vec<ChatMessage>> {
        let threads = self
            .threads
            .lock()
            .map_err(|_| Error::Agent("checkpoint store poisoned".into()))?;
        Ok(threads.get(&thread.thread_id).cloned().unwrap_or_default())
    }

    async fn save(&self, thread: &ThreadConfig, messages: &[ChatMessage]) -> Result<()> {
        let mut threads = self
            .threads
            .lock()
            .map_err(|_| Error::Agent("checkpoint store poisoned".into()))?;
        threads.insert(thread.thread_id.clone(), messages.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_thread_starts_empty() {
        let saver = MemorySaver::new();
        let history = saver.load(&ThreadConfig::new("t1")).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn threads_are_kept_apart() {
        let saver = MemorySaver::new();
        let a = ThreadConfig::new("a");
        let b = ThreadConfig::new("b");

        saver.save(&a, &[ChatMessage::user("hi from a")]).await.unwrap();
        saver
            .save(&b, &[ChatMessage::user("hi from b"), ChatMessage::assistant("hello")])
            .await
            .unwrap();

        assert_eq!(saver.load(&a).await.unwrap().len(), 1);
        assert_eq!(saver.load(&b).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn save_replaces_previous_history() {
        let saver = MemorySaver::new();
        let t = ThreadConfig::new("t");
        saver.save(&t, &[ChatMessage::user("one")]).await.unwrap();
        saver.save(&t, &[ChatMessage::user("two")]).await.unwrap();

        let history = saver.load(&t).await.unwrap();
        assert_eq!(history, vec![ChatMessage::user("two")]);
    }
}
