//! In-memory notifier

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{EmailMessage, Notifier, NotifyError};

/// Collects sent messages; can be told to fail
pub struct MemoryNotifier {
    sent: Mutex<Vec<EmailMessage>>,
    attempts: AtomicUsize,
    fail: AtomicBool,
}

impl Default for MemoryNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }

    /// Messages addressed to `to`
    pub async fn sent_to(&self, to: &str) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.to == to)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Provider {
                status: 503,
                message: "injected email failure".into(),
            });
        }

        self.sent.lock().await.push(message.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
