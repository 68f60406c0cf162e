//! Mock push gateway for tests: records messages, no network.

use dispatch_types::{PushError, PushGateway, PushMessage};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Ok,
    NoId,
    Fail,
}

/// Records every message. Depending on the mode it returns `push-<n>` ids, no id, or a
/// transport error.
pub struct MockPushGateway {
    mode: Mode,
    counter: AtomicUsize,
    sent: Mutex<Vec<PushMessage>>,
}

impl MockPushGateway {
    pub fn new() -> Self {
        Self::with_mode(Mode::Ok)
    }

    /// Gateway that accepts messages but reports no ticket id.
    pub fn without_ids() -> Self {
        Self::with_mode(Mode::NoId)
    }

    /// Gateway that fails every send with a transport error.
    pub fn failing() -> Self {
        Self::with_mode(Mode::Fail)
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            counter: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub async fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().await.clone()
    }
}

impl Default for MockPushGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PushGateway for MockPushGateway {
    async fn send(&self, message: &PushMessage) -> Result<Option<String>, PushError> {
        self.sent.lock().await.push(message.clone());
        match self.mode {
            Mode::Ok => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(Some(format!("push-{n}")))
            }
            Mode::NoId => Ok(None),
            Mode::Fail => Err(PushError::Transport("connection refused".to_string())),
        }
    }
}
