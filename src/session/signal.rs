use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// The one cross-thread piece of the session.
///
/// The provider's wake-up notification may fire on any thread; all it does is
/// raise the flag and leave a single wake token for the pump loop. Tree and
/// entity state are never reachable from here.
#[derive(Debug, Clone, Default)]
pub struct PumpSignal {
    requested: Arc<AtomicBool>,
    token: Arc<Notify>,
}

impl PumpSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the provider when it has work ready.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
        self.token.notify_one();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub(crate) fn clear(&self) {
        self.requested.store(false, Ordering::Release);
    }

    /// Resolves once a wake token is available. A request made while nobody
    /// was waiting is kept, so the next wait returns immediately.
    pub async fn notified(&self) {
        self.token.notified().await;
    }
}
