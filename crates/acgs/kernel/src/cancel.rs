//! Per-principle cancellation of in-progress governance runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use acgs_types::PrincipleId;
use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::info;

/// Cooperative cancellation flag that can also be awaited.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    fn same(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.flag, &other.flag)
    }
}

/// One live token per principle.
#[derive(Clone, Default)]
pub struct CancelRegistry {
    tokens: Arc<DashMap<PrincipleId, CancelToken>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a run. A previous run for the same principle is cancelled.
    pub fn register(&self, id: &PrincipleId) -> CancelToken {
        let token = CancelToken::new();
        if let Some(previous) = self.tokens.insert(id.clone(), token.clone()) {
            previous.cancel();
            info!(principle_id = %id, "superseded governance run cancelled");
        }
        token
    }

    /// End a run; a newer registration is left alone.
    pub fn finish(&self, id: &PrincipleId, token: &CancelToken) {
        self.tokens.remove_if(id, |_, current| current.same(token));
    }

    /// Cancel the run for a principle, if any.
    pub fn cancel(&self, id: &PrincipleId) -> bool {
        match self.tokens.get(id) {
            Some(token) => {
                token.cancel();
                info!(principle_id = %id, "governance run cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, id: &PrincipleId) -> bool {
        self.tokens.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn new_registration_cancels_previous() {
        let registry = CancelRegistry::new();
        let id = PrincipleId::new("p");
        let first = registry.register(&id);
        let second = registry.register(&id);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        registry.finish(&id, &first);
        assert!(registry.is_running(&id));
        registry.finish(&id, &second);
        assert!(!registry.is_running(&id));
        assert!(!registry.cancel(&id));
    }
}
