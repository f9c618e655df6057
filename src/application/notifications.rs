use std::sync::Arc;

use crate::domain::notification::Notification;
use crate::domain::ports::Notifier;

/// Fire-and-forget delivery of post-commit side effects.
///
/// Called only once the ledger transition is durable; a failing notifier is
/// logged and never surfaces to the caller.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Returns how many notifications were delivered.
    pub fn dispatch(&self, notifications: &[Notification]) -> usize {
        notifications
            .iter()
            .filter(|n| match self.notifier.send(n) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("notification {} not delivered: {}", n.kind(), e);
                    false
                }
            })
            .count()
    }
}
