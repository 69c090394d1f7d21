use crate::models::Action;
use async_trait::async_trait;
use uuid::Uuid;

/// Sink for action-change signals
///
/// Fire-and-forget from the core's perspective: delivery mechanics (email,
/// push, webhooks) live entirely outside this crate.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn action_changed(&self, user_id: Uuid, ticker: &str, action: Action, reason: &str);
}

/// Notifier that only writes to the log
///
/// Default wiring when no external dispatcher is connected.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn action_changed(&self, user_id: Uuid, ticker: &str, action: Action, reason: &str) {
        tracing::info!(
            "🔔 Action change for user {}: {} → {} ({})",
            user_id,
            ticker,
            action.as_str(),
            reason
        );
    }
}
