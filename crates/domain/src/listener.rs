use async_trait::async_trait;
use event_store::EventRecord;

/// Receives records right after a successful append.
///
/// Listeners run after the append is durable, so they cannot fail the
/// command that produced the records. Implementations log and recover from
/// their own failures.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Handles the records of one append, in sequence order.
    async fn on_appended(&self, records: &[EventRecord]);
}
