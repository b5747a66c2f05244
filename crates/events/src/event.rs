use chrono::{DateTime, Utc};

/// A fact about the ledger, published after it was committed.
///
/// Events are immutable and versioned. Consumers route on `event_type` and
/// correlate on `subject`.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "inventory.movement.registered").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Id of the document the event is about (movement id, alert id).
    fn subject(&self) -> String;

    /// When the fact became true (commit time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
