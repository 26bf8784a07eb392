use chrono::{DateTime, Utc};

/// A fact emitted by an aggregate's decision logic.
///
/// Events describe what was accepted; they are applied to state and never edited.
/// The type name is stable across releases (it ends up in logs).
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, e.g. `"ledger.movement.deposited"`.
    fn event_type(&self) -> &'static str;

    /// Bumped when the payload shape changes.
    fn schema_version(&self) -> u32;

    /// When the fact was accepted.
    fn occurred_at(&self) -> DateTime<Utc>;
}
