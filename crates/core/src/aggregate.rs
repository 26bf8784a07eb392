//! Command/event split for state that must only change through validated facts.

/// Anything whose accepted transitions are counted.
pub trait AggregateRoot {
    /// Bumped by exactly one per accepted transition; the ordering key for
    /// notifications and the staleness check for readers.
    fn version(&self) -> u64;
}

/// Pure decide/evolve pair.
///
/// `handle` inspects a command against the current state and either rejects it
/// or returns the events it implies, without touching state. `apply` folds one
/// event in. A caller may persist the events between the two steps and discard
/// them if the write fails.
///
/// No IO here.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
