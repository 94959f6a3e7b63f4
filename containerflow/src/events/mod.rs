//! Lifecycle events and the sinks that receive them.
//!
//! The engine builds a [`LifecycleEvent`] for each run and stage transition
//! and hands it to one [`EventSink`]. Every run produces exactly one
//! terminal event.

mod event;
mod sink;

pub use event::{kinds, EventScope, LifecycleEvent};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
