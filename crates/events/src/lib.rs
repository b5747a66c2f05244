//! Ledger events and in-process publication.
//!
//! Events are published only **after** the ledger transaction that produced
//! them has committed; subscribers (alert dashboards, sync workers) never see
//! staged state.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, NullEventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
