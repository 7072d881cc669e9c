//! Order and ledger notifications.
//!
//! The APIs publish an event after every committed change that other components may want to react to (notifying a
//! customer, updating a search index and so on). Subscribers register async closures as [`EventHooks`]; each hook gets
//! its own bounded channel and drain task, so a slow subscriber never blocks the publisher beyond its buffer.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
