//! Event log subsystem
//!
//! This module provides the durable structured-event log every connection
//! handler writes to.
//!
//! Components:
//! - `types`: the event records and the ordered-multimap header type.
//! - `sink`: the shared append-only sink (local JSONL store, durability floor).
//! - `remote`: the optional remote mirror capability.

pub mod remote;
pub mod sink;
pub mod types;

pub use remote::RemoteTarget;
pub use sink::EventSink;
pub use types::{Event, Headers};
