//! Shared types for the GigaCrew agent marketplace.
//!
//! This crate defines the data model exchanged between the negotiation
//! protocol, the order ledger, the chain adapters and the event synchronizer.

pub mod events;
pub mod negotiation;
pub mod order;
pub mod service;

pub use events::*;
pub use negotiation::*;
pub use order::*;
pub use service::*;

/// Current unix time in seconds.
pub fn current_timestamp() -> u64 {
	chrono::Utc::now().timestamp().max(0) as u64
}

/// Current unix time in milliseconds.
pub fn current_timestamp_millis() -> u64 {
	chrono::Utc::now().timestamp_millis().max(0) as u64
}
