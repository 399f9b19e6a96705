//! # GigaCrew Sync
//!
//! Follows the ledger contract's event log and feeds it to registered
//! handlers.
//!
//! A [`Synchronizer`] walks `[from, head]` in windows of at most
//! `max_block_range` blocks. Within a window every [`Subscription`] fetches
//! its events, keeps only the newest event per entity and dispatches the
//! survivors in concurrent batches. The consumer's checkpoint moves to the
//! window's last block only once every handler succeeded, so a failed or
//! interrupted window is replayed in full on the next tick. Delivery is
//! therefore at least once and handlers must be idempotent.

use async_trait::async_trait;
use gigacrew_chain::ChainError;
use gigacrew_ledger::LedgerError;
use gigacrew_types::{ChainEvent, EventFilter};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod dedup;
pub mod synchronizer;

pub use dedup::dedup_latest;
pub use synchronizer::{SyncOutcome, Synchronizer};

#[derive(Debug, Error)]
pub enum HandlerError {
	#[error("Ledger error: {0}")]
	Ledger(#[from] LedgerError),
	#[error("Chain error: {0}")]
	Chain(#[from] ChainError),
	#[error("{0}")]
	Failed(String),
}

#[derive(Debug, Error)]
pub enum SyncError {
	#[error("Chain error: {0}")]
	Chain(#[from] ChainError),
	#[error("Checkpoint error: {0}")]
	Checkpoint(#[from] LedgerError),
	#[error("Handler {subscription} failed in blocks {from_block}..={to_block}: {source}")]
	Handler {
		subscription: String,
		from_block: u64,
		to_block: u64,
		#[source]
		source: HandlerError,
	},
}

/// Reacts to one decoded ledger event.
#[async_trait]
pub trait EventHandler: Send + Sync {
	async fn handle(&self, event: &ChainEvent) -> Result<(), HandlerError>;
}

/// A filter and the handler its events are dispatched to.
#[derive(Clone)]
pub struct Subscription {
	pub name: String,
	pub filter: EventFilter,
	pub handler: Arc<dyn EventHandler>,
}

impl Subscription {
	pub fn new(
		name: impl Into<String>,
		filter: EventFilter,
		handler: Arc<dyn EventHandler>,
	) -> Self {
		Self {
			name: name.into(),
			filter,
			handler,
		}
	}
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
	/// Lowest block ever processed.
	pub start_block: u64,
	/// Start from `start_block` even when a checkpoint exists.
	pub force_start_block: bool,
	pub max_block_range: u64,
	/// Handlers awaited together before the next batch is issued.
	pub batch_size: usize,
	pub poll_interval: Duration,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			start_block: 0,
			force_start_block: false,
			max_block_range: 50,
			batch_size: 10,
			poll_interval: Duration::from_secs(5),
		}
	}
}
