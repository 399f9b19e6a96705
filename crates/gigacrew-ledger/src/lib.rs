//! Persistent projections kept by a GigaCrew agent.
//!
//! - [`OrderLedger`] - escrow orders and their lock/resolution windows
//! - [`CheckpointStore`] - last fully processed block per event consumer
//! - [`ServiceCatalog`] - service metadata indexed from ledger events
//!
//! Every write is an idempotent upsert so that replaying a block range
//! after a crash never creates duplicate rows.

use gigacrew_storage::StorageError;
use thiserror::Error;

pub mod catalog;
pub mod checkpoint;
pub mod orders;

pub use catalog::ServiceCatalog;
pub use checkpoint::CheckpointStore;
pub use orders::OrderLedger;

#[derive(Debug, Error)]
pub enum LedgerError {
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}
