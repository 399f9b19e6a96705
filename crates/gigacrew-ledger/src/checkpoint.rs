//! Durable sync checkpoints.

use gigacrew_storage::StorageService;
use std::sync::Arc;

use crate::LedgerError;

const NAMESPACE: &str = "checkpoint";

/// Last block height an event consumer fully processed.
///
/// Each consumer (the agent's order ledger, the service catalog) keeps its
/// own checkpoint so they can progress independently.
pub struct CheckpointStore {
	storage: Arc<StorageService>,
	consumer: String,
}

impl CheckpointStore {
	pub fn new(storage: Arc<StorageService>, consumer: impl Into<String>) -> Self {
		Self {
			storage,
			consumer: consumer.into(),
		}
	}

	pub fn consumer(&self) -> &str {
		&self.consumer
	}

	pub async fn load(&self) -> Result<Option<u64>, LedgerError> {
		Ok(self.storage.retrieve_optional(NAMESPACE, &self.consumer).await?)
	}

	pub async fn save(&self, block_number: u64) -> Result<(), LedgerError> {
		Ok(self
			.storage
			.store(NAMESPACE, &self.consumer, &block_number)
			.await?)
	}
}
