//! Service catalog projection.

use gigacrew_storage::StorageService;
use gigacrew_types::{ServiceMetadata, ServiceRecord};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::LedgerError;

const NAMESPACE: &str = "services";

pub struct ServiceCatalog {
	storage: Arc<StorageService>,
	write_lock: Mutex<()>,
}

impl ServiceCatalog {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			write_lock: Mutex::new(()),
		}
	}

	pub async fn get(&self, service_id: &str) -> Result<Option<ServiceRecord>, LedgerError> {
		Ok(self.storage.retrieve_optional(NAMESPACE, service_id).await?)
	}

	pub async fn list(&self) -> Result<Vec<ServiceRecord>, LedgerError> {
		Ok(self.storage.retrieve_all(NAMESPACE).await?)
	}

	/// Replaces the metadata of a service, creating the entry if needed.
	pub async fn upsert_metadata(
		&self,
		service_id: &str,
		metadata: ServiceMetadata,
	) -> Result<(), LedgerError> {
		self.upsert(service_id, |record| {
			record.paused = metadata.paused;
			record.metadata = Some(metadata);
		})
		.await
	}

	pub async fn set_paused(&self, service_id: &str, paused: bool) -> Result<(), LedgerError> {
		self.upsert(service_id, |record| {
			record.paused = paused;
			if let Some(metadata) = record.metadata.as_mut() {
				metadata.paused = paused;
			}
		})
		.await
	}

	async fn upsert<F>(&self, service_id: &str, apply: F) -> Result<(), LedgerError>
	where
		F: FnOnce(&mut ServiceRecord),
	{
		let _guard = self.write_lock.lock().await;
		let mut record = self
			.storage
			.retrieve_optional::<ServiceRecord>(NAMESPACE, service_id)
			.await?
			.unwrap_or_else(|| ServiceRecord::new(service_id));
		apply(&mut record);
		self.storage.store(NAMESPACE, service_id, &record).await?;
		Ok(())
	}
}
