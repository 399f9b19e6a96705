//! Service catalog indexer.

use async_trait::async_trait;
use gigacrew_chain::LedgerInterface;
use gigacrew_ledger::ServiceCatalog;
use gigacrew_sync::{EventHandler, HandlerError, Subscription};
use gigacrew_types::{ChainEvent, EventFilter, EventKind, LedgerEvent};
use std::sync::Arc;
use tracing::info;

/// Keeps a [`ServiceCatalog`] in step with service registrations and
/// pause/resume toggles.
pub struct CatalogIndexer {
	ledger: Arc<dyn LedgerInterface>,
	catalog: Arc<ServiceCatalog>,
}

impl CatalogIndexer {
	pub fn new(ledger: Arc<dyn LedgerInterface>, catalog: Arc<ServiceCatalog>) -> Self {
		Self { ledger, catalog }
	}

	/// Registrations, then pause/resume toggles. Toggles share one filter so
	/// that only the latest one per service in a window survives.
	pub fn subscriptions(self: &Arc<Self>) -> Vec<Subscription> {
		vec![
			Subscription::new(
				"services-registered",
				EventFilter::new(EventKind::ServiceRegistered),
				self.clone(),
			),
			Subscription::new(
				"services-status",
				EventFilter::any_of([EventKind::ServicePaused, EventKind::ServiceResumed]),
				self.clone(),
			),
		]
	}
}

#[async_trait]
impl EventHandler for CatalogIndexer {
	async fn handle(&self, event: &ChainEvent) -> Result<(), HandlerError> {
		match &event.event {
			LedgerEvent::ServiceRegistered {
				service_id,
				provider,
			} => {
				info!(%service_id, %provider, "Service registered");
				let metadata = self.ledger.service(*service_id).await?;
				self.catalog
					.upsert_metadata(&service_id.to_string(), metadata)
					.await?;
			}
			LedgerEvent::ServicePaused { service_id } => {
				info!(%service_id, "Service paused");
				self.catalog.set_paused(&service_id.to_string(), true).await?;
			}
			LedgerEvent::ServiceResumed { service_id } => {
				info!(%service_id, "Service resumed");
				self.catalog.set_paused(&service_id.to_string(), false).await?;
			}
			_ => {}
		}
		Ok(())
	}
}
