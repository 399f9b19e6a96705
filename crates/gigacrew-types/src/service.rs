//! Service catalog entries projected from ledger events.

use serde::{Deserialize, Serialize};

/// Service metadata as stored by the ledger contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMetadata {
	pub paused: bool,
	pub provider: String,
	/// Price in the smallest currency unit, decimal string.
	pub price: String,
	pub title: String,
	pub description: String,
	/// Endpoint of the seller's negotiation channel.
	pub communication_channel: String,
}

/// Catalog projection of a service.
///
/// A pause or resume can be observed before the registration that carries
/// the metadata, so everything but the id and the paused flag is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
	pub service_id: String,
	pub paused: bool,
	pub metadata: Option<ServiceMetadata>,
}

impl ServiceRecord {
	pub fn new(service_id: impl Into<String>) -> Self {
		Self {
			service_id: service_id.into(),
			paused: false,
			metadata: None,
		}
	}
}
