//! Seller-side work generation.
//!
//! The coordinator only needs the final result string; how a generator gets
//! there (model calls, polling a third party) is its own business.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::CoordinatorError;

#[async_trait]
pub trait WorkGenerator: Send + Sync {
	/// Produces the work owed for `order_id` given the buyer's context.
	async fn generate(
		&self,
		order_id: &str,
		buyer: &str,
		context: &str,
	) -> Result<String, CoordinatorError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkRequest<'a> {
	order_id: &'a str,
	buyer: &'a str,
	context: &'a str,
}

/// Delegates work to an HTTP endpoint.
///
/// Posts `{orderId, buyer, context}` as JSON and takes the response body as
/// the result.
pub struct HttpWorkGenerator {
	client: reqwest::Client,
	endpoint: String,
	api_key: Option<String>,
}

impl HttpWorkGenerator {
	pub fn new(
		endpoint: impl Into<String>,
		api_key: Option<String>,
		timeout: Duration,
	) -> Result<Self, CoordinatorError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| CoordinatorError::Config(format!("Failed to create HTTP client: {}", e)))?;
		Ok(Self {
			client,
			endpoint: endpoint.into(),
			api_key,
		})
	}
}

#[async_trait]
impl WorkGenerator for HttpWorkGenerator {
	async fn generate(
		&self,
		order_id: &str,
		buyer: &str,
		context: &str,
	) -> Result<String, CoordinatorError> {
		let mut request = self.client.post(&self.endpoint).json(&WorkRequest {
			order_id,
			buyer,
			context,
		});
		if let Some(api_key) = &self.api_key {
			request = request.bearer_auth(api_key);
		}

		let response = request
			.send()
			.await
			.map_err(|e| CoordinatorError::Work(format!("HTTP request failed: {}", e)))?;

		if !response.status().is_success() {
			return Err(CoordinatorError::Work(format!(
				"HTTP request failed with status: {}",
				response.status()
			)));
		}

		let work = response
			.text()
			.await
			.map_err(|e| CoordinatorError::Work(format!("Failed to read response: {}", e)))?;
		debug!(order_id, bytes = work.len(), "Work generated");
		Ok(work)
	}
}
