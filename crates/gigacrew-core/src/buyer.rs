//! Buyer role.
//!
//! Opens escrows for services (at list price or from an accepted proposal)
//! and hands delivered work to whoever is waiting for it.

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use gigacrew_chain::{EscrowProposal, EscrowRequest, LedgerInterface};
use gigacrew_negotiation::SignedProposal;
use gigacrew_sync::{EventHandler, HandlerError, Subscription};
use gigacrew_types::{ChainEvent, EventFilter, EventKind, LedgerEvent};
use std::sync::Arc;
use tracing::{debug, info};

use crate::waiters::{Resolution, WorkWaiters};
use crate::CoordinatorError;

/// Shortest deadline period accepted for a new escrow, in seconds.
pub const MIN_DEADLINE_PERIOD_SECS: u64 = 100;

pub struct BuyerHandler {
	ledger: Arc<dyn LedgerInterface>,
	address: Address,
	waiters: WorkWaiters,
}

impl BuyerHandler {
	pub fn new(ledger: Arc<dyn LedgerInterface>) -> Result<Self, CoordinatorError> {
		let address = ledger
			.account()
			.ok_or_else(|| CoordinatorError::Config("buyer ledger has no signer".to_string()))?;
		Ok(Self {
			ledger,
			address,
			waiters: WorkWaiters::new(),
		})
	}

	pub fn address(&self) -> Address {
		self.address
	}

	/// Work submitted to this buyer.
	pub fn subscriptions(self: &Arc<Self>) -> Vec<Subscription> {
		vec![Subscription::new(
			"buyer-work",
			EventFilter::new(EventKind::WorkSubmitted).with_buyer(self.address),
			self.clone(),
		)]
	}

	/// Pays the listed price into a new escrow and returns its order id.
	///
	/// `deadline_period` is raised to [`MIN_DEADLINE_PERIOD_SECS`].
	pub async fn create_escrow(
		&self,
		service_id: U256,
		deadline_period: u64,
		context: &str,
	) -> Result<String, CoordinatorError> {
		let service = self.ledger.service(service_id).await?;
		let price = U256::from_str_radix(&service.price, 10)
			.map_err(|e| CoordinatorError::Config(format!("Invalid service price: {}", e)))?;

		let receipt = self
			.ledger
			.create_escrow(&EscrowRequest {
				service_id,
				deadline_period: deadline_period.max(MIN_DEADLINE_PERIOD_SECS),
				context: context.to_string(),
				value: price,
				proposal: None,
			})
			.await?;

		let order_id = receipt.order_id.to_string();
		info!(%order_id, %service_id, tx_hash = %receipt.tx_hash, "Escrow created");
		Ok(order_id)
	}

	/// Opens the escrow a seller committed to in a signed proposal.
	///
	/// The deadline is taken from the proposal unchanged since the signature
	/// covers it.
	pub async fn create_escrow_from_proposal(
		&self,
		service_id: U256,
		proposal: &SignedProposal,
		context: &str,
	) -> Result<String, CoordinatorError> {
		let signature: Bytes = proposal
			.signature
			.parse()
			.map_err(|e| CoordinatorError::InvalidProposal(format!("signature: {}", e)))?;

		let receipt = self
			.ledger
			.create_escrow(&EscrowRequest {
				service_id,
				deadline_period: proposal.deadline_seconds,
				context: context.to_string(),
				value: proposal.price,
				proposal: Some(EscrowProposal {
					trail: proposal.trail,
					expiry: proposal.expiry,
					price: proposal.price,
					signature,
				}),
			})
			.await?;

		let order_id = receipt.order_id.to_string();
		info!(%order_id, %service_id, price = %proposal.price, "Escrow created from proposal");
		Ok(order_id)
	}

	/// Waits until the seller submits work for `order_id`.
	pub async fn wait_for_work(&self, order_id: &str) -> Result<String, CoordinatorError> {
		self.waiters.wait(order_id).await
	}

	pub fn waiters(&self) -> &WorkWaiters {
		&self.waiters
	}
}

#[async_trait]
impl EventHandler for BuyerHandler {
	async fn handle(&self, event: &ChainEvent) -> Result<(), HandlerError> {
		if let LedgerEvent::WorkSubmitted { order_id, work, .. } = &event.event {
			let order_id = order_id.to_string();
			info!(%order_id, "Work received");
			if self.waiters.resolve(&order_id, work.clone()).await == Resolution::Cached {
				debug!(%order_id, "No waiter yet, holding work");
			}
		}
		Ok(())
	}
}
