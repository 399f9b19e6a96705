//! Seller role.
//!
//! Escrows opened against this seller are projected into the order ledger
//! by the event handlers below. A reconciliation loop then works through
//! the ledger: expired orders are purged, active ones get their work
//! generated and submitted, and elapsed escrows are withdrawn.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use gigacrew_chain::LedgerInterface;
use gigacrew_ledger::OrderLedger;
use gigacrew_sync::{EventHandler, HandlerError, Subscription};
use gigacrew_types::{ChainEvent, EventFilter, EventKind, LedgerEvent, Order, OrderStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::worker::WorkGenerator;
use crate::CoordinatorError;

/// Counts from one reconciliation round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
	pub purged: usize,
	pub submitted: usize,
	pub withdrawn: usize,
	pub failed: usize,
}

pub struct SellerHandler {
	ledger: Arc<dyn LedgerInterface>,
	orders: Arc<OrderLedger>,
	worker: Arc<dyn WorkGenerator>,
	address: Address,
	service_id: Option<U256>,
}

impl SellerHandler {
	pub fn new(
		ledger: Arc<dyn LedgerInterface>,
		orders: Arc<OrderLedger>,
		worker: Arc<dyn WorkGenerator>,
	) -> Result<Self, CoordinatorError> {
		let address = ledger
			.account()
			.ok_or_else(|| CoordinatorError::Config("seller ledger has no signer".to_string()))?;
		Ok(Self {
			ledger,
			orders,
			worker,
			address,
			service_id: None,
		})
	}

	/// Only take escrows opened against `service_id`.
	pub fn with_service_id(mut self, service_id: U256) -> Self {
		self.service_id = Some(service_id);
		self
	}

	pub fn address(&self) -> Address {
		self.address
	}

	/// One subscription per escrow event addressed to this seller, creation
	/// first so later events in a window find their order.
	pub fn subscriptions(self: &Arc<Self>) -> Vec<Subscription> {
		[
			("seller-escrows", EventKind::EscrowCreated),
			("seller-work", EventKind::WorkSubmitted),
			("seller-disputes", EventKind::DisputeRaised),
		]
		.into_iter()
		.map(|(name, kind)| {
			Subscription::new(
				name,
				EventFilter::new(kind).with_seller(self.address),
				self.clone(),
			)
		})
		.collect()
	}

	/// Runs one pass over the order ledger.
	///
	/// Per-order failures are counted and left for the next round.
	pub async fn reconcile(&self) -> Result<ReconcileReport, CoordinatorError> {
		let mut report = ReconcileReport {
			purged: self.orders.purge_inactive().await?,
			..Default::default()
		};
		if report.purged > 0 {
			info!(count = report.purged, "Purged inactive orders");
		}

		for order in self.orders.list_active().await? {
			match self.fulfil(&order).await {
				Ok(()) => report.submitted += 1,
				Err(e) => {
					warn!(order_id = %order.order_id, error = %e, "Failed to fulfil order");
					report.failed += 1;
				}
			}
		}

		let mut withdrawn = Vec::new();
		for order in self.orders.list_withdrawable().await? {
			match self.withdraw(&order).await {
				Ok(()) => withdrawn.push(order.order_id),
				Err(e) => {
					warn!(order_id = %order.order_id, error = %e, "Failed to withdraw funds");
					report.failed += 1;
				}
			}
		}
		report.withdrawn = self.orders.delete_by_ids(&withdrawn).await?;

		Ok(report)
	}

	async fn fulfil(&self, order: &Order) -> Result<(), CoordinatorError> {
		let order_id = parse_order_id(&order.order_id)?;
		let work = self
			.worker
			.generate(&order.order_id, &order.buyer_address, &order.context)
			.await?;
		let receipt = self.ledger.submit_work(order_id, &work).await?;
		info!(order_id = %order.order_id, tx_hash = %receipt.tx_hash, "Work submitted");

		if let Some(lock_period) = receipt.lock_period {
			self.orders
				.set_lock_period(&order.order_id, lock_period)
				.await?;
		}
		Ok(())
	}

	async fn withdraw(&self, order: &Order) -> Result<(), CoordinatorError> {
		let tx_hash = self
			.ledger
			.withdraw_funds(parse_order_id(&order.order_id)?)
			.await?;
		info!(order_id = %order.order_id, %tx_hash, "Funds withdrawn");
		Ok(())
	}

	/// Reconciles every `interval` until `shutdown` flips to true.
	pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
		info!(seller = %self.address, "Starting seller loop");
		loop {
			if *shutdown.borrow() {
				break;
			}

			match self.reconcile().await {
				Ok(report) => debug!(?report, "Reconciliation round finished"),
				Err(e) => error!(error = %e, "Reconciliation round failed"),
			}

			tokio::select! {
				_ = tokio::time::sleep(interval) => {}
				changed = shutdown.changed() => {
					if changed.is_err() {
						break;
					}
				}
			}
		}
		info!("Seller loop stopped");
	}
}

fn parse_order_id(order_id: &str) -> Result<U256, CoordinatorError> {
	U256::from_str_radix(order_id, 10)
		.map_err(|_| CoordinatorError::InvalidOrderId(order_id.to_string()))
}

#[async_trait]
impl EventHandler for SellerHandler {
	async fn handle(&self, event: &ChainEvent) -> Result<(), HandlerError> {
		match &event.event {
			LedgerEvent::EscrowCreated {
				order_id,
				buyer,
				seller,
				service_id,
				deadline,
				context,
			} => {
				if self.service_id.is_some_and(|own| own != *service_id) {
					debug!(%order_id, %service_id, "Ignoring escrow for another service");
					return Ok(());
				}
				let inserted = self
					.orders
					.insert(&Order {
						order_id: order_id.to_string(),
						service_id: service_id.to_string(),
						buyer_address: buyer.to_string(),
						seller_address: seller.to_string(),
						status: OrderStatus::Open,
						context: context.clone(),
						deadline: *deadline,
						lock_period: None,
						resolution_period: None,
					})
					.await?;
				if inserted {
					info!(%order_id, %buyer, "New order");
				}
			}
			LedgerEvent::WorkSubmitted {
				order_id,
				lock_period,
				..
			} => {
				self.orders
					.set_lock_period(&order_id.to_string(), *lock_period)
					.await?;
			}
			LedgerEvent::DisputeRaised {
				order_id,
				resolution_period,
				..
			} => {
				warn!(%order_id, resolution_period, "Dispute raised");
				self.orders
					.set_resolution_period(&order_id.to_string(), *resolution_period)
					.await?;
			}
			_ => {}
		}
		Ok(())
	}
}
