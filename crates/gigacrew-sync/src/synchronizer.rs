//! Windowed event synchronizer.

use futures::future::join_all;
use gigacrew_chain::LedgerInterface;
use gigacrew_ledger::CheckpointStore;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{dedup_latest, Subscription, SyncConfig, SyncError};

/// Result of one pass over the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
	/// Every block up to `head` is processed.
	CaughtUp { head: u64 },
	/// Head is behind the next block to process; nothing to do yet.
	Idle { head: u64, next_block: u64 },
}

pub struct Synchronizer {
	ledger: Arc<dyn LedgerInterface>,
	checkpoint: CheckpointStore,
	subscriptions: Vec<Subscription>,
	config: SyncConfig,
	/// Cleared after the first committed window when starting is forced.
	force_pending: bool,
}

impl Synchronizer {
	pub fn new(
		ledger: Arc<dyn LedgerInterface>,
		checkpoint: CheckpointStore,
		subscriptions: Vec<Subscription>,
		config: SyncConfig,
	) -> Self {
		let force_pending = config.force_start_block;
		Self {
			ledger,
			checkpoint,
			subscriptions,
			config,
			force_pending,
		}
	}

	pub fn consumer(&self) -> &str {
		self.checkpoint.consumer()
	}

	/// First block that has not been fully processed.
	pub async fn resume_point(&self) -> Result<u64, SyncError> {
		if self.force_pending {
			return Ok(self.config.start_block);
		}
		let next = match self.checkpoint.load().await? {
			Some(block) => block + 1,
			None => 0,
		};
		Ok(next.max(self.config.start_block))
	}

	/// Processes every window between the resume point and the current head.
	///
	/// Stops at the first failing window without advancing past it.
	pub async fn sync_to_head(&mut self) -> Result<SyncOutcome, SyncError> {
		let mut from_block = self.resume_point().await?;
		let head = self.ledger.block_number().await?;
		if head < from_block {
			return Ok(SyncOutcome::Idle {
				head,
				next_block: from_block,
			});
		}

		let range = self.config.max_block_range.max(1);
		while from_block <= head {
			let to_block = from_block.saturating_add(range - 1).min(head);
			self.process_window(from_block, to_block).await?;
			from_block = to_block + 1;
		}
		Ok(SyncOutcome::CaughtUp { head })
	}

	/// Fetches, deduplicates and dispatches one window, then commits it.
	pub async fn process_window(&mut self, from_block: u64, to_block: u64) -> Result<(), SyncError> {
		debug!(consumer = %self.consumer(), from_block, to_block, "Processing window");
		let batch_size = self.config.batch_size.max(1);

		for subscription in &self.subscriptions {
			let events = self
				.ledger
				.get_events(&subscription.filter, from_block, to_block)
				.await?;
			let events = dedup_latest(events);
			if events.is_empty() {
				continue;
			}
			debug!(
				subscription = %subscription.name,
				count = events.len(),
				"Dispatching events"
			);

			for batch in events.chunks(batch_size) {
				let results =
					join_all(batch.iter().map(|event| subscription.handler.handle(event))).await;
				if let Some(e) = results.into_iter().find_map(Result::err) {
					return Err(SyncError::Handler {
						subscription: subscription.name.clone(),
						from_block,
						to_block,
						source: e,
					});
				}
			}
		}

		self.checkpoint.save(to_block).await?;
		self.force_pending = false;
		Ok(())
	}

	/// Runs until `shutdown` flips to true, sleeping `poll_interval` between
	/// passes. Failed passes are retried from the same checkpoint.
	pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
		info!(
			consumer = %self.consumer(),
			subscriptions = self.subscriptions.len(),
			"Starting synchronizer"
		);

		loop {
			if *shutdown.borrow() {
				break;
			}

			match self.sync_to_head().await {
				Ok(SyncOutcome::CaughtUp { head }) => {
					debug!(consumer = %self.consumer(), head, "Caught up");
				}
				Ok(SyncOutcome::Idle { head, next_block }) => {
					debug!(consumer = %self.consumer(), head, next_block, "Waiting for new blocks");
				}
				Err(e @ SyncError::Chain(_)) => {
					warn!(consumer = %self.consumer(), error = %e, "Ledger unavailable, retrying");
				}
				Err(e) => {
					error!(consumer = %self.consumer(), error = %e, "Sync pass failed, retrying");
				}
			}

			tokio::select! {
				_ = tokio::time::sleep(self.config.poll_interval) => {}
				changed = shutdown.changed() => {
					if changed.is_err() {
						break;
					}
				}
			}
		}

		info!(consumer = %self.consumer(), "Synchronizer stopped");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{EventHandler, HandlerError};
	use alloy::primitives::{Address, U256};
	use async_trait::async_trait;
	use gigacrew_chain::MemoryLedger;
	use gigacrew_ledger::OrderLedger;
	use gigacrew_storage::StorageService;
	use gigacrew_types::{
		ChainEvent, EventFilter, EventKind, EventPosition, LedgerEvent, Order, OrderStatus,
	};
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	/// Records escrows into an order ledger, optionally failing one call.
	struct RecordingHandler {
		orders: Arc<OrderLedger>,
		calls: AtomicUsize,
		fail_on_call: Option<usize>,
	}

	impl RecordingHandler {
		fn new(orders: Arc<OrderLedger>, fail_on_call: Option<usize>) -> Arc<Self> {
			Arc::new(Self {
				orders,
				calls: AtomicUsize::new(0),
				fail_on_call,
			})
		}
	}

	#[async_trait]
	impl EventHandler for RecordingHandler {
		async fn handle(&self, event: &ChainEvent) -> Result<(), HandlerError> {
			let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
			if self.fail_on_call == Some(call) {
				return Err(HandlerError::Failed("simulated crash".to_string()));
			}
			if let LedgerEvent::EscrowCreated {
				order_id,
				buyer,
				seller,
				service_id,
				deadline,
				context,
			} = &event.event
			{
				self.orders
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
			}
			Ok(())
		}
	}

	fn escrow(order_id: u64) -> LedgerEvent {
		LedgerEvent::EscrowCreated {
			order_id: U256::from(order_id),
			buyer: Address::repeat_byte(0x0b),
			seller: Address::repeat_byte(0x05),
			service_id: U256::from(1),
			deadline: u64::MAX,
			context: format!("task {}", order_id),
		}
	}

	async fn push(chain: &MemoryLedger, block_number: u64, event: LedgerEvent) {
		chain
			.push_event(
				EventPosition {
					block_number,
					log_index: 0,
				},
				event,
			)
			.await;
	}

	fn config(start_block: u64, max_block_range: u64) -> SyncConfig {
		SyncConfig {
			start_block,
			force_start_block: false,
			max_block_range,
			batch_size: 2,
			poll_interval: Duration::from_millis(10),
		}
	}

	fn synchronizer(
		chain: &MemoryLedger,
		storage: &Arc<StorageService>,
		handler: Arc<RecordingHandler>,
		config: SyncConfig,
	) -> Synchronizer {
		Synchronizer::new(
			Arc::new(chain.clone()),
			CheckpointStore::new(storage.clone(), "orders"),
			vec![Subscription::new(
				"escrows",
				EventFilter::new(EventKind::EscrowCreated),
				handler,
			)],
			config,
		)
	}

	#[tokio::test]
	async fn test_walks_windows_and_commits_checkpoint() {
		let chain = MemoryLedger::new();
		let storage = Arc::new(StorageService::in_memory());
		let orders = Arc::new(OrderLedger::new(storage.clone()));
		for block in [1, 4, 5, 9] {
			push(&chain, block, escrow(block)).await;
		}
		chain.mine(1).await;

		let handler = RecordingHandler::new(orders.clone(), None);
		let mut sync = synchronizer(&chain, &storage, handler.clone(), config(0, 3));
		assert_eq!(
			sync.sync_to_head().await.unwrap(),
			SyncOutcome::CaughtUp { head: 10 }
		);

		assert_eq!(handler.calls.load(Ordering::SeqCst), 4);
		assert_eq!(orders.list_active().await.unwrap().len(), 4);
		let checkpoint = CheckpointStore::new(storage, "orders");
		assert_eq!(checkpoint.load().await.unwrap(), Some(10));
	}

	#[tokio::test]
	async fn test_resumes_failed_window_without_duplicate_rows() {
		let chain = MemoryLedger::new();
		let storage = Arc::new(StorageService::in_memory());
		let orders = Arc::new(OrderLedger::new(storage.clone()));
		for (block, order) in [(2, 1), (3, 2), (3, 3), (7, 4)] {
			push(&chain, block, escrow(order)).await;
		}

		// the third dispatch in window 0..=4 fails after two rows were written
		let crashing = RecordingHandler::new(orders.clone(), Some(3));
		let mut sync = synchronizer(&chain, &storage, crashing, config(0, 5));
		assert!(matches!(
			sync.sync_to_head().await,
			Err(SyncError::Handler { from_block: 0, to_block: 4, .. })
		));
		assert_eq!(orders.list_active().await.unwrap().len(), 2);
		assert_eq!(sync.resume_point().await.unwrap(), 0);

		// a fresh process picks up from the persisted checkpoint
		let handler = RecordingHandler::new(orders.clone(), None);
		let mut restarted = synchronizer(&chain, &storage, handler.clone(), config(0, 5));
		restarted.sync_to_head().await.unwrap();

		assert_eq!(handler.calls.load(Ordering::SeqCst), 4);
		assert_eq!(orders.list_active().await.unwrap().len(), 4);
		assert_eq!(restarted.resume_point().await.unwrap(), 8);
	}

	#[tokio::test]
	async fn test_transient_fetch_failure_retries_same_range() {
		let chain = MemoryLedger::new();
		let storage = Arc::new(StorageService::in_memory());
		let orders = Arc::new(OrderLedger::new(storage.clone()));
		push(&chain, 3, escrow(1)).await;
		chain.fail_next_fetches(1).await;

		let handler = RecordingHandler::new(orders.clone(), None);
		let mut sync = synchronizer(&chain, &storage, handler.clone(), config(0, 10));
		assert!(matches!(sync.sync_to_head().await, Err(SyncError::Chain(_))));
		assert_eq!(sync.resume_point().await.unwrap(), 0);

		sync.sync_to_head().await.unwrap();
		assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
		assert_eq!(sync.resume_point().await.unwrap(), 4);
	}

	#[tokio::test]
	async fn test_idles_when_head_is_behind() {
		let chain = MemoryLedger::new();
		chain.mine(5).await;
		let storage = Arc::new(StorageService::in_memory());
		let orders = Arc::new(OrderLedger::new(storage.clone()));
		let handler = RecordingHandler::new(orders, None);

		let mut sync = synchronizer(&chain, &storage, handler.clone(), config(20, 10));
		assert_eq!(
			sync.sync_to_head().await.unwrap(),
			SyncOutcome::Idle {
				head: 5,
				next_block: 20
			}
		);
		assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_forced_start_replays_from_start_block_once() {
		let chain = MemoryLedger::new();
		let storage = Arc::new(StorageService::in_memory());
		CheckpointStore::new(storage.clone(), "orders")
			.save(40)
			.await
			.unwrap();
		chain.mine(50).await;

		let orders = Arc::new(OrderLedger::new(storage.clone()));
		let handler = RecordingHandler::new(orders, None);
		let mut forced = config(10, 100);
		forced.force_start_block = true;
		let mut sync = synchronizer(&chain, &storage, handler, forced);

		assert_eq!(sync.resume_point().await.unwrap(), 10);
		sync.sync_to_head().await.unwrap();
		assert_eq!(sync.resume_point().await.unwrap(), 51);
	}

	#[tokio::test]
	async fn test_run_stops_on_shutdown() {
		let chain = MemoryLedger::new();
		let storage = Arc::new(StorageService::in_memory());
		let orders = Arc::new(OrderLedger::new(storage.clone()));
		push(&chain, 1, escrow(1)).await;

		let handler = RecordingHandler::new(orders.clone(), None);
		let sync = synchronizer(&chain, &storage, handler, config(0, 10));
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let task = tokio::spawn(sync.run(shutdown_rx));

		tokio::time::sleep(Duration::from_millis(50)).await;
		shutdown_tx.send(true).unwrap();
		tokio::time::timeout(Duration::from_secs(1), task)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(orders.list_active().await.unwrap().len(), 1);
	}
}
