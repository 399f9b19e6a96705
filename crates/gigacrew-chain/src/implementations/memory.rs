//! In-process ledger.
//!
//! Keeps services, escrows and the emitted event log in memory and mines one
//! block per state-changing call. Clones share the same chain, and
//! [`MemoryLedger::as_account`] gives each participant its own handle, so a
//! buyer and a seller can trade against one instance.

use crate::{
	ChainError, EscrowReceipt, EscrowRequest, LedgerInterface, WorkReceipt,
};
use alloy::primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use gigacrew_types::{
	current_timestamp, ChainEvent, EventFilter, EventPosition, LedgerEvent, ServiceMetadata,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Default time a buyer has to dispute delivered work.
pub const DEFAULT_LOCK_DURATION_SECS: u64 = 3600;

#[derive(Debug, Clone)]
struct Escrow {
	buyer: Address,
	seller: Address,
	withdrawn: bool,
}

#[derive(Debug, Default)]
struct ChainState {
	head: u64,
	events: Vec<ChainEvent>,
	services: HashMap<U256, ServiceMetadata>,
	escrows: HashMap<U256, Escrow>,
	next_service_id: u64,
	next_order_id: u64,
	tx_count: u64,
	failing_fetches: u32,
	submissions: Vec<(U256, String)>,
	withdrawals: Vec<(U256, Address)>,
}

impl ChainState {
	/// Mines a block holding `event` and returns its position.
	fn mine_with(&mut self, event: LedgerEvent) -> EventPosition {
		self.head += 1;
		let position = EventPosition {
			block_number: self.head,
			log_index: 0,
		};
		self.events.push(ChainEvent { position, event });
		position
	}

	fn next_tx_hash(&mut self) -> B256 {
		self.tx_count += 1;
		keccak256(self.tx_count.to_be_bytes())
	}
}

#[derive(Clone)]
pub struct MemoryLedger {
	state: Arc<Mutex<ChainState>>,
	account: Option<Address>,
	lock_duration: u64,
}

impl Default for MemoryLedger {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryLedger {
	pub fn new() -> Self {
		Self {
			state: Arc::new(Mutex::new(ChainState::default())),
			account: None,
			lock_duration: DEFAULT_LOCK_DURATION_SECS,
		}
	}

	/// Handle on the same chain that signs as `account`.
	pub fn as_account(&self, account: Address) -> Self {
		Self {
			state: Arc::clone(&self.state),
			account: Some(account),
			lock_duration: self.lock_duration,
		}
	}

	/// Lock period granted on work submitted through this handle.
	pub fn with_lock_duration(mut self, seconds: u64) -> Self {
		self.lock_duration = seconds;
		self
	}

	pub async fn register_service(&self, metadata: ServiceMetadata) -> Result<U256, ChainError> {
		let provider: Address = metadata
			.provider
			.parse()
			.map_err(|_| ChainError::Config(format!("invalid provider {}", metadata.provider)))?;
		let mut state = self.state.lock().await;
		state.next_service_id += 1;
		let service_id = U256::from(state.next_service_id);
		state.services.insert(service_id, metadata);
		state.mine_with(LedgerEvent::ServiceRegistered {
			service_id,
			provider,
		});
		Ok(service_id)
	}

	/// Replaces the listing of an existing service and announces it again.
	/// The paused flag is kept.
	pub async fn update_service(
		&self,
		service_id: U256,
		metadata: ServiceMetadata,
	) -> Result<(), ChainError> {
		let provider: Address = metadata
			.provider
			.parse()
			.map_err(|_| ChainError::Config(format!("invalid provider {}", metadata.provider)))?;
		let mut state = self.state.lock().await;
		let service = state
			.services
			.get_mut(&service_id)
			.ok_or_else(|| ChainError::Reverted(format!("unknown service {}", service_id)))?;
		*service = ServiceMetadata {
			paused: service.paused,
			..metadata
		};
		state.mine_with(LedgerEvent::ServiceRegistered {
			service_id,
			provider,
		});
		Ok(())
	}

	pub async fn pause_service(&self, service_id: U256) -> Result<(), ChainError> {
		self.set_paused(service_id, true).await
	}

	pub async fn resume_service(&self, service_id: U256) -> Result<(), ChainError> {
		self.set_paused(service_id, false).await
	}

	async fn set_paused(&self, service_id: U256, paused: bool) -> Result<(), ChainError> {
		let mut state = self.state.lock().await;
		let service = state
			.services
			.get_mut(&service_id)
			.ok_or_else(|| ChainError::Reverted(format!("unknown service {}", service_id)))?;
		service.paused = paused;
		let event = if paused {
			LedgerEvent::ServicePaused { service_id }
		} else {
			LedgerEvent::ServiceResumed { service_id }
		};
		state.mine_with(event);
		Ok(())
	}

	/// Opens a dispute window on `order_id` closing at `resolution_period`.
	pub async fn raise_dispute(
		&self,
		order_id: U256,
		resolution_period: u64,
	) -> Result<(), ChainError> {
		let mut state = self.state.lock().await;
		let escrow = state
			.escrows
			.get(&order_id)
			.cloned()
			.ok_or_else(|| ChainError::Reverted(format!("unknown order {}", order_id)))?;
		state.mine_with(LedgerEvent::DisputeRaised {
			order_id,
			buyer: escrow.buyer,
			seller: escrow.seller,
			resolution_period,
		});
		Ok(())
	}

	/// Appends `event` to the log at an explicit position without touching
	/// escrow state. Advances the head if needed.
	pub async fn push_event(&self, position: EventPosition, event: LedgerEvent) {
		let mut state = self.state.lock().await;
		state.head = state.head.max(position.block_number);
		state.events.push(ChainEvent { position, event });
	}

	/// Mines `count` empty blocks.
	pub async fn mine(&self, count: u64) {
		self.state.lock().await.head += count;
	}

	pub async fn head(&self) -> u64 {
		self.state.lock().await.head
	}

	/// Makes the next `count` event queries fail with a network error.
	pub async fn fail_next_fetches(&self, count: u32) {
		self.state.lock().await.failing_fetches = count;
	}

	/// Work submitted so far, in submission order.
	pub async fn submissions(&self) -> Vec<(U256, String)> {
		self.state.lock().await.submissions.clone()
	}

	/// Withdrawals so far with the account that made them.
	pub async fn withdrawals(&self) -> Vec<(U256, Address)> {
		self.state.lock().await.withdrawals.clone()
	}

	fn signer(&self) -> Result<Address, ChainError> {
		self.account.ok_or(ChainError::NoSigner)
	}
}

#[async_trait]
impl LedgerInterface for MemoryLedger {
	fn account(&self) -> Option<Address> {
		self.account
	}

	async fn block_number(&self) -> Result<u64, ChainError> {
		Ok(self.state.lock().await.head)
	}

	async fn get_events(
		&self,
		filter: &EventFilter,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<ChainEvent>, ChainError> {
		let mut state = self.state.lock().await;
		if state.failing_fetches > 0 {
			state.failing_fetches -= 1;
			return Err(ChainError::Network("injected fetch failure".to_string()));
		}

		let mut events: Vec<ChainEvent> = state
			.events
			.iter()
			.filter(|e| {
				(from_block..=to_block).contains(&e.position.block_number)
					&& filter.matches(&e.event)
			})
			.cloned()
			.collect();
		events.sort_by_key(|e| e.position);
		Ok(events)
	}

	async fn service(&self, service_id: U256) -> Result<ServiceMetadata, ChainError> {
		self.state
			.lock()
			.await
			.services
			.get(&service_id)
			.cloned()
			.ok_or_else(|| ChainError::Reverted(format!("unknown service {}", service_id)))
	}

	async fn create_escrow(&self, request: &EscrowRequest) -> Result<EscrowReceipt, ChainError> {
		let buyer = self.signer()?;
		let mut state = self.state.lock().await;

		let service = state
			.services
			.get(&request.service_id)
			.cloned()
			.ok_or_else(|| ChainError::Reverted(format!("unknown service {}", request.service_id)))?;
		if service.paused {
			return Err(ChainError::Reverted(format!(
				"service {} is paused",
				request.service_id
			)));
		}
		let price = match &request.proposal {
			Some(proposal) => {
				if proposal.expiry < current_timestamp() {
					return Err(ChainError::Reverted("proposal expired".to_string()));
				}
				proposal.price
			}
			None => service
				.price
				.parse::<U256>()
				.map_err(|e| ChainError::Decode(e.to_string()))?,
		};
		if request.value < price {
			return Err(ChainError::Reverted("insufficient payment".to_string()));
		}
		let seller: Address = service
			.provider
			.parse()
			.map_err(|_| ChainError::Decode(format!("invalid provider {}", service.provider)))?;

		state.next_order_id += 1;
		let order_id = U256::from(state.next_order_id);
		state.escrows.insert(
			order_id,
			Escrow {
				buyer,
				seller,
				withdrawn: false,
			},
		);
		let position = state.mine_with(LedgerEvent::EscrowCreated {
			order_id,
			buyer,
			seller,
			service_id: request.service_id,
			deadline: current_timestamp() + request.deadline_period,
			context: request.context.clone(),
		});
		let tx_hash = state.next_tx_hash();
		debug!(%order_id, %buyer, %seller, "Escrow created");

		Ok(EscrowReceipt {
			order_id,
			tx_hash,
			block_number: position.block_number,
		})
	}

	async fn submit_work(&self, order_id: U256, work: &str) -> Result<WorkReceipt, ChainError> {
		let account = self.signer()?;
		let mut state = self.state.lock().await;
		let escrow = state
			.escrows
			.get(&order_id)
			.cloned()
			.ok_or_else(|| ChainError::Reverted(format!("unknown order {}", order_id)))?;
		if escrow.seller != account {
			return Err(ChainError::Reverted("caller is not the seller".to_string()));
		}

		let lock_period = current_timestamp() + self.lock_duration;
		state.submissions.push((order_id, work.to_string()));
		state.mine_with(LedgerEvent::WorkSubmitted {
			order_id,
			buyer: escrow.buyer,
			seller: escrow.seller,
			work: work.to_string(),
			lock_period,
		});
		Ok(WorkReceipt {
			tx_hash: state.next_tx_hash(),
			lock_period: Some(lock_period),
		})
	}

	async fn withdraw_funds(&self, order_id: U256) -> Result<B256, ChainError> {
		let account = self.signer()?;
		let mut state = self.state.lock().await;
		let escrow = state
			.escrows
			.get_mut(&order_id)
			.ok_or_else(|| ChainError::Reverted(format!("unknown order {}", order_id)))?;
		if escrow.withdrawn {
			return Err(ChainError::Reverted("already withdrawn".to_string()));
		}
		escrow.withdrawn = true;
		state.withdrawals.push((order_id, account));
		state.head += 1;
		Ok(state.next_tx_hash())
	}
}
