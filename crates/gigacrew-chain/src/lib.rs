//! # GigaCrew Chain
//!
//! Boundary between the agent and the ledger contract. A ledger source must
//! report its head, return typed events for a block range and submit the
//! escrow transactions the coordinator needs. Any client with that shape is
//! interchangeable.
//!
//! Implementations:
//! - [`implementations::alloy::AlloyLedger`] - JSON-RPC via alloy
//! - [`implementations::memory::MemoryLedger`] - in-process ledger for tests and local runs

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use gigacrew_types::{ChainEvent, EventFilter, ServiceMetadata};
use thiserror::Error;

pub mod implementations {
	pub mod alloy;
	pub mod memory;
}

pub use implementations::alloy::AlloyLedger;
pub use implementations::memory::MemoryLedger;

#[derive(Debug, Error)]
pub enum ChainError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Decode error: {0}")]
	Decode(String),
	#[error("Transaction {0} reverted")]
	Reverted(String),
	#[error("Receipt of {tx_hash} carries no {event} event")]
	MissingEvent { tx_hash: String, event: &'static str },
	#[error("No signing account configured")]
	NoSigner,
	#[error("Invalid configuration: {0}")]
	Config(String),
}

/// Seller commitment attached to an escrow created from a negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowProposal {
	pub trail: B256,
	pub expiry: u64,
	pub price: U256,
	pub signature: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowRequest {
	pub service_id: U256,
	/// Seconds from creation until the order expires.
	pub deadline_period: u64,
	pub context: String,
	/// Funds locked into the escrow.
	pub value: U256,
	pub proposal: Option<EscrowProposal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowReceipt {
	/// Ledger-assigned order id.
	pub order_id: U256,
	pub tx_hash: B256,
	pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkReceipt {
	pub tx_hash: B256,
	/// Lock period emitted with the submission, when present in the receipt.
	pub lock_period: Option<u64>,
}

#[async_trait]
pub trait LedgerInterface: Send + Sync {
	/// Account that signs transactions, if any.
	fn account(&self) -> Option<Address>;

	/// Current chain head.
	async fn block_number(&self) -> Result<u64, ChainError>;

	/// Events matching `filter` in `[from_block, to_block]`.
	async fn get_events(
		&self,
		filter: &EventFilter,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<ChainEvent>, ChainError>;

	/// Current metadata of a registered service.
	async fn service(&self, service_id: U256) -> Result<ServiceMetadata, ChainError>;

	async fn create_escrow(&self, request: &EscrowRequest) -> Result<EscrowReceipt, ChainError>;

	/// Submits the delivered work as proof of work for `order_id`.
	async fn submit_work(&self, order_id: U256, work: &str) -> Result<WorkReceipt, ChainError>;

	async fn withdraw_funds(&self, order_id: U256) -> Result<B256, ChainError>;
}
