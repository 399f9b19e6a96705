use gigacrew_chain::ChainError;
use gigacrew_ledger::LedgerError;
use gigacrew_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
	#[error("Chain error: {0}")]
	Chain(#[from] ChainError),

	#[error("Ledger error: {0}")]
	Ledger(#[from] LedgerError),

	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),

	#[error("Order {0} already has a waiter")]
	AlreadyWaiting(String),

	#[error("Work for order {0} was already delivered")]
	AlreadyDelivered(String),

	#[error("Waiter for order {0} was dropped")]
	WaiterDropped(String),

	#[error("Invalid order id: {0}")]
	InvalidOrderId(String),

	#[error("Invalid proposal: {0}")]
	InvalidProposal(String),

	#[error("Work generation failed: {0}")]
	Work(String),

	#[error("Configuration error: {0}")]
	Config(String),
}
