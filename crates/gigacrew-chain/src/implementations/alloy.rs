//! Alloy-based ledger client.
//!
//! Reads events through `eth_getLogs`, reads service metadata through
//! `eth_call` and submits escrow transactions signed by an optional local
//! key. Raw logs are decoded into [`LedgerEvent`] right here so nothing
//! downstream handles untyped arguments.

use crate::{
	ChainError, EscrowReceipt, EscrowRequest, LedgerInterface, WorkReceipt,
};
use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use gigacrew_types::{
	ChainEvent, EventFilter, EventKind, EventPosition, LedgerEvent, ServiceMetadata,
};
use tracing::{debug, info, warn};

sol! {
	/// GigaCrew escrow and service registry contract.
	interface IGigaCrew {
		event ServiceRegistered(uint256 indexed serviceId, address indexed provider);
		event ServicePaused(uint256 indexed serviceId);
		event ServiceResumed(uint256 indexed serviceId);
		event EscrowCreated(
			uint256 indexed orderId,
			address indexed buyer,
			address indexed seller,
			uint256 serviceId,
			uint256 deadline,
			string context
		);
		event PoWSubmitted(
			uint256 indexed orderId,
			address indexed buyer,
			address indexed seller,
			string work,
			uint256 lockPeriod
		);
		event DisputeRaised(
			uint256 indexed orderId,
			address indexed buyer,
			address indexed seller,
			uint256 resolutionPeriod
		);

		function services(uint256 serviceId) external view returns (
			bool paused,
			address provider,
			uint256 price,
			string title,
			string description,
			string communicationChannel
		);
		function createEscrow(uint256 serviceId, uint256 deadlinePeriod, string context) external payable;
		function createEscrowWithProposal(
			uint256 serviceId,
			bytes32 trail,
			uint256 proposalExpiry,
			uint256 price,
			uint256 deadlinePeriod,
			bytes proposalSignature,
			string context
		) external payable;
		function submitPoW(uint256 orderId, string work) external;
		function withdrawFunds(uint256 orderId) external;
	}
}

fn signature_hash(kind: EventKind) -> B256 {
	match kind {
		EventKind::ServiceRegistered => IGigaCrew::ServiceRegistered::SIGNATURE_HASH,
		EventKind::ServicePaused => IGigaCrew::ServicePaused::SIGNATURE_HASH,
		EventKind::ServiceResumed => IGigaCrew::ServiceResumed::SIGNATURE_HASH,
		EventKind::EscrowCreated => IGigaCrew::EscrowCreated::SIGNATURE_HASH,
		EventKind::WorkSubmitted => IGigaCrew::PoWSubmitted::SIGNATURE_HASH,
		EventKind::DisputeRaised => IGigaCrew::DisputeRaised::SIGNATURE_HASH,
	}
}

fn decode<E: SolEvent>(log: &Log) -> Result<E, ChainError> {
	log.log_decode::<E>()
		.map(|decoded| decoded.inner.data)
		.map_err(|e| ChainError::Decode(format!("{}: {}", E::SIGNATURE, e)))
}

/// Decodes a contract log into its typed event.
pub fn decode_log(log: &Log) -> Result<LedgerEvent, ChainError> {
	let topic0 = log
		.topic0()
		.copied()
		.ok_or_else(|| ChainError::Decode("anonymous log".to_string()))?;

	let event = if topic0 == IGigaCrew::ServiceRegistered::SIGNATURE_HASH {
		let e = decode::<IGigaCrew::ServiceRegistered>(log)?;
		LedgerEvent::ServiceRegistered {
			service_id: e.serviceId,
			provider: e.provider,
		}
	} else if topic0 == IGigaCrew::ServicePaused::SIGNATURE_HASH {
		let e = decode::<IGigaCrew::ServicePaused>(log)?;
		LedgerEvent::ServicePaused {
			service_id: e.serviceId,
		}
	} else if topic0 == IGigaCrew::ServiceResumed::SIGNATURE_HASH {
		let e = decode::<IGigaCrew::ServiceResumed>(log)?;
		LedgerEvent::ServiceResumed {
			service_id: e.serviceId,
		}
	} else if topic0 == IGigaCrew::EscrowCreated::SIGNATURE_HASH {
		let e = decode::<IGigaCrew::EscrowCreated>(log)?;
		LedgerEvent::EscrowCreated {
			order_id: e.orderId,
			buyer: e.buyer,
			seller: e.seller,
			service_id: e.serviceId,
			deadline: e.deadline.saturating_to(),
			context: e.context,
		}
	} else if topic0 == IGigaCrew::PoWSubmitted::SIGNATURE_HASH {
		let e = decode::<IGigaCrew::PoWSubmitted>(log)?;
		LedgerEvent::WorkSubmitted {
			order_id: e.orderId,
			buyer: e.buyer,
			seller: e.seller,
			work: e.work,
			lock_period: e.lockPeriod.saturating_to(),
		}
	} else if topic0 == IGigaCrew::DisputeRaised::SIGNATURE_HASH {
		let e = decode::<IGigaCrew::DisputeRaised>(log)?;
		LedgerEvent::DisputeRaised {
			order_id: e.orderId,
			buyer: e.buyer,
			seller: e.seller,
			resolution_period: e.resolutionPeriod.saturating_to(),
		}
	} else {
		return Err(ChainError::Decode(format!("unknown event topic {}", topic0)));
	};
	Ok(event)
}

fn position(log: &Log) -> EventPosition {
	EventPosition {
		block_number: log.block_number.unwrap_or_default(),
		log_index: log.log_index.unwrap_or_default(),
	}
}

/// Ledger client for a deployed GigaCrew contract.
pub struct AlloyLedger {
	provider: DynProvider,
	contract: Address,
	account: Option<Address>,
}

impl AlloyLedger {
	/// Connects to `rpc_url` (http, https, ws or wss). Transactions are
	/// signed with `signer` when given; without it the client is read-only.
	pub async fn connect(
		rpc_url: &str,
		contract: Address,
		signer: Option<PrivateKeySigner>,
	) -> Result<Self, ChainError> {
		let account = signer.as_ref().map(|s| s.address());
		let provider = match signer {
			Some(signer) => ProviderBuilder::new()
				.wallet(EthereumWallet::from(signer))
				.connect(rpc_url)
				.await
				.map_err(|e| ChainError::Network(format!("Failed to connect: {}", e)))?
				.erased(),
			None => ProviderBuilder::new()
				.connect(rpc_url)
				.await
				.map_err(|e| ChainError::Network(format!("Failed to connect: {}", e)))?
				.erased(),
		};

		info!(%contract, account = ?account, "Connected to ledger");
		Ok(Self {
			provider,
			contract,
			account,
		})
	}

	fn build_filter(&self, filter: &EventFilter, from_block: u64, to_block: u64) -> Filter {
		let signatures: Vec<B256> = filter.kinds.iter().copied().map(signature_hash).collect();
		let mut query = Filter::new()
			.address(self.contract)
			.event_signature(signatures)
			.from_block(from_block)
			.to_block(to_block);

		// Participant topics sit at the same positions for every escrow event,
		// so they can only be pushed to the node when no other kind is mixed in.
		if filter.kinds.iter().all(EventKind::is_order_event) {
			if let Some(buyer) = filter.buyer {
				query = query.topic2(buyer.into_word());
			}
			if let Some(seller) = filter.seller {
				query = query.topic3(seller.into_word());
			}
		}
		query
	}

	async fn send(&self, input: Vec<u8>, value: U256) -> Result<TransactionReceipt, ChainError> {
		if self.account.is_none() {
			return Err(ChainError::NoSigner);
		}

		let request = TransactionRequest::default()
			.with_to(self.contract)
			.with_input(input)
			.with_value(value);

		let pending = self
			.provider
			.send_transaction(request)
			.await
			.map_err(|e| ChainError::Network(format!("Failed to send transaction: {}", e)))?;
		debug!(tx_hash = %pending.tx_hash(), "Submitted transaction");

		let receipt = pending
			.get_receipt()
			.await
			.map_err(|e| ChainError::Network(format!("Failed to get receipt: {}", e)))?;

		if !receipt.status() {
			return Err(ChainError::Reverted(receipt.transaction_hash.to_string()));
		}
		Ok(receipt)
	}

	fn receipt_event<E: SolEvent>(receipt: &TransactionReceipt) -> Option<E> {
		receipt
			.inner
			.logs()
			.iter()
			.find_map(|log| log.log_decode::<E>().ok())
			.map(|decoded| decoded.inner.data)
	}
}

#[async_trait]
impl LedgerInterface for AlloyLedger {
	fn account(&self) -> Option<Address> {
		self.account
	}

	async fn block_number(&self) -> Result<u64, ChainError> {
		self.provider
			.get_block_number()
			.await
			.map_err(|e| ChainError::Network(format!("Failed to get block number: {}", e)))
	}

	async fn get_events(
		&self,
		filter: &EventFilter,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<ChainEvent>, ChainError> {
		let query = self.build_filter(filter, from_block, to_block);
		let logs = self
			.provider
			.get_logs(&query)
			.await
			.map_err(|e| ChainError::Network(format!("Failed to get logs: {}", e)))?;

		collect_events(&logs, filter)
	}

	async fn service(&self, service_id: U256) -> Result<ServiceMetadata, ChainError> {
		let call = IGigaCrew::servicesCall {
			serviceId: service_id,
		};
		let request = TransactionRequest::default()
			.with_to(self.contract)
			.with_input(call.abi_encode());
		let output = self
			.provider
			.call(request)
			.await
			.map_err(|e| ChainError::Network(format!("Failed to read service: {}", e)))?;
		let service = IGigaCrew::servicesCall::abi_decode_returns(&output)
			.map_err(|e| ChainError::Decode(e.to_string()))?;

		Ok(ServiceMetadata {
			paused: service.paused,
			provider: service.provider.to_string(),
			price: service.price.to_string(),
			title: service.title,
			description: service.description,
			communication_channel: service.communicationChannel,
		})
	}

	async fn create_escrow(&self, request: &EscrowRequest) -> Result<EscrowReceipt, ChainError> {
		let deadline_period = U256::from(request.deadline_period);
		let input = match &request.proposal {
			Some(proposal) => IGigaCrew::createEscrowWithProposalCall {
				serviceId: request.service_id,
				trail: proposal.trail,
				proposalExpiry: U256::from(proposal.expiry),
				price: proposal.price,
				deadlinePeriod: deadline_period,
				proposalSignature: proposal.signature.clone(),
				context: request.context.clone(),
			}
			.abi_encode(),
			None => IGigaCrew::createEscrowCall {
				serviceId: request.service_id,
				deadlinePeriod: deadline_period,
				context: request.context.clone(),
			}
			.abi_encode(),
		};

		let receipt = self.send(input, request.value).await?;
		let created = Self::receipt_event::<IGigaCrew::EscrowCreated>(&receipt).ok_or_else(|| {
			ChainError::MissingEvent {
				tx_hash: receipt.transaction_hash.to_string(),
				event: "EscrowCreated",
			}
		})?;

		Ok(EscrowReceipt {
			order_id: created.orderId,
			tx_hash: receipt.transaction_hash,
			block_number: receipt.block_number.unwrap_or_default(),
		})
	}

	async fn submit_work(&self, order_id: U256, work: &str) -> Result<WorkReceipt, ChainError> {
		let input = IGigaCrew::submitPoWCall {
			orderId: order_id,
			work: work.to_string(),
		}
		.abi_encode();
		let receipt = self.send(input, U256::ZERO).await?;
		let lock_period = Self::receipt_event::<IGigaCrew::PoWSubmitted>(&receipt)
			.map(|submitted| submitted.lockPeriod.saturating_to());

		Ok(WorkReceipt {
			tx_hash: receipt.transaction_hash,
			lock_period,
		})
	}

	async fn withdraw_funds(&self, order_id: U256) -> Result<B256, ChainError> {
		let input = IGigaCrew::withdrawFundsCall { orderId: order_id }.abi_encode();
		let receipt = self.send(input, U256::ZERO).await?;
		Ok(receipt.transaction_hash)
	}
}

/// Decodes fetched logs and keeps the ones `filter` matches.
///
/// A log that fails to decode fails the whole range so it is fetched again.
fn collect_events(logs: &[Log], filter: &EventFilter) -> Result<Vec<ChainEvent>, ChainError> {
	let mut events = Vec::with_capacity(logs.len());
	for log in logs {
		let event = decode_log(log).map_err(|e| {
			let at = position(log);
			warn!(
				block_number = at.block_number,
				log_index = at.log_index,
				error = %e,
				"Undecodable log in range"
			);
			ChainError::Decode(format!(
				"log {} in block {}: {}",
				at.log_index, at.block_number, e
			))
		})?;
		if filter.matches(&event) {
			events.push(ChainEvent {
				position: position(log),
				event,
			});
		}
	}
	Ok(events)
}
