//! Typed ledger events.
//!
//! Chain clients decode raw logs into [`LedgerEvent`] at the ingestion
//! boundary so that every consumer past that point is fully typed.

use alloy::primitives::{Address, U256};

/// Event kinds emitted by the GigaCrew ledger contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	ServiceRegistered,
	ServicePaused,
	ServiceResumed,
	EscrowCreated,
	WorkSubmitted,
	DisputeRaised,
}

impl EventKind {
	pub fn is_order_event(&self) -> bool {
		matches!(
			self,
			Self::EscrowCreated | Self::WorkSubmitted | Self::DisputeRaised
		)
	}
}

/// Position of a log in the chain. Orders events by true recency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventPosition {
	pub block_number: u64,
	pub log_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
	ServiceRegistered {
		service_id: U256,
		provider: Address,
	},
	ServicePaused {
		service_id: U256,
	},
	ServiceResumed {
		service_id: U256,
	},
	EscrowCreated {
		order_id: U256,
		buyer: Address,
		seller: Address,
		service_id: U256,
		/// Absolute unix time.
		deadline: u64,
		context: String,
	},
	WorkSubmitted {
		order_id: U256,
		buyer: Address,
		seller: Address,
		work: String,
		/// Absolute unix time before which the buyer cannot withdraw.
		lock_period: u64,
	},
	DisputeRaised {
		order_id: U256,
		buyer: Address,
		seller: Address,
		/// Absolute unix time at which the dispute window closes.
		resolution_period: u64,
	},
}

impl LedgerEvent {
	pub fn kind(&self) -> EventKind {
		match self {
			Self::ServiceRegistered { .. } => EventKind::ServiceRegistered,
			Self::ServicePaused { .. } => EventKind::ServicePaused,
			Self::ServiceResumed { .. } => EventKind::ServiceResumed,
			Self::EscrowCreated { .. } => EventKind::EscrowCreated,
			Self::WorkSubmitted { .. } => EventKind::WorkSubmitted,
			Self::DisputeRaised { .. } => EventKind::DisputeRaised,
		}
	}

	/// Entity the event describes: the service id for catalog events, the
	/// order id for escrow events.
	pub fn entity_key(&self) -> U256 {
		match self {
			Self::ServiceRegistered { service_id, .. }
			| Self::ServicePaused { service_id }
			| Self::ServiceResumed { service_id } => *service_id,
			Self::EscrowCreated { order_id, .. }
			| Self::WorkSubmitted { order_id, .. }
			| Self::DisputeRaised { order_id, .. } => *order_id,
		}
	}

	pub fn buyer(&self) -> Option<Address> {
		match self {
			Self::EscrowCreated { buyer, .. }
			| Self::WorkSubmitted { buyer, .. }
			| Self::DisputeRaised { buyer, .. } => Some(*buyer),
			_ => None,
		}
	}

	pub fn seller(&self) -> Option<Address> {
		match self {
			Self::EscrowCreated { seller, .. }
			| Self::WorkSubmitted { seller, .. }
			| Self::DisputeRaised { seller, .. } => Some(*seller),
			_ => None,
		}
	}
}

/// A decoded event together with where it was emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
	pub position: EventPosition,
	pub event: LedgerEvent,
}

/// Selects ledger events by kind and, for escrow events, by participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
	pub kinds: Vec<EventKind>,
	pub buyer: Option<Address>,
	pub seller: Option<Address>,
}

impl EventFilter {
	pub fn new(kind: EventKind) -> Self {
		Self {
			kinds: vec![kind],
			buyer: None,
			seller: None,
		}
	}

	pub fn any_of(kinds: impl IntoIterator<Item = EventKind>) -> Self {
		Self {
			kinds: kinds.into_iter().collect(),
			buyer: None,
			seller: None,
		}
	}

	pub fn with_buyer(mut self, buyer: Address) -> Self {
		self.buyer = Some(buyer);
		self
	}

	pub fn with_seller(mut self, seller: Address) -> Self {
		self.seller = Some(seller);
		self
	}

	pub fn matches(&self, event: &LedgerEvent) -> bool {
		if !self.kinds.contains(&event.kind()) {
			return false;
		}
		if let Some(buyer) = self.buyer {
			if event.buyer() != Some(buyer) {
				return false;
			}
		}
		if let Some(seller) = self.seller {
			if event.seller() != Some(seller) {
				return false;
			}
		}
		true
	}
}
