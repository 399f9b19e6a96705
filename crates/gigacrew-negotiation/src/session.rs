//! Turn-taking negotiation over a transport.
//!
//! Both sides keep a trail pointer that starts at [`INITIAL_TRAIL`] and is
//! advanced by every message sent or accepted. Turns strictly alternate; a
//! peer that speaks out of turn, breaks the chain or forges a proposal ends
//! the negotiation. Violations are never retried.

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use gigacrew_types::{current_timestamp_millis, NegotiationMessage, INITIAL_TRAIL};
use thiserror::Error;
use tracing::{info, warn};

use crate::proposal::{build_proposal, ProposalDraft, ProposalError, SignedProposal};
use crate::trail::calc_trail;
use crate::transport::{NegotiationTransport, TransportError, TransportEvent};
use crate::validator::{validate_message, RejectReason, ValidatedMessage};

/// User-facing reason reported whenever the peer broke the protocol.
pub const PROTOCOL_VIOLATION_REASON: &str =
	"The negotiation failed due to the counterparty not following the protocol properly.";

#[derive(Debug, Error)]
pub enum SessionError {
	#[error("{reason}")]
	ProtocolViolation {
		reason: String,
		cause: Option<RejectReason>,
	},
	#[error("It is not our turn to speak")]
	OutOfTurn,
	#[error("Negotiation channel closed")]
	Closed,
	#[error("Transport error: {0}")]
	Transport(String),
	#[error(transparent)]
	Proposal(#[from] ProposalError),
}

impl From<TransportError> for SessionError {
	fn from(error: TransportError) -> Self {
		match error {
			TransportError::Closed => Self::Closed,
			TransportError::Connection(e) => Self::Transport(e),
		}
	}
}

/// A message accepted from the peer.
#[derive(Debug, Clone)]
pub struct Incoming {
	pub message: NegotiationMessage,
	/// Present when the message is a validated proposal.
	pub proposal: Option<SignedProposal>,
}

pub struct NegotiationSession<T: NegotiationTransport> {
	transport: T,
	trail: String,
	counterparty: Option<Address>,
	our_turn: bool,
	closed: bool,
}

impl<T: NegotiationTransport> NegotiationSession<T> {
	/// Buyer side: speaks first and only accepts proposals signed by the
	/// service provider.
	pub fn buyer(transport: T, provider: Address) -> Self {
		Self {
			transport,
			trail: INITIAL_TRAIL.to_string(),
			counterparty: Some(provider),
			our_turn: true,
			closed: false,
		}
	}

	/// Seller side: waits for the buyer to open. Buyers cannot propose.
	pub fn seller(transport: T) -> Self {
		Self {
			transport,
			trail: INITIAL_TRAIL.to_string(),
			counterparty: None,
			our_turn: false,
			closed: false,
		}
	}

	pub fn trail(&self) -> &str {
		&self.trail
	}

	pub fn is_closed(&self) -> bool {
		self.closed
	}

	pub async fn send_text(&mut self, content: impl Into<String>) -> Result<(), SessionError> {
		self.ensure_our_turn()?;
		let message =
			NegotiationMessage::plain(content, current_timestamp_millis(), self.trail.clone());
		let next_trail = calc_trail(&message);
		self.send(message, next_trail).await
	}

	/// Sends a signed proposal committing to the negotiation so far.
	pub async fn send_proposal(
		&mut self,
		signer: &PrivateKeySigner,
		draft: &ProposalDraft,
	) -> Result<(), SessionError> {
		self.ensure_our_turn()?;
		let (message, next_trail) =
			build_proposal(signer, draft, &self.trail, current_timestamp_millis())?;
		self.send(message, next_trail).await
	}

	/// Waits for the peer's next turn.
	pub async fn receive(&mut self) -> Result<Incoming, SessionError> {
		if self.closed {
			return Err(SessionError::Closed);
		}

		let raw = match self.transport.next_event().await {
			TransportEvent::Message(raw) => raw,
			TransportEvent::Closed => {
				self.closed = true;
				return Err(SessionError::Closed);
			}
			TransportEvent::Error(e) => {
				self.closed = true;
				return Err(SessionError::Transport(e));
			}
		};

		if self.our_turn {
			warn!("Counterparty spoke out of turn");
			return Err(self.abort(None).await);
		}

		match validate_message(&raw, &self.trail, self.counterparty) {
			Ok(validated) => self.accept(validated).await,
			Err(rejection) => {
				if let Some(trail) = rejection.trail {
					self.trail = trail;
				}
				Err(self.abort(Some(rejection.reason)).await)
			}
		}
	}

	async fn accept(&mut self, validated: ValidatedMessage) -> Result<Incoming, SessionError> {
		self.trail = validated.trail;
		self.our_turn = true;
		let proposal = match (validated.message.is_proposal(), self.counterparty) {
			(true, Some(provider)) => {
				match SignedProposal::from_message(&validated.message, &self.trail, provider) {
					Ok(proposal) => Some(proposal),
					Err(e) => {
						warn!(error = %e, "Unusable proposal");
						return Err(self.abort(None).await);
					}
				}
			}
			_ => None,
		};
		Ok(Incoming {
			message: validated.message,
			proposal,
		})
	}

	pub async fn close(&mut self) {
		if !self.closed {
			self.transport.close().await;
			self.closed = true;
		}
	}

	fn ensure_our_turn(&self) -> Result<(), SessionError> {
		if self.closed {
			return Err(SessionError::Closed);
		}
		if !self.our_turn {
			return Err(SessionError::OutOfTurn);
		}
		Ok(())
	}

	async fn send(
		&mut self,
		message: NegotiationMessage,
		next_trail: String,
	) -> Result<(), SessionError> {
		let text = serde_json::to_string(&message)
			.map_err(|e| SessionError::Transport(e.to_string()))?;
		self.transport.send(text).await?;
		self.trail = next_trail;
		self.our_turn = false;
		Ok(())
	}

	async fn abort(&mut self, cause: Option<RejectReason>) -> SessionError {
		info!(trail = %self.trail, "Closing negotiation after protocol violation");
		self.close().await;
		SessionError::ProtocolViolation {
			reason: PROTOCOL_VIOLATION_REASON.to_string(),
			cause,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transport::ChannelTransport;
	use alloy::primitives::U256;

	fn draft() -> ProposalDraft {
		ProposalDraft {
			content: "here is my offer".to_string(),
			terms: "security review".to_string(),
			price: U256::from(42u64),
			deadline_minutes: 10,
			expiry: 1_900_000_000,
		}
	}

	#[tokio::test]
	async fn test_full_negotiation_ends_with_signed_proposal() {
		let seller_key = PrivateKeySigner::random();
		let (buyer_end, seller_end) = ChannelTransport::pair();
		let mut buyer = NegotiationSession::buyer(buyer_end, seller_key.address());
		let mut seller = NegotiationSession::seller(seller_end);

		buyer.send_text("Hello! I need an audit.").await.unwrap();
		let opening = seller.receive().await.unwrap();
		assert_eq!(opening.message.content, "Hello! I need an audit.");
		assert!(opening.proposal.is_none());

		seller.send_proposal(&seller_key, &draft()).await.unwrap();
		let offer = buyer.receive().await.unwrap();
		let proposal = offer.proposal.expect("proposal");
		assert_eq!(proposal.provider, seller_key.address());
		assert_eq!(proposal.price, U256::from(42u64));
		assert_eq!(proposal.deadline_seconds, 600);
		assert_eq!(buyer.trail(), seller.trail());
	}

	#[tokio::test]
	async fn test_out_of_turn_message_aborts() {
		let (buyer_end, mut peer) = ChannelTransport::pair();
		let mut buyer = NegotiationSession::buyer(buyer_end, Address::ZERO);

		let message =
			NegotiationMessage::plain("me first", current_timestamp_millis(), INITIAL_TRAIL);
		peer.send(serde_json::to_string(&message).unwrap())
			.await
			.unwrap();

		let err = buyer.receive().await.unwrap_err();
		assert!(matches!(err, SessionError::ProtocolViolation { cause: None, .. }));
		assert!(buyer.is_closed());
	}

	#[tokio::test]
	async fn test_forked_trail_aborts() {
		let (buyer_end, seller_end) = ChannelTransport::pair();
		let mut buyer = NegotiationSession::buyer(buyer_end, Address::ZERO);
		let mut raw_seller = seller_end;

		buyer.send_text("hello").await.unwrap();
		let _ = raw_seller.next_event().await;

		let forged =
			NegotiationMessage::plain("reply", current_timestamp_millis(), INITIAL_TRAIL);
		raw_seller
			.send(serde_json::to_string(&forged).unwrap())
			.await
			.unwrap();

		let err = buyer.receive().await.unwrap_err();
		assert!(matches!(
			err,
			SessionError::ProtocolViolation {
				cause: Some(RejectReason::TrailMismatch { .. }),
				..
			}
		));
	}

	#[tokio::test]
	async fn test_buyer_proposal_is_refused_by_seller() {
		let buyer_key = PrivateKeySigner::random();
		let (buyer_end, seller_end) = ChannelTransport::pair();
		let mut buyer = NegotiationSession::buyer(buyer_end, Address::ZERO);
		let mut seller = NegotiationSession::seller(seller_end);

		buyer.send_proposal(&buyer_key, &draft()).await.unwrap();
		let err = seller.receive().await.unwrap_err();
		assert!(matches!(
			err,
			SessionError::ProtocolViolation {
				cause: Some(RejectReason::MissingCounterparty),
				..
			}
		));
	}

	#[tokio::test]
	async fn test_sending_twice_is_out_of_turn() {
		let (buyer_end, _seller_end) = ChannelTransport::pair();
		let mut buyer = NegotiationSession::buyer(buyer_end, Address::ZERO);
		buyer.send_text("one").await.unwrap();
		assert!(matches!(
			buyer.send_text("two").await,
			Err(SessionError::OutOfTurn)
		));
	}

	#[tokio::test]
	async fn test_peer_hangup_is_reported_as_closed() {
		let (buyer_end, mut seller_end) = ChannelTransport::pair();
		let mut buyer = NegotiationSession::buyer(buyer_end, Address::ZERO);
		buyer.send_text("hello").await.unwrap();
		seller_end.close().await;
		assert!(matches!(buyer.receive().await, Err(SessionError::Closed)));
	}

	#[tokio::test]
	async fn test_unusable_proposal_closes_channel() {
		let (buyer_end, _peer) = ChannelTransport::pair();
		let mut buyer = NegotiationSession::buyer(buyer_end, Address::repeat_byte(0x05));

		let mut message =
			NegotiationMessage::plain("offer", current_timestamp_millis(), INITIAL_TRAIL);
		message.kind = gigacrew_types::MessageType::Proposal;
		let err = buyer
			.accept(ValidatedMessage {
				message,
				trail: calc_trail(&NegotiationMessage::plain("x", 0, INITIAL_TRAIL)),
			})
			.await
			.unwrap_err();

		assert!(matches!(err, SessionError::ProtocolViolation { cause: None, .. }));
		assert!(buyer.is_closed());
	}
}
