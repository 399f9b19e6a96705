//! Inbound message validation.
//!
//! Checks run in a fixed order and the first failure rejects the message:
//! schema, freshness, continuity, then (for proposals) the signature. Once a
//! message got past the continuity check its successor trail is reported
//! even on rejection, so the caller's trail pointer always stays in step
//! with what the peer sent.

use alloy::primitives::{Address, U256};
use gigacrew_types::{current_timestamp_millis, NegotiationMessage};
use thiserror::Error;
use tracing::warn;

use crate::proposal::{proposal_digest, recover_signer, trail_bytes};
use crate::trail::calc_trail;

/// Messages older than this, relative to the local clock, are replays.
pub const STALENESS_WINDOW_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
	#[error("Malformed message: {0}")]
	Malformed(String),
	#[error("Stale message: sent at {timestamp}, now {now}")]
	Stale { timestamp: u64, now: u64 },
	#[error("Trail mismatch: expected {expected}, got {actual}")]
	TrailMismatch { expected: String, actual: String },
	#[error("Proposal received without a designated counterparty")]
	MissingCounterparty,
	#[error("Proposal is missing {0}")]
	IncompleteProposal(&'static str),
	#[error("Invalid proposal signature: {0}")]
	BadSignature(String),
	#[error("Proposal signed by {recovered}, expected {expected}")]
	WrongSigner {
		expected: Address,
		recovered: Address,
	},
}

impl RejectReason {
	/// Name of the validation step that failed, for logs.
	pub fn step(&self) -> &'static str {
		match self {
			Self::Malformed(_) => "parse",
			Self::Stale { .. } => "freshness",
			Self::TrailMismatch { .. } => "continuity",
			_ => "signature",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct Rejection {
	pub reason: RejectReason,
	/// Successor trail, known once continuity was established.
	pub trail: Option<String>,
}

impl Rejection {
	fn early(reason: RejectReason) -> Self {
		Self {
			reason,
			trail: None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedMessage {
	pub message: NegotiationMessage,
	/// Trail to expect on the next message.
	pub trail: String,
}

/// Validates `raw` against the local clock.
pub fn validate_message(
	raw: &str,
	expected_trail: &str,
	expected_signer: Option<Address>,
) -> Result<ValidatedMessage, Rejection> {
	validate_message_at(
		raw,
		expected_trail,
		expected_signer,
		current_timestamp_millis(),
	)
}

/// Validates `raw` as if the local clock read `now_ms`.
pub fn validate_message_at(
	raw: &str,
	expected_trail: &str,
	expected_signer: Option<Address>,
	now_ms: u64,
) -> Result<ValidatedMessage, Rejection> {
	let result = run_checks(raw, expected_trail, expected_signer, now_ms);
	if let Err(rejection) = &result {
		warn!(
			step = rejection.reason.step(),
			reason = %rejection.reason,
			"Rejected negotiation message"
		);
	}
	result
}

fn run_checks(
	raw: &str,
	expected_trail: &str,
	expected_signer: Option<Address>,
	now_ms: u64,
) -> Result<ValidatedMessage, Rejection> {
	let message = parse(raw).map_err(Rejection::early)?;

	if message.timestamp < now_ms.saturating_sub(STALENESS_WINDOW_MS) {
		return Err(Rejection::early(RejectReason::Stale {
			timestamp: message.timestamp,
			now: now_ms,
		}));
	}

	if message.trail != expected_trail {
		return Err(Rejection::early(RejectReason::TrailMismatch {
			expected: expected_trail.to_string(),
			actual: message.trail.clone(),
		}));
	}

	let trail = calc_trail(&message);

	if message.is_proposal() {
		if let Err(reason) = verify_proposal(&message, &trail, expected_signer) {
			return Err(Rejection {
				reason,
				trail: Some(trail),
			});
		}
	}

	Ok(ValidatedMessage { message, trail })
}

fn parse(raw: &str) -> Result<NegotiationMessage, RejectReason> {
	let value: serde_json::Value =
		serde_json::from_str(raw).map_err(|e| RejectReason::Malformed(e.to_string()))?;
	let object = value
		.as_object()
		.ok_or_else(|| RejectReason::Malformed("expected a JSON object".to_string()))?;
	if let Some((key, _)) = object.iter().find(|(_, v)| v.is_null()) {
		return Err(RejectReason::Malformed(format!("{} is null", key)));
	}

	let message: NegotiationMessage =
		serde_json::from_value(value).map_err(|e| RejectReason::Malformed(e.to_string()))?;

	if let Some(price) = &message.price {
		if price.is_empty() || !price.bytes().all(|b| b.is_ascii_digit()) {
			return Err(RejectReason::Malformed(format!(
				"price is not a decimal integer: {}",
				price
			)));
		}
	}
	Ok(message)
}

fn verify_proposal(
	message: &NegotiationMessage,
	trail: &str,
	expected_signer: Option<Address>,
) -> Result<(), RejectReason> {
	let expected = expected_signer.ok_or(RejectReason::MissingCounterparty)?;

	let expiry = message
		.proposal_expiry
		.ok_or(RejectReason::IncompleteProposal("proposalExpiry"))?;
	let price = message
		.price
		.as_deref()
		.ok_or(RejectReason::IncompleteProposal("price"))?;
	let deadline = message
		.deadline
		.ok_or(RejectReason::IncompleteProposal("deadline"))?;
	let signature = message
		.proposal_signature
		.as_deref()
		.ok_or(RejectReason::IncompleteProposal("proposalSignature"))?;

	let price =
		U256::from_str_radix(price, 10).map_err(|e| RejectReason::Malformed(e.to_string()))?;
	let trail = trail_bytes(trail).map_err(|e| RejectReason::Malformed(e.to_string()))?;
	let digest = proposal_digest(trail, expiry, price, deadline.saturating_mul(60));

	let recovered =
		recover_signer(digest, signature).map_err(|e| RejectReason::BadSignature(e.to_string()))?;
	if recovered != expected {
		return Err(RejectReason::WrongSigner {
			expected,
			recovered,
		});
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::proposal::{build_proposal, ProposalDraft};
	use alloy::signers::local::PrivateKeySigner;
	use gigacrew_types::INITIAL_TRAIL;

	const NOW: u64 = 1_750_000_000_000;

	fn draft() -> ProposalDraft {
		ProposalDraft {
			content: "offer".to_string(),
			terms: "deliver a report".to_string(),
			price: U256::from(250u64),
			deadline_minutes: 15,
			expiry: 1_900_000_000,
		}
	}

	#[test]
	fn test_revalidating_a_sequence_always_succeeds() {
		let mut sender_trail = INITIAL_TRAIL.to_string();
		let mut receiver_trail = INITIAL_TRAIL.to_string();

		for (i, text) in ["hello", "I need an audit", "sure", "thanks"].iter().enumerate() {
			let message = NegotiationMessage::plain(*text, NOW + i as u64, sender_trail.clone());
			sender_trail = calc_trail(&message);
			let raw = serde_json::to_string(&message).unwrap();

			let validated = validate_message_at(&raw, &receiver_trail, None, NOW).unwrap();
			receiver_trail = validated.trail;
			assert_eq!(receiver_trail, sender_trail);
		}
	}

	#[test]
	fn test_stale_message_is_rejected_regardless_of_trail() {
		let message = NegotiationMessage::plain("hi", NOW - STALENESS_WINDOW_MS - 1, INITIAL_TRAIL);
		let raw = serde_json::to_string(&message).unwrap();
		let rejection = validate_message_at(&raw, INITIAL_TRAIL, None, NOW).unwrap_err();
		assert!(matches!(rejection.reason, RejectReason::Stale { .. }));
		assert!(rejection.trail.is_none());

		let edge = NegotiationMessage::plain("hi", NOW - STALENESS_WINDOW_MS, INITIAL_TRAIL);
		let raw = serde_json::to_string(&edge).unwrap();
		assert!(validate_message_at(&raw, INITIAL_TRAIL, None, NOW).is_ok());
	}

	#[test]
	fn test_trail_mismatch_is_rejected() {
		let message = NegotiationMessage::plain("hi", NOW, "0x1");
		let raw = serde_json::to_string(&message).unwrap();
		let rejection = validate_message_at(&raw, INITIAL_TRAIL, None, NOW).unwrap_err();
		assert!(matches!(rejection.reason, RejectReason::TrailMismatch { .. }));
	}

	#[test]
	fn test_malformed_payloads_are_rejected() {
		for raw in [
			"not json",
			"[]",
			r#"{"type":"msg","content":"x","timestamp":1}"#,
			r#"{"type":"shout","content":"x","timestamp":1,"trail":"0x0"}"#,
			r#"{"type":"msg","content":"x","timestamp":1,"trail":"0x0","price":null}"#,
			r#"{"type":"msg","content":"x","timestamp":1,"trail":"0x0","price":"1.5"}"#,
		] {
			let rejection = validate_message_at(raw, INITIAL_TRAIL, None, 1).unwrap_err();
			assert!(
				matches!(rejection.reason, RejectReason::Malformed(_)),
				"{} was not rejected as malformed",
				raw
			);
		}
	}

	#[test]
	fn test_proposal_from_expected_signer_is_accepted() {
		let seller = PrivateKeySigner::random();
		let (message, next_trail) = build_proposal(&seller, &draft(), INITIAL_TRAIL, NOW).unwrap();
		let raw = serde_json::to_string(&message).unwrap();

		let validated =
			validate_message_at(&raw, INITIAL_TRAIL, Some(seller.address()), NOW).unwrap();
		assert_eq!(validated.trail, next_trail);
		assert!(validated.message.is_proposal());
	}

	#[test]
	fn test_proposal_without_counterparty_is_rejected_with_trail() {
		let seller = PrivateKeySigner::random();
		let (message, next_trail) = build_proposal(&seller, &draft(), INITIAL_TRAIL, NOW).unwrap();
		let raw = serde_json::to_string(&message).unwrap();

		let rejection = validate_message_at(&raw, INITIAL_TRAIL, None, NOW).unwrap_err();
		assert_eq!(rejection.reason, RejectReason::MissingCounterparty);
		assert_eq!(rejection.trail, Some(next_trail));
	}

	#[test]
	fn test_proposal_from_someone_else_is_rejected() {
		let seller = PrivateKeySigner::random();
		let impostor = PrivateKeySigner::random();
		let (message, _) = build_proposal(&impostor, &draft(), INITIAL_TRAIL, NOW).unwrap();
		let raw = serde_json::to_string(&message).unwrap();

		let rejection =
			validate_message_at(&raw, INITIAL_TRAIL, Some(seller.address()), NOW).unwrap_err();
		assert!(matches!(rejection.reason, RejectReason::WrongSigner { .. }));
	}

	#[test]
	fn test_mutations_after_signing_break_the_proposal() {
		let seller = PrivateKeySigner::random();
		let (message, _) = build_proposal(&seller, &draft(), INITIAL_TRAIL, NOW).unwrap();

		let mut price = message.clone();
		price.price = Some("251".to_string());
		let mut content = message.clone();
		content.content = "offes".to_string();
		let mut timestamp = message.clone();
		timestamp.timestamp ^= 1;

		for tampered in [price, content, timestamp] {
			let raw = serde_json::to_string(&tampered).unwrap();
			let rejection =
				validate_message_at(&raw, INITIAL_TRAIL, Some(seller.address()), NOW).unwrap_err();
			assert!(matches!(
				rejection.reason,
				RejectReason::WrongSigner { .. } | RejectReason::BadSignature(_)
			));
		}
	}

	#[test]
	fn test_proposal_missing_signature_is_rejected() {
		let seller = PrivateKeySigner::random();
		let (mut message, _) = build_proposal(&seller, &draft(), INITIAL_TRAIL, NOW).unwrap();
		message.proposal_signature = None;
		let raw = serde_json::to_string(&message).unwrap();

		let rejection =
			validate_message_at(&raw, INITIAL_TRAIL, Some(seller.address()), NOW).unwrap_err();
		assert_eq!(
			rejection.reason,
			RejectReason::IncompleteProposal("proposalSignature")
		);
	}
}
