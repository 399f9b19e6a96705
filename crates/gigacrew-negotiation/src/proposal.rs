//! Binding proposal payload.
//!
//! A proposal commits the seller to a price and a delivery deadline for the
//! negotiation history summarised by its trail. The payload is
//! `abi.encode(bytes32 prefix, bytes32 trail, uint256 expiry, uint256 price,
//! uint256 deadlineSeconds)` and is signed as a raw keccak-256 digest.

use alloy::primitives::{keccak256, Address, Signature, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol_types::SolValue;
use gigacrew_types::{MessageType, NegotiationMessage};
use thiserror::Error;

use crate::trail::calc_trail;

/// Domain prefix, left-aligned and zero-padded into 32 bytes.
pub const PROPOSAL_PREFIX: &[u8] = b"GigaCrew Proposal: ";

#[derive(Debug, Error)]
pub enum ProposalError {
	#[error("Invalid trail: {0}")]
	InvalidTrail(String),
	#[error("Invalid price: {0}")]
	InvalidPrice(String),
	#[error("Invalid signature: {0}")]
	InvalidSignature(String),
	#[error("Signing failed: {0}")]
	SigningFailed(String),
}

pub fn proposal_prefix() -> B256 {
	let mut prefix = [0u8; 32];
	let len = PROPOSAL_PREFIX.len().min(32);
	prefix[..len].copy_from_slice(&PROPOSAL_PREFIX[..len]);
	B256::from(prefix)
}

/// Decodes a hex trail into the 32 bytes the payload commits to.
pub fn trail_bytes(trail: &str) -> Result<B256, ProposalError> {
	let raw = trail.strip_prefix("0x").unwrap_or(trail);
	let bytes = hex::decode(raw).map_err(|e| ProposalError::InvalidTrail(e.to_string()))?;
	if bytes.len() != 32 {
		return Err(ProposalError::InvalidTrail(format!(
			"expected 32 bytes, got {}",
			bytes.len()
		)));
	}
	Ok(B256::from_slice(&bytes))
}

/// Digest the seller signs and the buyer recovers the signer from.
pub fn proposal_digest(trail: B256, expiry: u64, price: U256, deadline_seconds: u64) -> B256 {
	let payload = (
		proposal_prefix(),
		trail,
		U256::from(expiry),
		price,
		U256::from(deadline_seconds),
	)
		.abi_encode();
	keccak256(payload)
}

pub fn parse_signature(signature: &str) -> Result<Signature, ProposalError> {
	signature
		.parse::<Signature>()
		.map_err(|e| ProposalError::InvalidSignature(e.to_string()))
}

pub fn encode_signature(signature: &Signature) -> String {
	format!("0x{}", hex::encode(signature.as_bytes()))
}

/// Recovers the address that signed `digest`.
pub fn recover_signer(digest: B256, signature: &str) -> Result<Address, ProposalError> {
	parse_signature(signature)?
		.recover_address_from_prehash(&digest)
		.map_err(|e| ProposalError::InvalidSignature(e.to_string()))
}

/// Offer a seller wants to put on the table.
#[derive(Debug, Clone)]
pub struct ProposalDraft {
	pub content: String,
	pub terms: String,
	pub price: U256,
	pub deadline_minutes: u64,
	/// Unix seconds.
	pub expiry: u64,
}

/// Builds and signs a proposal chained onto `trail`.
///
/// Returns the message to send together with the trail it commits to, which
/// becomes the sender's next trail.
pub fn build_proposal(
	signer: &PrivateKeySigner,
	draft: &ProposalDraft,
	trail: &str,
	timestamp: u64,
) -> Result<(NegotiationMessage, String), ProposalError> {
	let mut message = NegotiationMessage {
		kind: MessageType::Proposal,
		content: draft.content.clone(),
		timestamp,
		trail: trail.to_string(),
		price: Some(draft.price.to_string()),
		deadline: Some(draft.deadline_minutes),
		terms: Some(draft.terms.clone()),
		proposal_expiry: Some(draft.expiry),
		proposal_signature: None,
		key: None,
	};

	let next_trail = calc_trail(&message);
	let digest = proposal_digest(
		trail_bytes(&next_trail)?,
		draft.expiry,
		draft.price,
		draft.deadline_minutes.saturating_mul(60),
	);
	let signature = signer
		.sign_hash_sync(&digest)
		.map_err(|e| ProposalError::SigningFailed(e.to_string()))?;
	message.proposal_signature = Some(encode_signature(&signature));

	Ok((message, next_trail))
}

/// A validated proposal, carrying everything needed to open the escrow it
/// describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedProposal {
	pub provider: Address,
	pub trail: B256,
	pub price: U256,
	pub deadline_seconds: u64,
	pub expiry: u64,
	pub signature: String,
	pub terms: String,
}

impl SignedProposal {
	/// Extracts the escrow parameters from a proposal that already passed
	/// validation against `trail`.
	pub fn from_message(
		message: &NegotiationMessage,
		trail: &str,
		provider: Address,
	) -> Result<Self, ProposalError> {
		let price = message
			.price
			.as_deref()
			.ok_or_else(|| ProposalError::InvalidPrice("missing".to_string()))?;
		Ok(Self {
			provider,
			trail: trail_bytes(trail)?,
			price: U256::from_str_radix(price, 10)
				.map_err(|e| ProposalError::InvalidPrice(e.to_string()))?,
			deadline_seconds: message.deadline.unwrap_or(0).saturating_mul(60),
			expiry: message.proposal_expiry.unwrap_or(0),
			signature: message.proposal_signature.clone().unwrap_or_default(),
			terms: message.terms.clone().unwrap_or_default(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use gigacrew_types::INITIAL_TRAIL;

	fn draft() -> ProposalDraft {
		ProposalDraft {
			content: "I can audit this contract".to_string(),
			terms: "full report".to_string(),
			price: U256::from(1_000_000u64),
			deadline_minutes: 30,
			expiry: 1_900_000_000,
		}
	}

	#[test]
	fn test_prefix_layout() {
		let prefix = proposal_prefix();
		assert_eq!(&prefix[..19], PROPOSAL_PREFIX);
		assert!(prefix[19..].iter().all(|b| *b == 0));
	}

	#[test]
	fn test_signed_proposal_recovers_seller() {
		let signer = PrivateKeySigner::random();
		let (message, next_trail) =
			build_proposal(&signer, &draft(), INITIAL_TRAIL, 1_000).unwrap();

		assert_eq!(calc_trail(&message), next_trail);
		let digest = proposal_digest(
			trail_bytes(&next_trail).unwrap(),
			1_900_000_000,
			U256::from(1_000_000u64),
			30 * 60,
		);
		let recovered =
			recover_signer(digest, message.proposal_signature.as_deref().unwrap()).unwrap();
		assert_eq!(recovered, signer.address());
	}

	#[test]
	fn test_different_price_recovers_someone_else() {
		let signer = PrivateKeySigner::random();
		let (message, next_trail) =
			build_proposal(&signer, &draft(), INITIAL_TRAIL, 1_000).unwrap();

		let digest = proposal_digest(
			trail_bytes(&next_trail).unwrap(),
			1_900_000_000,
			U256::from(1_000_001u64),
			30 * 60,
		);
		let recovered =
			recover_signer(digest, message.proposal_signature.as_deref().unwrap()).unwrap();
		assert_ne!(recovered, signer.address());
	}

	#[test]
	fn test_signed_proposal_from_message() {
		let signer = PrivateKeySigner::random();
		let (message, next_trail) =
			build_proposal(&signer, &draft(), INITIAL_TRAIL, 1_000).unwrap();
		let proposal = SignedProposal::from_message(&message, &next_trail, signer.address())
			.unwrap();
		assert_eq!(proposal.deadline_seconds, 1_800);
		assert_eq!(proposal.price, U256::from(1_000_000u64));
		assert_eq!(proposal.trail, trail_bytes(&next_trail).unwrap());
	}

	#[test]
	fn test_trail_bytes_rejects_short_input() {
		assert!(trail_bytes(INITIAL_TRAIL).is_err());
		assert!(trail_bytes(&"ab".repeat(32)).is_ok());
	}
}
