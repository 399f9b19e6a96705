//! Negotiation message types.
//!
//! Messages travel as UTF-8 JSON with camelCase keys. Optional fields are
//! omitted from the wire when absent, which matters for the trail digest:
//! only keys present on the wire are folded into it.

use serde::{Deserialize, Serialize};

/// Trail value a negotiation starts from before any message was exchanged.
pub const INITIAL_TRAIL: &str = "0x0";

/// Kind of a negotiation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
	/// Free-form chat turn.
	#[serde(rename = "msg")]
	Plain,
	/// Signed, binding offer from the seller.
	#[serde(rename = "proposal")]
	Proposal,
}

/// One turn in a negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationMessage {
	#[serde(rename = "type")]
	pub kind: MessageType,
	pub content: String,
	/// Sender clock, epoch milliseconds.
	pub timestamp: u64,
	/// Trail computed over every previous turn.
	pub trail: String,
	/// Price in the smallest currency unit, as a decimal string.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub price: Option<String>,
	/// Delivery deadline in minutes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deadline: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub terms: Option<String>,
	/// Epoch seconds after which the proposal can no longer be accepted.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub proposal_expiry: Option<u64>,
	/// 0x-prefixed 65-byte signature over the proposal payload.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub proposal_signature: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub key: Option<String>,
}

impl NegotiationMessage {
	/// Creates a plain chat message chained onto `trail`.
	pub fn plain(content: impl Into<String>, timestamp: u64, trail: impl Into<String>) -> Self {
		Self {
			kind: MessageType::Plain,
			content: content.into(),
			timestamp,
			trail: trail.into(),
			price: None,
			deadline: None,
			terms: None,
			proposal_expiry: None,
			proposal_signature: None,
			key: None,
		}
	}

	pub fn is_proposal(&self) -> bool {
		self.kind == MessageType::Proposal
	}
}
