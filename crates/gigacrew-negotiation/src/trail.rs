//! Hash chain over negotiation messages.
//!
//! Canonical encoding: the keys present on the wire are folded in byte-wise
//! ascending order, skipping `trail`, `signature` and `proposalSignature`.
//! Absent optional fields are not folded at all. Strings are taken verbatim,
//! integers in base 10. Starting from the prior trail string, every field
//! updates the accumulator as `sha256_hex(acc ++ sha256_hex(value))`.
//! Peers must reproduce this bit for bit.

use gigacrew_types::{MessageType, NegotiationMessage};
use sha2::{Digest, Sha256};

fn sha256_hex(data: &str) -> String {
	hex::encode(Sha256::digest(data.as_bytes()))
}

/// Wire keys and stringified values of every field that takes part in the
/// trail, sorted by key.
pub fn canonical_fields(message: &NegotiationMessage) -> Vec<(&'static str, String)> {
	let kind = match message.kind {
		MessageType::Plain => "msg",
		MessageType::Proposal => "proposal",
	};

	let mut fields = vec![
		("type", kind.to_string()),
		("content", message.content.clone()),
		("timestamp", message.timestamp.to_string()),
	];
	if let Some(price) = &message.price {
		fields.push(("price", price.clone()));
	}
	if let Some(deadline) = message.deadline {
		fields.push(("deadline", deadline.to_string()));
	}
	if let Some(terms) = &message.terms {
		fields.push(("terms", terms.clone()));
	}
	if let Some(expiry) = message.proposal_expiry {
		fields.push(("proposalExpiry", expiry.to_string()));
	}
	if let Some(key) = &message.key {
		fields.push(("key", key.clone()));
	}

	fields.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
	fields
}

/// Computes the trail that follows `message`, seeded with its own `trail`.
pub fn calc_trail(message: &NegotiationMessage) -> String {
	canonical_fields(message)
		.into_iter()
		.fold(message.trail.clone(), |acc, (_, value)| {
			sha256_hex(&format!("{}{}", acc, sha256_hex(&value)))
		})
}
