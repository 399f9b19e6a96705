//! # GigaCrew Negotiation
//!
//! Tamper-evident message protocol spoken between a buyer and a seller agent
//! before an escrow is created.
//!
//! ## Key Components
//!
//! - [`trail`] - hash chain binding the ordered message history
//! - [`validator`] - freshness, continuity and signature checks for inbound messages
//! - [`proposal`] - binding proposal payload, signing and signer recovery
//! - [`session`] - turn-taking negotiation driver over a [`transport::NegotiationTransport`]

pub mod proposal;
pub mod session;
pub mod trail;
pub mod transport;
pub mod validator;

pub use proposal::{build_proposal, ProposalDraft, ProposalError, SignedProposal};
pub use session::{Incoming, NegotiationSession, SessionError};
pub use trail::calc_trail;
pub use validator::{
	validate_message, validate_message_at, RejectReason, Rejection, ValidatedMessage,
	STALENESS_WINDOW_MS,
};
