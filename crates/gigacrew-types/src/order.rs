//! Escrow order types tracked by the per-agent order ledger.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Escrow status as reported by the ledger contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum OrderStatus {
	Open = 0,
	Disputed = 1,
	DisputeResolved = 2,
	Completed = 3,
}

#[derive(Debug, Error)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(pub u8);

impl From<OrderStatus> for u8 {
	fn from(status: OrderStatus) -> Self {
		status as u8
	}
}

impl TryFrom<u8> for OrderStatus {
	type Error = UnknownStatus;

	fn try_from(value: u8) -> Result<Self, Self::Error> {
		match value {
			0 => Ok(Self::Open),
			1 => Ok(Self::Disputed),
			2 => Ok(Self::DisputeResolved),
			3 => Ok(Self::Completed),
			other => Err(UnknownStatus(other)),
		}
	}
}

/// One escrow between a buyer and a seller.
///
/// Identifiers and addresses are kept in their canonical string forms
/// (decimal ids, checksummed addresses) so that stored rows do not depend on
/// chain client types. All times are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	pub order_id: String,
	pub service_id: String,
	pub buyer_address: String,
	pub seller_address: String,
	pub status: OrderStatus,
	/// Opaque task description supplied by the buyer.
	pub context: String,
	/// Time after which an order nobody committed to may be purged.
	pub deadline: u64,
	/// Set once the seller has submitted work.
	pub lock_period: Option<u64>,
	/// Set once a dispute window opened.
	pub resolution_period: Option<u64>,
}

impl Order {
	/// Open, uncommitted and past its deadline: the escrow never executed
	/// and the row can be dropped locally.
	pub fn is_inactive(&self, now: u64) -> bool {
		self.status == OrderStatus::Open
			&& self.lock_period.is_none()
			&& self.resolution_period.is_none()
			&& self.deadline < now
	}

	/// Open, uncommitted and still before its deadline: work is owed.
	pub fn is_active(&self, now: u64) -> bool {
		self.status == OrderStatus::Open
			&& self.lock_period.is_none()
			&& self.resolution_period.is_none()
			&& self.deadline > now
	}

	/// Funds are claimable once the lock or the resolution window elapsed.
	pub fn is_withdrawable(&self, now: u64) -> bool {
		self.status == OrderStatus::Open
			&& (self.lock_period.is_some_and(|t| t < now)
				|| self.resolution_period.is_some_and(|t| t < now))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn order(deadline: u64, lock: Option<u64>, resolution: Option<u64>) -> Order {
		Order {
			order_id: "1".to_string(),
			service_id: "7".to_string(),
			buyer_address: "0xb".to_string(),
			seller_address: "0x5".to_string(),
			status: OrderStatus::Open,
			context: "audit this".to_string(),
			deadline,
			lock_period: lock,
			resolution_period: resolution,
		}
	}

	#[test]
	fn test_withdrawable_requires_an_elapsed_window() {
		assert!(!order(50, None, None).is_withdrawable(100));
		assert!(order(50, Some(99), None).is_withdrawable(100));
		assert!(!order(50, Some(100), None).is_withdrawable(100));
		assert!(order(50, Some(500), Some(80)).is_withdrawable(100));

		let mut disputed = order(50, Some(10), None);
		disputed.status = OrderStatus::Disputed;
		assert!(!disputed.is_withdrawable(100));
	}

	#[test]
	fn test_inactive_and_active_are_disjoint() {
		let expired = order(50, None, None);
		assert!(expired.is_inactive(100));
		assert!(!expired.is_active(100));

		let pending = order(150, None, None);
		assert!(!pending.is_inactive(100));
		assert!(pending.is_active(100));

		let committed = order(50, Some(200), None);
		assert!(!committed.is_inactive(100));
		assert!(!committed.is_active(100));
	}

	#[test]
	fn test_status_serializes_as_ledger_code() {
		let json = serde_json::to_string(&OrderStatus::Disputed).unwrap();
		assert_eq!(json, "1");
		let parsed: OrderStatus = serde_json::from_str("0").unwrap();
		assert_eq!(parsed, OrderStatus::Open);
		assert!(serde_json::from_str::<OrderStatus>("9").is_err());
	}
}
