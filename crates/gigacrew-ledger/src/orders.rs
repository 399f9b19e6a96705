//! Escrow order ledger.

use gigacrew_storage::StorageService;
use gigacrew_types::{current_timestamp, Order};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::LedgerError;

const NAMESPACE: &str = "orders";

/// Order rows keyed by ledger-assigned order id.
///
/// Read-modify-write sequences are serialized by a local lock; the backend
/// itself only offers single-key operations.
pub struct OrderLedger {
	storage: Arc<StorageService>,
	write_lock: Mutex<()>,
}

impl OrderLedger {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			write_lock: Mutex::new(()),
		}
	}

	pub async fn get(&self, order_id: &str) -> Result<Option<Order>, LedgerError> {
		Ok(self.storage.retrieve_optional(NAMESPACE, order_id).await?)
	}

	/// Inserts `order` unless a row with the same id exists.
	///
	/// Returns whether a row was written. A conflict is not an error.
	pub async fn insert(&self, order: &Order) -> Result<bool, LedgerError> {
		let _guard = self.write_lock.lock().await;
		if self.storage.contains(NAMESPACE, &order.order_id).await? {
			debug!(order_id = %order.order_id, "Order already recorded");
			return Ok(false);
		}
		self.storage.store(NAMESPACE, &order.order_id, order).await?;
		Ok(true)
	}

	/// Removes every inactive order. Returns how many were removed.
	pub async fn purge_inactive(&self) -> Result<usize, LedgerError> {
		self.purge_inactive_at(current_timestamp()).await
	}

	pub async fn purge_inactive_at(&self, now: u64) -> Result<usize, LedgerError> {
		let _guard = self.write_lock.lock().await;
		let mut purged = 0;
		for order in self.all().await? {
			if order.is_inactive(now) {
				self.storage.remove(NAMESPACE, &order.order_id).await?;
				purged += 1;
			}
		}
		Ok(purged)
	}

	/// Orders still owed work, soonest deadline first.
	pub async fn list_active(&self) -> Result<Vec<Order>, LedgerError> {
		self.list_active_at(current_timestamp()).await
	}

	pub async fn list_active_at(&self, now: u64) -> Result<Vec<Order>, LedgerError> {
		let mut orders: Vec<Order> = self
			.all()
			.await?
			.into_iter()
			.filter(|order| order.is_active(now))
			.collect();
		orders.sort_by(|a, b| {
			a.deadline
				.cmp(&b.deadline)
				.then_with(|| a.order_id.cmp(&b.order_id))
		});
		Ok(orders)
	}

	/// Records the lock period. Only the first value for an order sticks.
	pub async fn set_lock_period(&self, order_id: &str, lock_period: u64) -> Result<bool, LedgerError> {
		self.update(order_id, |order| {
			if order.lock_period.is_some() {
				return false;
			}
			order.lock_period = Some(lock_period);
			true
		})
		.await
	}

	/// Records the resolution period. Only the first value for an order sticks.
	pub async fn set_resolution_period(
		&self,
		order_id: &str,
		resolution_period: u64,
	) -> Result<bool, LedgerError> {
		self.update(order_id, |order| {
			if order.resolution_period.is_some() {
				return false;
			}
			order.resolution_period = Some(resolution_period);
			true
		})
		.await
	}

	/// Deletes the given orders. Returns how many existed.
	pub async fn delete_by_ids(&self, order_ids: &[String]) -> Result<usize, LedgerError> {
		let _guard = self.write_lock.lock().await;
		let mut deleted = 0;
		for order_id in order_ids {
			if self.storage.contains(NAMESPACE, order_id).await? {
				self.storage.remove(NAMESPACE, order_id).await?;
				deleted += 1;
			}
		}
		Ok(deleted)
	}

	/// Orders whose funds can be claimed now.
	pub async fn list_withdrawable(&self) -> Result<Vec<Order>, LedgerError> {
		self.list_withdrawable_at(current_timestamp()).await
	}

	pub async fn list_withdrawable_at(&self, now: u64) -> Result<Vec<Order>, LedgerError> {
		Ok(self
			.all()
			.await?
			.into_iter()
			.filter(|order| order.is_withdrawable(now))
			.collect())
	}

	async fn all(&self) -> Result<Vec<Order>, LedgerError> {
		Ok(self.storage.retrieve_all(NAMESPACE).await?)
	}

	async fn update<F>(&self, order_id: &str, apply: F) -> Result<bool, LedgerError>
	where
		F: FnOnce(&mut Order) -> bool,
	{
		let _guard = self.write_lock.lock().await;
		let Some(mut order) = self
			.storage
			.retrieve_optional::<Order>(NAMESPACE, order_id)
			.await?
		else {
			debug!(order_id, "Update for unknown order ignored");
			return Ok(false);
		};
		if !apply(&mut order) {
			return Ok(false);
		}
		self.storage.store(NAMESPACE, order_id, &order).await?;
		Ok(true)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use gigacrew_storage::FileStorage;
	use gigacrew_types::OrderStatus;

	const NOW: u64 = 1_000;

	fn order(id: &str, deadline: u64) -> Order {
		Order {
			order_id: id.to_string(),
			service_id: "1".to_string(),
			buyer_address: "0xbuyer".to_string(),
			seller_address: "0xseller".to_string(),
			status: OrderStatus::Open,
			context: format!("task {}", id),
			deadline,
			lock_period: None,
			resolution_period: None,
		}
	}

	fn ledger() -> OrderLedger {
		OrderLedger::new(Arc::new(StorageService::in_memory()))
	}

	#[tokio::test]
	async fn test_insert_ignores_conflicts() {
		let ledger = ledger();
		assert!(ledger.insert(&order("1", 2_000)).await.unwrap());

		let mut changed = order("1", 5_000);
		changed.context = "other".to_string();
		assert!(!ledger.insert(&changed).await.unwrap());
		assert_eq!(ledger.get("1").await.unwrap().unwrap().deadline, 2_000);

		ledger.delete_by_ids(&["1".to_string()]).await.unwrap();
		assert!(ledger.insert(&changed).await.unwrap());
	}

	#[tokio::test]
	async fn test_active_orders_come_soonest_deadline_first() {
		let ledger = ledger();
		ledger.insert(&order("a", 3_000)).await.unwrap();
		ledger.insert(&order("b", 1_500)).await.unwrap();
		ledger.insert(&order("c", 2_000)).await.unwrap();
		ledger.insert(&order("expired", 500)).await.unwrap();
		ledger.insert(&order("locked", 1_200)).await.unwrap();
		ledger.set_lock_period("locked", 5_000).await.unwrap();

		let ids: Vec<_> = ledger
			.list_active_at(NOW)
			.await
			.unwrap()
			.into_iter()
			.map(|o| o.order_id)
			.collect();
		assert_eq!(ids, vec!["b", "c", "a"]);
	}

	#[tokio::test]
	async fn test_periods_are_set_once() {
		let ledger = ledger();
		ledger.insert(&order("1", 2_000)).await.unwrap();

		assert!(ledger.set_lock_period("1", 1_100).await.unwrap());
		assert!(!ledger.set_lock_period("1", 9_999).await.unwrap());
		assert!(ledger.set_resolution_period("1", 1_300).await.unwrap());
		assert!(!ledger.set_resolution_period("1", 9_999).await.unwrap());
		assert!(!ledger.set_lock_period("missing", 1).await.unwrap());

		let stored = ledger.get("1").await.unwrap().unwrap();
		assert_eq!(stored.lock_period, Some(1_100));
		assert_eq!(stored.resolution_period, Some(1_300));
	}

	#[tokio::test]
	async fn test_purge_removes_only_inactive_orders() {
		let ledger = ledger();
		ledger.insert(&order("expired", 500)).await.unwrap();
		ledger.insert(&order("pending", 1_500)).await.unwrap();
		ledger.insert(&order("committed", 500)).await.unwrap();
		ledger.set_lock_period("committed", 800).await.unwrap();
		ledger.insert(&order("disputed", 500)).await.unwrap();
		ledger.set_resolution_period("disputed", 2_000).await.unwrap();
		let mut closed = order("closed", 500);
		closed.status = OrderStatus::Completed;
		ledger.insert(&closed).await.unwrap();

		assert_eq!(ledger.purge_inactive_at(NOW).await.unwrap(), 1);
		assert!(ledger.get("expired").await.unwrap().is_none());
		for id in ["pending", "committed", "disputed", "closed"] {
			assert!(ledger.get(id).await.unwrap().is_some(), "{} was purged", id);
		}
	}

	#[tokio::test]
	async fn test_withdrawable_orders() {
		let ledger = ledger();
		ledger.insert(&order("lock-elapsed", 500)).await.unwrap();
		ledger.set_lock_period("lock-elapsed", 900).await.unwrap();
		ledger.insert(&order("lock-running", 500)).await.unwrap();
		ledger.set_lock_period("lock-running", 1_100).await.unwrap();
		ledger.insert(&order("resolution-elapsed", 500)).await.unwrap();
		ledger.set_lock_period("resolution-elapsed", 5_000).await.unwrap();
		ledger
			.set_resolution_period("resolution-elapsed", 999)
			.await
			.unwrap();
		ledger.insert(&order("uncommitted", 500)).await.unwrap();

		let mut ids: Vec<_> = ledger
			.list_withdrawable_at(NOW)
			.await
			.unwrap()
			.into_iter()
			.map(|o| o.order_id)
			.collect();
		ids.sort();
		assert_eq!(ids, vec!["lock-elapsed", "resolution-elapsed"]);
	}

	#[tokio::test]
	async fn test_ledger_survives_reopen_on_disk() {
		let dir = tempfile::tempdir().unwrap();
		let open = || {
			OrderLedger::new(Arc::new(StorageService::new(Box::new(FileStorage::new(
				dir.path().to_path_buf(),
			)))))
		};

		open().insert(&order("7", 2_000)).await.unwrap();
		let reopened = open();
		assert!(!reopened.insert(&order("7", 2_000)).await.unwrap());
		assert_eq!(reopened.delete_by_ids(&["7".to_string(), "8".to_string()]).await.unwrap(), 1);
	}
}
