//! Pending work waiters.
//!
//! Pairs a caller waiting for the work on an order with the event that
//! delivers it, whichever comes first. Work that arrives before anyone waits
//! is held as an orderless result until a waiter claims it.

use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use crate::CoordinatorError;

/// What a call to [`WorkWaiters::resolve`] did with the work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
	/// Handed to a waiting caller.
	Delivered,
	/// Nobody is waiting yet; kept for the next caller.
	Cached,
	/// The order was already resolved; ignored.
	Duplicate,
}

/// Number of delivered order ids remembered to reject replays.
pub const DEFAULT_DELIVERED_CAPACITY: usize = 4096;

/// Recently delivered order ids, oldest evicted first.
struct DeliveredIds {
	ids: HashSet<String>,
	order: VecDeque<String>,
	capacity: usize,
}

impl DeliveredIds {
	fn new(capacity: usize) -> Self {
		Self {
			ids: HashSet::new(),
			order: VecDeque::new(),
			capacity: capacity.max(1),
		}
	}

	fn contains(&self, order_id: &str) -> bool {
		self.ids.contains(order_id)
	}

	fn insert(&mut self, order_id: &str) {
		if !self.ids.insert(order_id.to_string()) {
			return;
		}
		self.order.push_back(order_id.to_string());
		while self.order.len() > self.capacity {
			if let Some(evicted) = self.order.pop_front() {
				self.ids.remove(&evicted);
			}
		}
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.ids.len()
	}
}

struct WaiterState {
	waiting: HashMap<String, oneshot::Sender<String>>,
	orderless: HashMap<String, String>,
	delivered: DeliveredIds,
}

/// Single-resolution, single-consumer slots keyed by order id.
pub struct WorkWaiters {
	state: Mutex<WaiterState>,
}

impl Default for WorkWaiters {
	fn default() -> Self {
		Self::with_delivered_capacity(DEFAULT_DELIVERED_CAPACITY)
	}
}

impl WorkWaiters {
	pub fn new() -> Self {
		Self::default()
	}

	/// Remembers at most `capacity` delivered orders.
	pub fn with_delivered_capacity(capacity: usize) -> Self {
		Self {
			state: Mutex::new(WaiterState {
				waiting: HashMap::new(),
				orderless: HashMap::new(),
				delivered: DeliveredIds::new(capacity),
			}),
		}
	}

	/// Registers interest in the work for `order_id`.
	///
	/// The receiver completes immediately when the work already arrived.
	/// Only one waiter may be outstanding per order. A waiter whose
	/// receiver was dropped, for example by a timed out wait, is replaced.
	pub async fn register(
		&self,
		order_id: &str,
	) -> Result<oneshot::Receiver<String>, CoordinatorError> {
		let mut state = self.state.lock().await;
		if let Some(tx) = state.waiting.get(order_id) {
			if !tx.is_closed() {
				return Err(CoordinatorError::AlreadyWaiting(order_id.to_string()));
			}
			debug!(order_id, "Replacing abandoned waiter");
			state.waiting.remove(order_id);
		}
		if state.delivered.contains(order_id) {
			return Err(CoordinatorError::AlreadyDelivered(order_id.to_string()));
		}

		let (tx, rx) = oneshot::channel();
		match state.orderless.remove(order_id) {
			Some(work) => {
				// Receiver is alive, send cannot fail
				let _ = tx.send(work);
				state.delivered.insert(order_id);
			}
			None => {
				state.waiting.insert(order_id.to_string(), tx);
			}
		}
		Ok(rx)
	}

	/// Registers and waits until the work for `order_id` is delivered.
	///
	/// There is no timeout; wrap the call to bound it.
	pub async fn wait(&self, order_id: &str) -> Result<String, CoordinatorError> {
		let rx = self.register(order_id).await?;
		rx.await
			.map_err(|_| CoordinatorError::WaiterDropped(order_id.to_string()))
	}

	/// Delivers `work` for `order_id` to its waiter, or caches it.
	pub async fn resolve(&self, order_id: &str, work: String) -> Resolution {
		let mut state = self.state.lock().await;
		if state.delivered.contains(order_id) || state.orderless.contains_key(order_id) {
			debug!(order_id, "Work already resolved");
			return Resolution::Duplicate;
		}

		if let Some(tx) = state.waiting.remove(order_id) {
			match tx.send(work) {
				Ok(()) => {
					state.delivered.insert(order_id);
					return Resolution::Delivered;
				}
				// Caller gave up; keep the work for a later waiter
				Err(work) => {
					state.orderless.insert(order_id.to_string(), work);
					return Resolution::Cached;
				}
			}
		}

		state.orderless.insert(order_id.to_string(), work);
		Resolution::Cached
	}

	pub async fn is_waiting(&self, order_id: &str) -> bool {
		self.state
			.lock()
			.await
			.waiting
			.get(order_id)
			.is_some_and(|tx| !tx.is_closed())
	}

	#[cfg(test)]
	async fn delivered_count(&self) -> usize {
		self.state.lock().await.delivered.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::time::Duration;

	#[tokio::test]
	async fn test_work_before_and_after_wait_yield_same_result() {
		let waiters = Arc::new(WorkWaiters::new());

		// event first, then wait
		assert_eq!(
			waiters.resolve("1", "report".to_string()).await,
			Resolution::Cached
		);
		assert_eq!(waiters.wait("1").await.unwrap(), "report");

		// wait first, then event
		let waiting = {
			let waiters = waiters.clone();
			tokio::spawn(async move { waiters.wait("2").await })
		};
		while !waiters.is_waiting("2").await {
			tokio::time::sleep(Duration::from_millis(1)).await;
		}
		assert_eq!(
			waiters.resolve("2", "report".to_string()).await,
			Resolution::Delivered
		);
		assert_eq!(waiting.await.unwrap().unwrap(), "report");
	}

	#[tokio::test]
	async fn test_second_resolution_is_ignored() {
		let waiters = WorkWaiters::new();
		let rx = waiters.register("7").await.unwrap();
		assert_eq!(
			waiters.resolve("7", "first".to_string()).await,
			Resolution::Delivered
		);
		assert_eq!(
			waiters.resolve("7", "second".to_string()).await,
			Resolution::Duplicate
		);
		assert_eq!(rx.await.unwrap(), "first");

		// replayed before anyone waits
		assert_eq!(
			waiters.resolve("8", "first".to_string()).await,
			Resolution::Cached
		);
		assert_eq!(
			waiters.resolve("8", "second".to_string()).await,
			Resolution::Duplicate
		);
		assert_eq!(waiters.wait("8").await.unwrap(), "first");
	}

	#[tokio::test]
	async fn test_one_waiter_per_order() {
		let waiters = WorkWaiters::new();
		let _rx = waiters.register("3").await.unwrap();
		assert!(matches!(
			waiters.register("3").await,
			Err(CoordinatorError::AlreadyWaiting(_))
		));

		waiters.resolve("3", "done".to_string()).await;
		assert!(matches!(
			waiters.register("3").await,
			Err(CoordinatorError::AlreadyDelivered(_))
		));
	}

	#[tokio::test]
	async fn test_dropped_waiter_keeps_work() {
		let waiters = WorkWaiters::new();
		drop(waiters.register("4").await.unwrap());
		assert_eq!(
			waiters.resolve("4", "late".to_string()).await,
			Resolution::Cached
		);
		assert_eq!(waiters.wait("4").await.unwrap(), "late");
	}

	#[tokio::test]
	async fn test_register_again_after_timed_out_wait() {
		let waiters = WorkWaiters::new();
		let timed_out =
			tokio::time::timeout(Duration::from_millis(20), waiters.wait("9")).await;
		assert!(timed_out.is_err());
		assert!(!waiters.is_waiting("9").await);

		let rx = waiters.register("9").await.unwrap();
		assert_eq!(
			waiters.resolve("9", "report".to_string()).await,
			Resolution::Delivered
		);
		assert_eq!(rx.await.unwrap(), "report");
	}

	#[tokio::test]
	async fn test_delivered_ids_are_bounded() {
		let waiters = WorkWaiters::with_delivered_capacity(2);
		for id in ["1", "2", "3"] {
			waiters.resolve(id, "work".to_string()).await;
			waiters.wait(id).await.unwrap();
		}
		assert_eq!(waiters.delivered_count().await, 2);

		// oldest id was evicted, newest still rejects replays
		assert!(matches!(
			waiters.register("3").await,
			Err(CoordinatorError::AlreadyDelivered(_))
		));
		assert_eq!(
			waiters.resolve("3", "again".to_string()).await,
			Resolution::Duplicate
		);
		assert!(waiters.register("1").await.is_ok());
	}
}
