//! Configuration types for a GigaCrew agent.

use gigacrew_storage::StorageBackend;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete agent configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Agent identity and logging
	pub gigacrew: AgentSettings,
	/// Ledger contract access
	pub chain: ChainConfig,
	#[serde(default)]
	pub sync: SyncSettings,
	#[serde(default)]
	pub storage: StorageConfig,
	/// Buyer role, disabled when absent
	pub buyer: Option<BuyerConfig>,
	/// Seller role, disabled when absent
	pub seller: Option<SellerConfig>,
	/// Service catalog indexer, disabled when absent
	pub catalog: Option<CatalogConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentSettings {
	pub name: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
	/// http(s) or ws(s) endpoint
	pub rpc_url: String,
	/// GigaCrew contract address, 0x-prefixed
	pub contract_address: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncSettings {
	#[serde(default)]
	pub start_block: u64,
	/// Ignore stored checkpoints and start from `start_block`
	#[serde(default)]
	pub force_start_block: bool,
	/// Largest block range requested from the node at once
	#[serde(default = "default_max_block_range")]
	pub max_block_range: u64,
	/// Handlers run concurrently per batch
	#[serde(default = "default_batch_size")]
	pub batch_size: usize,
	#[serde(default = "default_poll_interval_secs")]
	pub poll_interval_secs: u64,
}

impl Default for SyncSettings {
	fn default() -> Self {
		Self {
			start_block: 0,
			force_start_block: false,
			max_block_range: default_max_block_range(),
			batch_size: default_batch_size(),
			poll_interval_secs: default_poll_interval_secs(),
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	#[serde(default)]
	pub backend: StorageBackend,
	#[serde(default = "default_storage_path")]
	pub path: PathBuf,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			backend: StorageBackend::default(),
			path: default_storage_path(),
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuyerConfig {
	/// Hex-encoded secp256k1 key
	pub private_key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SellerConfig {
	pub private_key: String,
	/// Service this agent sells
	pub service_id: Option<u64>,
	/// Seconds between reconciliation rounds
	#[serde(default = "default_work_interval_secs")]
	pub work_interval_secs: u64,
	pub worker: Option<WorkerConfig>,
}

/// HTTP work generator
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
	pub endpoint: String,
	pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
	#[serde(default = "default_true")]
	pub enabled: bool,
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_max_block_range() -> u64 {
	50
}

fn default_batch_size() -> usize {
	10
}

fn default_poll_interval_secs() -> u64 {
	5
}

fn default_storage_path() -> PathBuf {
	PathBuf::from("./data")
}

fn default_work_interval_secs() -> u64 {
	10
}

fn default_true() -> bool {
	true
}
