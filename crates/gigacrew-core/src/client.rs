//! Agent wiring.
//!
//! Builds storage, ledger access and whichever roles are configured, then
//! runs one synchronizer per event consumer next to the seller loop.

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use futures::future::join_all;
use gigacrew_chain::{AlloyLedger, LedgerInterface};
use gigacrew_config::{Config, SyncSettings};
use gigacrew_ledger::{CheckpointStore, OrderLedger, ServiceCatalog};
use gigacrew_storage::{create_storage, StorageService};
use gigacrew_sync::{SyncConfig, Synchronizer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use crate::buyer::BuyerHandler;
use crate::catalog::CatalogIndexer;
use crate::seller::SellerHandler;
use crate::worker::{HttpWorkGenerator, WorkGenerator};
use crate::CoordinatorError;

/// Checkpoint key of the agent's own orders.
pub const ORDERS_CONSUMER: &str = "orders";
/// Checkpoint key of the service catalog.
pub const CATALOG_CONSUMER: &str = "catalog";

const WORKER_TIMEOUT: Duration = Duration::from_secs(300);

pub struct GigaCrewBuilder {
	config: Config,
	storage: Option<Arc<StorageService>>,
	reader: Option<Arc<dyn LedgerInterface>>,
	buyer_ledger: Option<Arc<dyn LedgerInterface>>,
	seller_ledger: Option<Arc<dyn LedgerInterface>>,
	work_generator: Option<Arc<dyn WorkGenerator>>,
}

impl GigaCrewBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			storage: None,
			reader: None,
			buyer_ledger: None,
			seller_ledger: None,
			work_generator: None,
		}
	}

	pub fn with_storage(mut self, storage: Arc<StorageService>) -> Self {
		self.storage = Some(storage);
		self
	}

	/// Read-only ledger used by the synchronizers and the catalog.
	pub fn with_reader(mut self, ledger: Arc<dyn LedgerInterface>) -> Self {
		self.reader = Some(ledger);
		self
	}

	pub fn with_buyer_ledger(mut self, ledger: Arc<dyn LedgerInterface>) -> Self {
		self.buyer_ledger = Some(ledger);
		self
	}

	pub fn with_seller_ledger(mut self, ledger: Arc<dyn LedgerInterface>) -> Self {
		self.seller_ledger = Some(ledger);
		self
	}

	pub fn with_work_generator(mut self, generator: Arc<dyn WorkGenerator>) -> Self {
		self.work_generator = Some(generator);
		self
	}

	/// Fills in everything not injected from the configuration.
	pub async fn build(self) -> Result<GigaCrewClient, CoordinatorError> {
		let config = self.config;
		let storage = self.storage.unwrap_or_else(|| {
			Arc::new(StorageService::new(create_storage(
				config.storage.backend,
				config.storage.path.clone(),
			)))
		});

		let reader = match self.reader {
			Some(reader) => reader,
			None => connect(&config, None).await?,
		};

		let buyer = match &config.buyer {
			Some(buyer_config) => {
				let ledger = match self.buyer_ledger {
					Some(ledger) => ledger,
					None => connect(&config, Some(&buyer_config.private_key)).await?,
				};
				Some(Arc::new(BuyerHandler::new(ledger)?))
			}
			None => None,
		};

		let orders = Arc::new(OrderLedger::new(storage.clone()));
		let seller = match &config.seller {
			Some(seller_config) => {
				let ledger = match self.seller_ledger {
					Some(ledger) => ledger,
					None => connect(&config, Some(&seller_config.private_key)).await?,
				};
				let worker: Arc<dyn WorkGenerator> = match (self.work_generator, &seller_config.worker)
				{
					(Some(generator), _) => generator,
					(None, Some(worker)) => Arc::new(HttpWorkGenerator::new(
						worker.endpoint.clone(),
						worker.api_key.clone(),
						WORKER_TIMEOUT,
					)?),
					(None, None) => {
						return Err(CoordinatorError::Config(
							"seller requires a work generator".to_string(),
						))
					}
				};
				let mut handler = SellerHandler::new(ledger, orders.clone(), worker)?;
				if let Some(service_id) = seller_config.service_id {
					handler = handler.with_service_id(U256::from(service_id));
				}
				Some(Arc::new(handler))
			}
			None => None,
		};

		let sync_config = sync_config(&config.sync);
		let mut subscriptions = Vec::new();
		if let Some(buyer) = &buyer {
			subscriptions.extend(buyer.subscriptions());
		}
		if let Some(seller) = &seller {
			subscriptions.extend(seller.subscriptions());
		}
		let orders_sync = (!subscriptions.is_empty()).then(|| {
			Synchronizer::new(
				reader.clone(),
				CheckpointStore::new(storage.clone(), ORDERS_CONSUMER),
				subscriptions,
				sync_config.clone(),
			)
		});

		let (catalog, catalog_sync) = match &config.catalog {
			Some(catalog_config) if catalog_config.enabled => {
				let catalog = Arc::new(ServiceCatalog::new(storage.clone()));
				let indexer = Arc::new(CatalogIndexer::new(reader.clone(), catalog.clone()));
				let sync = Synchronizer::new(
					reader.clone(),
					CheckpointStore::new(storage.clone(), CATALOG_CONSUMER),
					indexer.subscriptions(),
					sync_config,
				);
				(Some(catalog), Some(sync))
			}
			_ => (None, None),
		};

		Ok(GigaCrewClient {
			config,
			orders,
			buyer,
			seller,
			catalog,
			orders_sync,
			catalog_sync,
		})
	}
}

async fn connect(
	config: &Config,
	private_key: Option<&str>,
) -> Result<Arc<dyn LedgerInterface>, CoordinatorError> {
	let contract: Address = config
		.chain
		.contract_address
		.parse()
		.map_err(|e| CoordinatorError::Config(format!("Invalid contract address: {}", e)))?;
	let signer = private_key
		.map(|key| {
			key.parse::<PrivateKeySigner>()
				.map_err(|e| CoordinatorError::Config(format!("Invalid private key: {}", e)))
		})
		.transpose()?;
	let ledger = AlloyLedger::connect(&config.chain.rpc_url, contract, signer).await?;
	Ok(Arc::new(ledger))
}

pub fn sync_config(settings: &SyncSettings) -> SyncConfig {
	SyncConfig {
		start_block: settings.start_block,
		force_start_block: settings.force_start_block,
		max_block_range: settings.max_block_range,
		batch_size: settings.batch_size,
		poll_interval: Duration::from_secs(settings.poll_interval_secs),
	}
}

/// A configured agent, ready to run.
pub struct GigaCrewClient {
	config: Config,
	orders: Arc<OrderLedger>,
	buyer: Option<Arc<BuyerHandler>>,
	seller: Option<Arc<SellerHandler>>,
	catalog: Option<Arc<ServiceCatalog>>,
	orders_sync: Option<Synchronizer>,
	catalog_sync: Option<Synchronizer>,
}

impl GigaCrewClient {
	pub fn builder(config: Config) -> GigaCrewBuilder {
		GigaCrewBuilder::new(config)
	}

	pub fn buyer(&self) -> Option<Arc<BuyerHandler>> {
		self.buyer.clone()
	}

	pub fn seller(&self) -> Option<Arc<SellerHandler>> {
		self.seller.clone()
	}

	pub fn catalog(&self) -> Option<Arc<ServiceCatalog>> {
		self.catalog.clone()
	}

	pub fn orders(&self) -> Arc<OrderLedger> {
		self.orders.clone()
	}

	/// Runs every background task until `shutdown` flips to true.
	pub async fn run(self, shutdown: watch::Receiver<bool>) {
		info!(
			agent = %self.config.gigacrew.name,
			buyer = self.buyer.is_some(),
			seller = self.seller.is_some(),
			catalog = self.catalog.is_some(),
			"Starting GigaCrew agent"
		);

		let mut tasks = Vec::new();
		for sync in [self.orders_sync, self.catalog_sync].into_iter().flatten() {
			tasks.push(tokio::spawn(sync.run(shutdown.clone())));
		}
		if let (Some(seller), Some(seller_config)) = (self.seller, &self.config.seller) {
			let interval = Duration::from_secs(seller_config.work_interval_secs);
			tasks.push(tokio::spawn(seller.run(interval, shutdown.clone())));
		}

		for result in join_all(tasks).await {
			if let Err(e) = result {
				error!(error = %e, "Background task panicked");
			}
		}
		info!("GigaCrew agent stopped");
	}
}
