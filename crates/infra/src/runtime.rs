//! Wiring for a running engine: observability, in-memory stores, the Stockit
//! transport chosen by config, and the background sync executor.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use goodstock_events::{EventEnvelope, InMemoryEventBus};
use goodstock_inventory::PackageEvent;

use crate::config::InventoryConfig;
use crate::directory::{InMemoryLocationDirectory, InMemoryOrderDirectory, SequentialInventoryNumbers};
use crate::engine::{Directories, EngineSettings, InventoryEngine};
use crate::jobs::{InMemoryJobStore, JobExecutorConfig, JobExecutorHandle, SyncJobStore};
use crate::store::InMemoryPackageStore;
use crate::sync::{ExternalInventory, InMemoryExternalInventory, StockitClient, StockitClientConfig, SyncAdapter};

pub type PackageBus = Arc<InMemoryEventBus<EventEnvelope<PackageEvent>>>;

pub type Engine = InventoryEngine<InMemoryPackageStore, PackageBus, Arc<dyn ExternalInventory>>;

pub struct Runtime {
    pub engine: Arc<Engine>,
    pub orders: Arc<InMemoryOrderDirectory>,
    pub locations: Arc<InMemoryLocationDirectory>,
    executor: Option<JobExecutorHandle>,
}

impl Runtime {
    /// Initialise logging, build the engine and start the sync executor thread.
    pub fn start(config: InventoryConfig) -> anyhow::Result<Self> {
        goodstock_observability::init();
        config.validate().context("invalid inventory config")?;

        let external: Arc<dyn ExternalInventory> = match (&config.stockit_enabled, &config.stockit_url) {
            (true, Some(url)) => {
                let mut client_config = StockitClientConfig::new(url.clone()).with_timeout(config.stockit_timeout());
                if let Some(key) = &config.stockit_api_key {
                    client_config = client_config.with_api_key(key.clone());
                }
                Arc::new(StockitClient::new(client_config).context("failed to build stockit client")?)
            }
            _ => Arc::new(InMemoryExternalInventory::new()),
        };

        let orders = Arc::new(InMemoryOrderDirectory::new());
        let locations = Arc::new(InMemoryLocationDirectory::new());
        let directories = Directories {
            orders: orders.clone(),
            locations: locations.clone(),
            numbers: Arc::new(SequentialInventoryNumbers::new()),
        };

        let sync = Arc::new(SyncAdapter::new(
            external,
            directories.locations.clone(),
            directories.orders.clone(),
            config.stockit_enabled,
        ));
        let jobs: Arc<dyn SyncJobStore> = InMemoryJobStore::arc();

        let engine = Arc::new(InventoryEngine::new(
            Arc::new(InMemoryPackageStore::new()),
            Arc::new(InMemoryEventBus::new()),
            sync,
            jobs,
            directories,
            EngineSettings::from(&config),
        ));

        let executor = engine
            .sync_executor()
            .spawn(JobExecutorConfig::default().with_poll_interval(config.poll_interval()))
            .context("failed to spawn sync executor")?;

        info!(stockit_enabled = config.stockit_enabled, "inventory runtime started");
        Ok(Self {
            engine,
            orders,
            locations,
            executor: Some(executor),
        })
    }

    /// Stop the sync executor and wait for it.
    pub fn shutdown(mut self) {
        if let Some(executor) = self.executor.take() {
            executor.shutdown();
        }
        info!("inventory runtime stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goodstock_core::{OperationContext, UserId};
    use goodstock_inventory::NewPackage;

    #[test]
    fn starts_with_sync_disabled_and_shuts_down() {
        let runtime = Runtime::start(InventoryConfig::default()).unwrap();
        let shelf = runtime.locations.create(Some(10));
        let package = runtime
            .engine
            .register(NewPackage::new("CHR", 2).build().unwrap())
            .unwrap();

        let ctx = OperationContext::stock_app(UserId::new());
        let outcome = runtime.engine.receive(&ctx, package.id, Some(shelf)).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.package.quantities.on_hand, 2);
        assert_eq!(outcome.package.inventory_number.as_deref(), Some("000001"));

        runtime.shutdown();
    }

    #[test]
    fn rejects_enabled_sync_without_url() {
        let config = InventoryConfig {
            stockit_enabled: true,
            ..InventoryConfig::default()
        };
        assert!(Runtime::start(config).is_err());
    }
}
