//! Wiring facade
//!
//! Builds the engine, wheel, lock services, and transaction manager
//! over one store with one configuration, with an explicit start/stop
//! lifecycle. Nothing here is global state; pass the coordinator (or
//! the individual services) by reference to whatever needs them.

use std::sync::Arc;

use cassava_common::error::CassavaError;
use cassava_store::StoreOps;

use crate::cas::ScriptEngine;
use crate::config::RenewalConfig;
use crate::lock::{LockEventRegistry, MultiLockService, ValueLockService};
use crate::renewal::RenewalScheduler;
use crate::txn::{CommitOutcomeResolver, TransactionManager};

/// One store, one configuration, all coordination services
pub struct Coordinator {
    store: Arc<dyn StoreOps>,
    engine: Arc<ScriptEngine>,
    scheduler: Arc<RenewalScheduler>,
    registry: Arc<LockEventRegistry>,
    value_locks: ValueLockService,
    multi_locks: MultiLockService,
    transactions: TransactionManager,
}

impl Coordinator {
    pub fn new(store: Arc<dyn StoreOps>, config: RenewalConfig) -> Result<Self, CassavaError> {
        config.validate()?;
        let engine = Arc::new(ScriptEngine::new(store.clone(), config.verbose_scripts));
        let scheduler = Arc::new(RenewalScheduler::new(config, engine.clone())?);
        let registry = Arc::new(LockEventRegistry::new());

        let value_locks = ValueLockService::new(
            store.clone(),
            engine.clone(),
            scheduler.clone(),
            registry.clone(),
        )?;
        let multi_locks = MultiLockService::new(
            store.clone(),
            engine.clone(),
            scheduler.clone(),
            registry.clone(),
        )?;
        let transactions = TransactionManager::new(store.clone(), engine.clone());

        Ok(Self {
            store,
            engine,
            scheduler,
            registry,
            value_locks,
            multi_locks,
            transactions,
        })
    }

    /// Replace the transaction timeout resolver
    pub fn set_commit_resolver(&mut self, resolver: Arc<dyn CommitOutcomeResolver>) {
        self.transactions =
            TransactionManager::with_resolver(self.store.clone(), self.engine.clone(), resolver);
    }

    /// Start the renewal wheel
    pub fn start(&self) {
        self.scheduler.start();
    }

    /// Stop the renewal wheel
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    pub fn scheduler(&self) -> &Arc<RenewalScheduler> {
        &self.scheduler
    }

    pub fn events(&self) -> &Arc<LockEventRegistry> {
        &self.registry
    }

    pub fn value_locks(&self) -> &ValueLockService {
        &self.value_locks
    }

    pub fn multi_locks(&self) -> &MultiLockService {
        &self.multi_locks
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }
}
