//! Tenant handle
//!
//! Everything an engine operation needs for one tenant: the document
//! store, its configuration and counters, and the collaborators the
//! engine consults. Resolving which tenant a request belongs to happens
//! before the engine is called.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::catalog::{FieldCatalog, StoreCatalog};
use crate::config::EngineConfig;
use crate::directory::{
    EnumerationDirectory, IdentityDirectory, StoreDirectory, TenantConfigSource,
};
use crate::index::IndexManager;
use crate::observability::MetricsRegistry;
use crate::pipeline::PipelineContext;
use crate::report::{ReportRepository, StoreReportRepository};
use crate::store::DocumentStore;

/// Instant that `now` date sentinels resolve against
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Store, configuration and collaborators of one tenant
#[derive(Clone)]
pub struct Tenant {
    pub name: String,
    pub store: Arc<dyn DocumentStore>,
    pub config: EngineConfig,
    pub metrics: Arc<MetricsRegistry>,
    pub reports: Arc<dyn ReportRepository>,
    pub catalog: Arc<dyn FieldCatalog>,
    pub enumerations: Arc<dyn EnumerationDirectory>,
    pub identities: Arc<dyn IdentityDirectory>,
    pub settings: Arc<dyn TenantConfigSource>,
    pub clock: Clock,
}

impl Tenant {
    /// Tenant whose metadata and directories all live in `store`.
    pub fn in_store(name: impl Into<String>, store: Arc<dyn DocumentStore>, config: EngineConfig) -> Self {
        let directory = Arc::new(StoreDirectory::new(store.clone()));
        Self {
            name: name.into(),
            reports: Arc::new(StoreReportRepository::new(store.clone())),
            catalog: Arc::new(StoreCatalog::new(store.clone())),
            enumerations: directory.clone(),
            identities: directory.clone(),
            settings: directory,
            clock: Arc::new(Utc::now),
            metrics: Arc::new(MetricsRegistry::new()),
            store,
            config,
        }
    }

    pub fn with_reports(mut self, reports: Arc<dyn ReportRepository>) -> Self {
        self.reports = reports;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn FieldCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_settings(mut self, settings: Arc<dyn TenantConfigSource>) -> Self {
        self.settings = settings;
        self
    }

    /// Pins the instant used for date sentinels.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn pipeline_context(&self) -> PipelineContext {
        PipelineContext {
            store: self.store.clone(),
            enumerations: self.enumerations.clone(),
            identities: self.identities.clone(),
        }
    }

    pub fn index_manager(&self) -> IndexManager {
        IndexManager::new(self.store.clone(), self.metrics.clone(), &self.config)
    }
}
