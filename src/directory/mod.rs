//! Tenant directories consulted by the engine
//!
//! - [`EnumerationDirectory`]: option value -> display label
//! - [`IdentityDirectory`]: user id -> display name
//! - [`TenantConfigSource`]: per-app processing period

mod store;

pub use store::StoreDirectory;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::ReportResult;

/// Labels of enumeration (options) values
#[async_trait]
pub trait EnumerationDirectory: Send + Sync {
    /// `option_value -> option_label` for one option set of an app.
    async fn labels(&self, app_id: &str, option_id: &str) -> ReportResult<HashMap<String, String>>;
}

/// Display names of users
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// `user_id -> display name`; unknown ids are absent.
    async fn display_names(&self, user_ids: &[String]) -> ReportResult<HashMap<String, String>>;
}

/// Per-app settings
#[async_trait]
pub trait TenantConfigSource: Send + Sync {
    /// Processing period of an app as `YYYY-MM`, if configured.
    async fn processing_period(&self, app_id: &str) -> ReportResult<Option<String>>;
}
