//! Store-backed directories
//!
//! Document shapes:
//! - `options`: `{app_id, option_id, option_value, option_label}`
//! - `users`: `{user_id, user_name}`
//! - `apps`: `{app_id, configs: {processing_period}}`

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{EnumerationDirectory, IdentityDirectory, TenantConfigSource};
use crate::condition::{Operand, Predicate};
use crate::document::Document;
use crate::error::{ReportError, ReportResult};
use crate::store::{DocumentStore, FindOptions, StoreError, APPS, OPTIONS, USERS};

#[derive(Debug, Deserialize)]
struct OptionEntry {
    option_value: String,
    #[serde(default)]
    option_label: String,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    user_id: String,
    #[serde(default)]
    user_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct AppConfigs {
    #[serde(default)]
    processing_period: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AppEntry {
    #[serde(default)]
    configs: AppConfigs,
}

/// All directories over one [`DocumentStore`]
#[derive(Clone)]
pub struct StoreDirectory {
    store: Arc<dyn DocumentStore>,
}

impl StoreDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn load<T: DeserializeOwned + Send>(
        &self,
        collection: &'static str,
        filter: &Predicate,
        operation: &'static str,
    ) -> ReportResult<Vec<T>> {
        let docs = self
            .store
            .find(collection, filter, &FindOptions::default())
            .await
            .map_err(ReportError::store(operation))?;
        docs.into_iter()
            .map(|doc: Document| {
                serde_json::from_value(doc)
                    .map_err(|e| ReportError::store(operation)(StoreError::decode(collection, e)))
            })
            .collect()
    }
}

#[async_trait]
impl EnumerationDirectory for StoreDirectory {
    async fn labels(&self, app_id: &str, option_id: &str) -> ReportResult<HashMap<String, String>> {
        let filter = Predicate::and(vec![
            Predicate::eq("app_id", Operand::Text(app_id.into())),
            Predicate::eq("option_id", Operand::Text(option_id.into())),
        ]);
        let entries: Vec<OptionEntry> = self.load(OPTIONS, &filter, "load option labels").await?;
        Ok(entries
            .into_iter()
            .map(|e| (e.option_value, e.option_label))
            .collect())
    }
}

#[async_trait]
impl IdentityDirectory for StoreDirectory {
    async fn display_names(&self, user_ids: &[String]) -> ReportResult<HashMap<String, String>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let filter = Predicate::is_in("user_id", user_ids.to_vec());
        let entries: Vec<UserEntry> = self.load(USERS, &filter, "load user names").await?;
        Ok(entries.into_iter().map(|e| (e.user_id, e.user_name)).collect())
    }
}

#[async_trait]
impl TenantConfigSource for StoreDirectory {
    async fn processing_period(&self, app_id: &str) -> ReportResult<Option<String>> {
        let filter = Predicate::eq("app_id", Operand::Text(app_id.into()));
        let apps: Vec<AppEntry> = self.load(APPS, &filter, "load app config").await?;
        Ok(apps
            .into_iter()
            .next()
            .and_then(|app| app.configs.processing_period)
            .filter(|period| !period.is_empty()))
    }
}
