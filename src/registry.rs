//! Named client instances.
//!
//! An `ApiConnector` maps names to configured clients so different parts of
//! an application can share one client (and therefore one token store) by
//! name. Most applications only use [`DEFAULT_INSTANCE`].

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::client::ApiClient;
use crate::config::ConnectionConfig;
use crate::error::ApiResult;

/// Name used when the caller does not pick one.
pub const DEFAULT_INSTANCE: &str = "default";

/// Registry of named `ApiClient`s.
#[derive(Debug, Default)]
pub struct ApiConnector {
    instances: RwLock<HashMap<String, ApiClient>>,
}

impl ApiConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client under `name`, replacing any existing one.
    ///
    /// Holders of the replaced client keep using it; later lookups get the
    /// new one.
    pub async fn configure(&self, name: &str, config: ConnectionConfig) -> ApiResult<ApiClient> {
        let client = ApiClient::new(config)?;
        let replaced = self
            .instances
            .write()
            .await
            .insert(name.to_string(), client.clone());

        if replaced.is_some() {
            info!(instance = name, "API client reconfigured");
        } else {
            info!(instance = name, "API client configured");
        }
        Ok(client)
    }

    /// Register an already built client, e.g. one with token persistence.
    pub async fn insert(&self, name: &str, client: ApiClient) -> Option<ApiClient> {
        self.instances
            .write()
            .await
            .insert(name.to_string(), client)
    }

    /// Existing client under `name`, or a new one built from `config`.
    ///
    /// `config` is ignored when the instance already exists.
    pub async fn get_or_create(
        &self,
        name: &str,
        config: ConnectionConfig,
    ) -> ApiResult<ApiClient> {
        let mut instances = self.instances.write().await;
        if let Some(existing) = instances.get(name) {
            debug!(instance = name, "Reusing existing API client");
            return Ok(existing.clone());
        }

        let client = ApiClient::new(config)?;
        instances.insert(name.to_string(), client.clone());
        info!(instance = name, "API client configured");
        Ok(client)
    }

    pub async fn get(&self, name: &str) -> Option<ApiClient> {
        self.instances.read().await.get(name).cloned()
    }

    pub async fn default_instance(&self) -> Option<ApiClient> {
        self.get(DEFAULT_INSTANCE).await
    }

    pub async fn remove(&self, name: &str) -> Option<ApiClient> {
        self.instances.write().await.remove(name)
    }

    /// Registered names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instances.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
