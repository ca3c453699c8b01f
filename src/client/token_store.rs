//! Token storage with an optional persistence hook.
//!
//! The store keeps the current access/refresh pair. A 401 handler compares
//! the access token its request was sent with against the stored one to tell
//! whether somebody else already replaced it.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::models::TokenPair;

/// Error type returned by persistence hooks.
pub type PersistenceError = Box<dyn std::error::Error + Send + Sync>;

/// Host-supplied storage for the token pair.
///
/// `persist` runs fire-and-forget after every complete update; its failures
/// are logged and never reach the caller. `rehydrate` runs once while the
/// client is being built.
#[async_trait]
pub trait TokenPersistence: Send + Sync {
    /// Store a complete token pair
    async fn persist(&self, tokens: &TokenPair) -> Result<(), PersistenceError>;

    /// Load a previously stored pair, if any
    async fn rehydrate(&self) -> Result<Option<TokenPair>, PersistenceError>;
}

/// Current tokens behind an async RwLock.
pub struct TokenStore {
    pair: RwLock<TokenPair>,
    persistence: Option<Arc<dyn TokenPersistence>>,
}

impl TokenStore {
    pub fn new(persistence: Option<Arc<dyn TokenPersistence>>) -> Self {
        Self {
            pair: RwLock::new(TokenPair::default()),
            persistence,
        }
    }

    /// Copy of the current pair.
    pub async fn snapshot(&self) -> TokenPair {
        self.pair.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.pair.read().await.access_token.clone()
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.pair.read().await.refresh_token.clone()
    }

    /// Replace the whole pair (refresh results). Missing fields are cleared.
    pub async fn replace(&self, pair: TokenPair) {
        *self.pair.write().await = pair.clone();
        debug!("Token pair replaced");
        if pair.is_complete() {
            self.persist(pair);
        }
    }

    /// Overlay whichever fields `update` carries (tokens captured from a
    /// response). Returns true when anything changed.
    pub async fn merge(&self, update: TokenPair) -> bool {
        let Some(merged) = self.overlay(update).await else {
            return false;
        };
        debug!("Tokens captured from response");

        if merged.is_complete() {
            self.persist(merged);
        }
        true
    }

    /// Load tokens from the persistence hook, overlaying the fields it has.
    ///
    /// Failures are logged and leave the store untouched.
    pub async fn rehydrate(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };

        match persistence.rehydrate().await {
            Ok(Some(pair)) => {
                if self.overlay(pair).await.is_some() {
                    debug!("Tokens rehydrated from persistence");
                }
            }
            Ok(None) => debug!("No persisted tokens to rehydrate"),
            Err(e) => warn!(error = %e, "Token rehydration failed, starting without tokens"),
        }
    }

    /// Apply the present fields of `update`; the new pair if it changed.
    async fn overlay(&self, update: TokenPair) -> Option<TokenPair> {
        if update.is_empty() {
            return None;
        }

        let mut pair = self.pair.write().await;
        let mut merged = (*pair).clone();
        if let Some(access) = update.access_token {
            merged.access_token = Some(access);
        }
        if let Some(refresh) = update.refresh_token {
            merged.refresh_token = Some(refresh);
        }
        if merged == *pair {
            return None;
        }
        *pair = merged.clone();
        Some(merged)
    }

    fn persist(&self, pair: TokenPair) {
        let Some(persistence) = self.persistence.clone() else {
            return;
        };

        tokio::spawn(async move {
            if let Err(e) = persistence.persist(&pair).await {
                warn!(error = %e, "Token persistence failed");
            }
        });
    }
}
