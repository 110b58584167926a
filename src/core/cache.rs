//! Request cache keyed by prompt fingerprint

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::provider::Provider;
use crate::core::store::{CacheStore, Clock};

/// What the fingerprint covers.
///
/// The original behavior keys by prompt alone, so switching credentials
/// without clearing the cache serves the previous provider's answer.
/// `PromptAndProvider` folds the detected provider into the key for
/// deployments that rotate credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheScope {
    #[default]
    PromptOnly,
    PromptAndProvider,
}

/// TTL cache for dispatch results
#[derive(Debug, Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl_secs: u64,
    scope: CacheScope,
}

impl ResponseCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        ttl_secs: u64,
        scope: CacheScope,
    ) -> Self {
        Self {
            store,
            clock,
            ttl_secs,
            scope,
        }
    }

    /// Cache key for a prompt under the configured scope.
    ///
    /// Same prompt text yields the same key, independent of caller and
    /// time. Under `PromptAndProvider` the credential's detected provider
    /// tag is folded in as well.
    pub fn key_for(&self, prompt: &str, credential: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prompt.as_bytes());
        if self.scope == CacheScope::PromptAndProvider {
            hasher.update(Provider::classify(credential).to_string().as_bytes());
        }
        format!("ai_{:x}", hasher.finalize())
    }

    /// Live cached value for `key`, if any
    pub fn lookup(&self, key: &str) -> Option<String> {
        self.store.get(key, self.clock.now())
    }

    /// Cache `value` under `key` for the standard TTL.
    ///
    /// A failed write is logged and swallowed; the dispatch still returns
    /// the freshly computed value.
    pub fn store(&self, key: &str, value: &str) {
        match self.store.set(key, value, self.ttl_secs, self.clock.now()) {
            Ok(()) => debug!("cached response under {}", key),
            Err(e) => warn!("failed to cache response: {}", e),
        }
    }
}
