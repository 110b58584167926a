//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::core::cache::CacheScope;
use crate::core::provider::Provider;

/// Configuration for the AI gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Upstream API credential; provider is detected from its prefix
    pub api_key: String,
    /// Provider used when the credential prefix is not natively routable
    pub default_provider: Provider,
    /// Upper bound on generated tokens per call
    pub max_tokens: u32,
    /// Sampling temperature sent upstream
    pub temperature: f64,
    /// Upstream request timeout
    pub timeout_ms: u64,
    /// Request cache validity window
    pub cache_ttl_secs: u64,
    /// Free-tier daily ceiling used when the caller does not supply one
    pub default_max_calls: u32,
    /// What the cache fingerprint covers
    pub cache_scope: CacheScope,
    /// Disable TLS verification for local development.
    ///
    /// Only honored when `deployment_host` also passes the local-host
    /// check; a production host never gets unverified TLS.
    pub insecure_dev_tls: bool,
    /// Host this deployment serves from, for the local-development check
    pub deployment_host: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("AIG_API_KEY").unwrap_or_default(),
            default_provider: Provider::Groq,
            max_tokens: 800,
            temperature: 0.7,
            timeout_ms: 30_000,
            cache_ttl_secs: 3600,
            default_max_calls: 3,
            cache_scope: CacheScope::PromptOnly,
            insecure_dev_tls: false,
            deployment_host: String::new(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("AIG_API_KEY").unwrap_or_default();

        let default_provider = std::env::var("AIG_DEFAULT_PROVIDER")
            .unwrap_or_else(|_| "groq".to_string())
            .parse::<Provider>()
            .map_err(|e| anyhow::anyhow!(e))?;

        let max_tokens = std::env::var("AIG_MAX_TOKENS")
            .unwrap_or_else(|_| "800".to_string())
            .parse::<u32>()?;

        let temperature = std::env::var("AIG_TEMPERATURE")
            .unwrap_or_else(|_| "0.7".to_string())
            .parse::<f64>()?;

        let timeout_ms = std::env::var("AIG_REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse::<u64>()?;

        let cache_ttl_secs = std::env::var("AIG_CACHE_TTL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse::<u64>()?;

        let default_max_calls = std::env::var("AIG_MAX_FREE_CALLS")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u32>()?;

        let cache_scope = match std::env::var("AIG_CACHE_SCOPE").as_deref() {
            Ok("prompt-and-provider") => CacheScope::PromptAndProvider,
            _ => CacheScope::PromptOnly,
        };

        let insecure_dev_tls = matches!(
            std::env::var("AIG_INSECURE_DEV_TLS").as_deref(),
            Ok("1") | Ok("true")
        );

        let deployment_host = std::env::var("AIG_DEPLOYMENT_HOST").unwrap_or_default();

        Ok(Self {
            api_key,
            default_provider,
            max_tokens,
            temperature,
            timeout_ms,
            cache_ttl_secs,
            default_max_calls,
            cache_scope,
            insecure_dev_tls,
            deployment_host,
        })
    }

    /// Load and validate configuration from the environment
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_key.is_empty() {
            warn!("No API key configured; dispatches will return the fallback payload");
        }

        if !matches!(
            self.default_provider,
            Provider::Groq | Provider::Perplexity
        ) {
            return Err(anyhow::anyhow!(
                "default_provider must be a routable provider (groq or perplexity)"
            ));
        }

        if self.max_tokens == 0 {
            return Err(anyhow::anyhow!("max_tokens must be greater than 0"));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(anyhow::anyhow!("temperature must be within 0.0..=2.0"));
        }

        if self.timeout_ms == 0 {
            return Err(anyhow::anyhow!("timeout_ms must be greater than 0"));
        }

        if self.cache_ttl_secs == 0 {
            return Err(anyhow::anyhow!("cache_ttl_secs must be greater than 0"));
        }

        if self.insecure_dev_tls && !is_local_host(&self.deployment_host) {
            return Err(anyhow::anyhow!(
                "insecure_dev_tls requires a local deployment host (got {:?})",
                self.deployment_host
            ));
        }

        Ok(())
    }

    /// Whether upstream TLS verification may be skipped.
    ///
    /// Requires both the explicit flag and a local deployment host.
    pub fn allow_insecure_tls(&self) -> bool {
        self.insecure_dev_tls && is_local_host(&self.deployment_host)
    }
}

/// Local/development host heuristic: loopback addresses, `localhost`
/// and `.local` hostnames
pub fn is_local_host(host: &str) -> bool {
    host == "127.0.0.1"
        || host == "::1"
        || host == "localhost"
        || host.starts_with("localhost:")
        || host.ends_with(".local")
}
