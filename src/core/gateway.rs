//! AI-call gateway: cache lookup, quota gate, provider dispatch and fallback

use async_trait::async_trait;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::cache::ResponseCache;
use crate::core::config::GatewayConfig;
use crate::core::errors::{GatewayError, Result};
use crate::core::models::{DispatchResult, UsageStats};
use crate::core::provider::Provider;
use crate::core::quota::QuotaTracker;
use crate::core::store::{
    CacheStore, Clock, MemoryCache, MemoryStore, OptionStore, SystemClock,
};

/// Option name overriding the configured credential at runtime
const API_KEY_OPTION: &str = "api_key";

/// Outbound chat-completion transport.
///
/// One implementation speaks HTTP; tests substitute a recording fake so
/// every dispatch property can be checked without a network.
#[async_trait]
pub trait ChatTransport: Send + Sync + fmt::Debug {
    /// POST `body` to `endpoint` with a bearer credential.
    ///
    /// Returns the HTTP status and raw response body; transport-level
    /// failures (DNS, connect, timeout) surface as errors.
    async fn post_chat(
        &self,
        endpoint: &str,
        api_key: &str,
        body: &serde_json::Value,
    ) -> Result<(u16, String)>;
}

/// reqwest-backed transport with the standard 30 s timeout
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout_ms: u64, allow_insecure_tls: bool) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .pool_max_idle_per_host(10);

        if allow_insecure_tls {
            warn!("TLS certificate verification disabled for local development");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl ChatTransport for ReqwestTransport {
    async fn post_chat(
        &self,
        endpoint: &str,
        api_key: &str,
        body: &serde_json::Value,
    ) -> Result<(u16, String)> {
        let response = self
            .client
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::TimeoutError
                } else {
                    GatewayError::NetworkError {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::NetworkError {
                message: e.to_string(),
            })?;

        Ok((status, text))
    }
}

/// The dispatcher every diagnostics feature calls into.
///
/// `generate` runs the fixed sequence: cache lookup, quota gate,
/// credential classification, upstream call, cache store, quota
/// increment. Upstream failures never escape as errors; they collapse
/// into the fixed fallback payload.
#[derive(Debug, Clone)]
pub struct AiGateway {
    config: Arc<GatewayConfig>,
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn OptionStore>,
    cache: ResponseCache,
    quota: QuotaTracker,
}

impl AiGateway {
    /// Create a gateway with in-memory state and a real HTTP transport
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let store: Arc<dyn OptionStore> = Arc::new(MemoryStore::new());
        Self::with_store(config, store)
    }

    /// Create a gateway over a caller-supplied option store
    pub fn with_store(config: GatewayConfig, store: Arc<dyn OptionStore>) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(
            config.timeout_ms,
            config.allow_insecure_tls(),
        )?);
        Self::with_parts(
            config,
            transport,
            store,
            Arc::new(MemoryCache::new()),
            Arc::new(SystemClock),
        )
    }

    /// Fully injected constructor; every collaborator is a port
    pub fn with_parts(
        config: GatewayConfig,
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn OptionStore>,
        cache_store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let cache = ResponseCache::new(
            cache_store,
            clock.clone(),
            config.cache_ttl_secs,
            config.cache_scope,
        );
        let quota = QuotaTracker::new(store.clone(), clock);

        Ok(Self {
            config: Arc::new(config),
            transport,
            store,
            cache,
            quota,
        })
    }

    /// Create from environment
    pub fn from_env() -> Result<Self> {
        let config = GatewayConfig::load()?;
        Self::new(config)
    }

    /// Dispatch a prompt under the configured free-tier ceiling
    pub async fn generate(&self, prompt: &str) -> Result<DispatchResult> {
        self.generate_with_limit(prompt, self.config.default_max_calls)
            .await
    }

    /// Dispatch a prompt with a per-call-site daily ceiling.
    ///
    /// Different features may pass different ceilings; they all gate
    /// against the same shared daily counter.
    pub async fn generate_with_limit(
        &self,
        prompt: &str,
        max_calls: u32,
    ) -> Result<DispatchResult> {
        if prompt.trim().is_empty() {
            return Err(GatewayError::EmptyPrompt);
        }

        let credential = self.credential();

        // Cache first: a live entry short-circuits quota and dispatch
        let key = self.cache.key_for(prompt, &credential);
        if let Some(text) = self.cache.lookup(&key) {
            debug!("cache hit for {}", key);
            return Ok(DispatchResult::cached(text));
        }

        let premium = self.quota.is_premium();
        if !premium {
            self.quota.check_and_reset_if_new_day();
            if self.quota.calls_today() >= max_calls {
                return Ok(DispatchResult::quota_exceeded());
            }
        }

        let text = match self.call_upstream(prompt, &credential).await {
            Ok(text) => text,
            Err(e) => {
                warn!("upstream dispatch failed: {}", e);
                return Ok(DispatchResult::fallback());
            }
        };

        // Failed cache writes are tolerated; the fresh value still counts
        self.cache.store(&key, &text);

        if !premium {
            if let Err(e) = self.quota.increment() {
                warn!("failed to count AI call: {}", e);
            }
        }

        Ok(DispatchResult::success(text))
    }

    /// Premium flag read-through for callers that branch without dispatching
    pub fn is_premium(&self) -> bool {
        self.quota.is_premium()
    }

    /// Read-only usage snapshot for display
    pub fn usage_stats(&self) -> UsageStats {
        self.quota.usage_stats()
    }

    /// Daily counter reset, invoked by the external scheduler
    pub fn reset_quota(&self) -> Result<()> {
        self.quota.reset()
    }

    /// Gateway configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Credential for this dispatch: a runtime store value overrides the
    /// configured one, re-read on every call so key rotation takes effect
    /// without a restart
    fn credential(&self) -> String {
        self.store
            .get(API_KEY_OPTION)
            .unwrap_or_else(|| self.config.api_key.clone())
    }

    async fn call_upstream(&self, prompt: &str, credential: &str) -> Result<String> {
        if credential.is_empty() {
            return Err(GatewayError::ConfigError {
                message: "API key not configured".to_string(),
            });
        }

        let provider = Provider::classify(credential);
        let route = provider.route(self.config.default_provider);
        debug!("dispatching {} call to {}", provider, route.endpoint);

        let body = json!({
            "model": route.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        let (status, response) = self
            .transport
            .post_chat(route.endpoint, credential, &body)
            .await?;

        if status != 200 {
            warn!(
                "API error: HTTP {} - {}",
                status,
                truncate(&response, 500)
            );
            return Err(GatewayError::ApiError {
                status,
                message: truncate(&response, 200).to_string(),
            });
        }

        let data: serde_json::Value = serde_json::from_str(&response).map_err(|e| {
            warn!("JSON parse error: {} - {}", e, truncate(&response, 500));
            GatewayError::InvalidResponseError {
                message: e.to_string(),
            }
        })?;

        data["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                warn!("no content in response: {}", truncate(&response, 500));
                GatewayError::InvalidResponseError {
                    message: "No content in API response".to_string(),
                }
            })
    }
}

/// Char-boundary-safe prefix for log lines
fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::FallbackPayload;
    use crate::core::store::ManualClock;
    use assert_json_diff::assert_json_eq;
    use std::sync::Mutex;
    use tokio_test::assert_ok;

    /// Scripted reply for the recording transport
    #[derive(Debug, Clone)]
    enum MockReply {
        Http(u16, String),
        NetworkDown,
    }

    #[derive(Debug)]
    struct MockTransport {
        requests: Mutex<Vec<(String, serde_json::Value)>>,
        reply: Mutex<MockReply>,
    }

    impl MockTransport {
        fn replying(reply: MockReply) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                reply: Mutex::new(reply),
            })
        }

        fn ok(content: &str) -> Arc<Self> {
            Self::replying(MockReply::Http(
                200,
                json!({
                    "choices": [ { "message": { "role": "assistant", "content": content } } ],
                    "usage": { "total_tokens": 42 }
                })
                .to_string(),
            ))
        }

        fn set_reply(&self, reply: MockReply) {
            *self.reply.lock().unwrap() = reply;
        }

        fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last_request(&self) -> (String, serde_json::Value) {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ChatTransport for MockTransport {
        async fn post_chat(
            &self,
            endpoint: &str,
            _api_key: &str,
            body: &serde_json::Value,
        ) -> Result<(u16, String)> {
            self.requests
                .lock()
                .unwrap()
                .push((endpoint.to_string(), body.clone()));
            match self.reply.lock().unwrap().clone() {
                MockReply::Http(status, body) => Ok((status, body)),
                MockReply::NetworkDown => Err(GatewayError::NetworkError {
                    message: "connection refused".to_string(),
                }),
            }
        }
    }

    struct Harness {
        gateway: AiGateway,
        transport: Arc<MockTransport>,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    fn harness(api_key: &str, transport: Arc<MockTransport>) -> Harness {
        let config = GatewayConfig {
            api_key: api_key.to_string(),
            ..Default::default()
        };
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::at("2026-08-06T10:00:00Z"));
        let gateway = AiGateway::with_parts(
            config,
            transport.clone(),
            store.clone(),
            Arc::new(MemoryCache::new()),
            clock.clone(),
        )
        .unwrap();

        Harness {
            gateway,
            transport,
            store,
            clock,
        }
    }

    fn text_of(result: &DispatchResult) -> &str {
        match result {
            DispatchResult::Success { text, .. } => text,
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_groq_credential_hits_groq_endpoint() {
        // Scenario A
        let h = harness("gsk_XXXX", MockTransport::ok("pong"));

        let result = tokio_test::assert_ok!(h.gateway.generate_with_limit("ping", 3).await);
        assert_eq!(text_of(&result), "pong");
        assert!(!result.is_cached());

        let (endpoint, _) = h.transport.last_request();
        assert_eq!(endpoint, "https://api.groq.com/openai/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_perplexity_credential_hits_perplexity_endpoint() {
        let h = harness("pplx-XXXX", MockTransport::ok("pong"));

        h.gateway.generate_with_limit("ping", 3).await.unwrap();
        let (endpoint, _) = h.transport.last_request();
        assert_eq!(endpoint, "https://api.perplexity.ai/chat/completions");
    }

    #[tokio::test]
    async fn test_unrecognized_credential_routes_to_default() {
        let h = harness("mystery-key", MockTransport::ok("pong"));

        h.gateway.generate_with_limit("ping", 3).await.unwrap();
        let (endpoint, _) = h.transport.last_request();
        assert_eq!(endpoint, "https://api.groq.com/openai/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_wire_body_shape() {
        let h = harness("gsk_XXXX", MockTransport::ok("pong"));

        h.gateway.generate_with_limit("ping", 3).await.unwrap();
        let (_, body) = h.transport.last_request();
        assert_json_eq!(
            body,
            json!({
                "model": "llama-3.1-8b-instant",
                "messages": [ { "role": "user", "content": "ping" } ],
                "max_tokens": 800,
                "temperature": 0.7,
            })
        );
    }

    #[tokio::test]
    async fn test_no_credential_returns_fallback_without_http() {
        // Scenario B
        let h = harness("", MockTransport::ok("pong"));

        let result = h.gateway.generate_with_limit("anything", 3).await.unwrap();
        assert_eq!(
            result,
            DispatchResult::Fallback(FallbackPayload::default())
        );
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_quota_exceeded_after_limit() {
        // Scenario C
        let h = harness("gsk_XXXX", MockTransport::ok("pong"));

        let first = h.gateway.generate_with_limit("first prompt", 1).await.unwrap();
        assert!(matches!(first, DispatchResult::Success { .. }));

        let second = h.gateway.generate_with_limit("second prompt", 1).await.unwrap();
        match second {
            DispatchResult::QuotaExceeded { message } => {
                assert!(message.contains("Upgrade"));
            }
            other => panic!("expected quota exceeded, got {:?}", other),
        }
        // The blocked dispatch never reached the transport
        assert_eq!(h.transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_upstream_and_counter() {
        // Scenario D
        let h = harness("gsk_XXXX", MockTransport::ok("pong"));

        let first = h.gateway.generate_with_limit("ping", 3).await.unwrap();
        assert_eq!(text_of(&first), "pong");
        assert_eq!(h.gateway.usage_stats().calls_today, 1);

        let second = h.gateway.generate_with_limit("ping", 3).await.unwrap();
        assert_eq!(text_of(&second), "pong");
        assert!(second.is_cached());
        assert_eq!(h.transport.call_count(), 1);
        assert_eq!(h.gateway.usage_stats().calls_today, 1);
    }

    #[tokio::test]
    async fn test_cache_expires_after_ttl() {
        let h = harness("gsk_XXXX", MockTransport::ok("pong"));

        h.gateway.generate_with_limit("ping", 3).await.unwrap();
        h.clock.advance(chrono::Duration::minutes(61));

        let result = h.gateway.generate_with_limit("ping", 3).await.unwrap();
        assert!(!result.is_cached());
        assert_eq!(h.transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_premium_bypasses_quota_and_counter() {
        let h = harness("gsk_XXXX", MockTransport::ok("pong"));
        h.store.set("is_premium", "1").unwrap();

        for i in 0..5 {
            let result = h
                .gateway
                .generate_with_limit(&format!("prompt {}", i), 1)
                .await
                .unwrap();
            assert!(matches!(result, DispatchResult::Success { .. }));
        }

        assert_eq!(h.transport.call_count(), 5);
        assert_eq!(h.gateway.usage_stats().calls_today, 0);
    }

    #[tokio::test]
    async fn test_counter_resets_next_day() {
        let h = harness("gsk_XXXX", MockTransport::ok("pong"));

        h.gateway.generate_with_limit("one", 1).await.unwrap();
        let blocked = h.gateway.generate_with_limit("two", 1).await.unwrap();
        assert!(matches!(blocked, DispatchResult::QuotaExceeded { .. }));

        h.clock.advance(chrono::Duration::days(1));
        let fresh = h.gateway.generate_with_limit("two", 1).await.unwrap();
        assert!(matches!(fresh, DispatchResult::Success { .. }));
    }

    #[tokio::test]
    async fn test_http_error_returns_fixed_fallback_uncached() {
        let h = harness("gsk_XXXX", MockTransport::replying(MockReply::Http(
            500,
            "internal error".to_string(),
        )));

        let result = h.gateway.generate_with_limit("ping", 3).await.unwrap();
        assert_eq!(
            result,
            DispatchResult::Fallback(FallbackPayload::default())
        );
        // Failures are not cached and not counted
        assert_eq!(h.gateway.usage_stats().calls_today, 0);

        let again = h.gateway.generate_with_limit("ping", 3).await.unwrap();
        assert!(matches!(again, DispatchResult::Fallback(_)));
        assert_eq!(h.transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_malformed_json_returns_fallback() {
        let h = harness(
            "gsk_XXXX",
            MockTransport::replying(MockReply::Http(200, "not json {".to_string())),
        );

        let result = h.gateway.generate_with_limit("ping", 3).await.unwrap();
        assert_eq!(
            result,
            DispatchResult::Fallback(FallbackPayload::default())
        );
    }

    #[tokio::test]
    async fn test_missing_content_field_returns_fallback() {
        let h = harness(
            "gsk_XXXX",
            MockTransport::replying(MockReply::Http(
                200,
                json!({ "choices": [ { "message": {} } ] }).to_string(),
            )),
        );

        let result = h.gateway.generate_with_limit("ping", 3).await.unwrap();
        assert_eq!(
            result,
            DispatchResult::Fallback(FallbackPayload::default())
        );
        assert_eq!(h.gateway.usage_stats().calls_today, 0);
    }

    #[tokio::test]
    async fn test_transport_failure_returns_fallback() {
        let h = harness("gsk_XXXX", MockTransport::replying(MockReply::NetworkDown));

        let result = h.gateway.generate_with_limit("ping", 3).await.unwrap();
        assert_eq!(
            result,
            DispatchResult::Fallback(FallbackPayload::default())
        );
    }

    #[tokio::test]
    async fn test_recovery_after_outage_caches_again() {
        let transport = MockTransport::replying(MockReply::NetworkDown);
        let h = harness("gsk_XXXX", transport.clone());

        let down = h.gateway.generate_with_limit("ping", 3).await.unwrap();
        assert!(matches!(down, DispatchResult::Fallback(_)));

        transport.set_reply(MockReply::Http(
            200,
            json!({ "choices": [ { "message": { "content": "pong" } } ] }).to_string(),
        ));
        let up = h.gateway.generate_with_limit("ping", 3).await.unwrap();
        assert_eq!(text_of(&up), "pong");

        let cached = h.gateway.generate_with_limit("ping", 3).await.unwrap();
        assert!(cached.is_cached());
        assert_eq!(h.transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_prompt_is_a_caller_error() {
        let h = harness("gsk_XXXX", MockTransport::ok("pong"));

        let err = h.gateway.generate_with_limit("  ", 3).await.unwrap_err();
        assert!(matches!(err, GatewayError::EmptyPrompt));
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_runtime_key_rotation_takes_effect() {
        let h = harness("gsk_XXXX", MockTransport::ok("pong"));

        h.gateway.generate_with_limit("ping", 3).await.unwrap();
        let (endpoint, _) = h.transport.last_request();
        assert_eq!(endpoint, "https://api.groq.com/openai/v1/chat/completions");

        h.store.set("api_key", "pplx-YYYY").unwrap();
        h.gateway.generate_with_limit("other", 3).await.unwrap();
        let (endpoint, _) = h.transport.last_request();
        assert_eq!(endpoint, "https://api.perplexity.ai/chat/completions");
    }
}
