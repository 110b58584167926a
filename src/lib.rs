//! AI Guardian - AI diagnostics gateway library
//!
//! This library wraps third-party chat-completion APIs behind a single
//! dispatcher with provider detection, response caching, daily free-tier
//! quota enforcement and graceful fallback on upstream failure.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod core;
pub mod server;

// Re-export key types for convenience
pub use crate::core::{
    cache::CacheScope,
    config::GatewayConfig,
    errors::GatewayError,
    gateway::{AiGateway, ChatTransport},
    models::{DispatchResult, FallbackPayload, QuotaState, UsageStats},
    provider::Provider,
    quota::QuotaTracker,
    store::{CacheStore, Clock, FileStore, ManualClock, MemoryCache, MemoryStore, OptionStore, SystemClock},
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
