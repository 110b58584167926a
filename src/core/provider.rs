//! Provider detection and chat-completion routing

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream chat-completion provider, detected from the credential prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Groq (keys start with `gsk_`)
    Groq,
    /// Perplexity (keys start with `pplx-`)
    Perplexity,
    /// Hugging Face (keys start with `hf_`)
    HuggingFace,
    /// OpenAI (keys start with `sk-`)
    OpenAi,
    /// No recognized prefix
    Unknown,
}

/// Ordered prefix table; first match wins
const KEY_PREFIXES: &[(&str, Provider)] = &[
    ("gsk_", Provider::Groq),
    ("pplx-", Provider::Perplexity),
    ("hf_", Provider::HuggingFace),
    ("sk-", Provider::OpenAi),
];

impl Provider {
    /// Classify a raw credential by its prefix.
    ///
    /// Total over all strings, including the empty string.
    pub fn classify(credential: &str) -> Provider {
        for (prefix, provider) in KEY_PREFIXES {
            if credential.starts_with(prefix) {
                return *provider;
            }
        }
        Provider::Unknown
    }

    /// Route this provider to a chat endpoint.
    ///
    /// Only Groq and Perplexity have native routes; everything else falls
    /// through to `default`, matching the routing of credentials the
    /// gateway can detect but not speak to directly.
    pub fn route(self, default: Provider) -> ChatRoute {
        match self {
            Provider::Groq => ChatRoute::GROQ,
            Provider::Perplexity => ChatRoute::PERPLEXITY,
            _ => match default {
                Provider::Perplexity => ChatRoute::PERPLEXITY,
                _ => ChatRoute::GROQ,
            },
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "groq" => Ok(Provider::Groq),
            "perplexity" => Ok(Provider::Perplexity),
            "huggingface" => Ok(Provider::HuggingFace),
            "openai" => Ok(Provider::OpenAi),
            "unknown" => Ok(Provider::Unknown),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Groq => write!(f, "groq"),
            Provider::Perplexity => write!(f, "perplexity"),
            Provider::HuggingFace => write!(f, "huggingface"),
            Provider::OpenAi => write!(f, "openai"),
            Provider::Unknown => write!(f, "unknown"),
        }
    }
}

/// Endpoint and model id for one upstream chat-completion service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatRoute {
    pub endpoint: &'static str,
    pub model: &'static str,
}

impl ChatRoute {
    /// Groq free-tier chat endpoint
    pub const GROQ: ChatRoute = ChatRoute {
        endpoint: "https://api.groq.com/openai/v1/chat/completions",
        model: "llama-3.1-8b-instant",
    };

    /// Perplexity chat endpoint
    pub const PERPLEXITY: ChatRoute = ChatRoute {
        endpoint: "https://api.perplexity.ai/chat/completions",
        model: "llama-3.1-sonar-small-128k-online",
    };
}
