//! Core data models for the AI gateway

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Free-tier limit message shown when the daily counter is exhausted
const QUOTA_MESSAGE: &str =
    "Upgrade for more AI - free tier limit reached for today. Get unlimited AI calls with Premium.";

/// Outcome of one dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchResult {
    /// Upstream answered (or the answer was served from cache)
    Success {
        text: String,
        /// Set when the value came from the request cache
        cached: bool,
    },
    /// Upstream unavailable; fixed troubleshooting payload
    Fallback(FallbackPayload),
    /// Free-tier daily limit reached; no upstream call was made
    QuotaExceeded { message: String },
}

impl DispatchResult {
    /// Fresh upstream success
    pub fn success(text: impl Into<String>) -> Self {
        DispatchResult::Success {
            text: text.into(),
            cached: false,
        }
    }

    /// Cache-hit success
    pub fn cached(text: impl Into<String>) -> Self {
        DispatchResult::Success {
            text: text.into(),
            cached: true,
        }
    }

    /// The fixed fallback payload
    pub fn fallback() -> Self {
        DispatchResult::Fallback(FallbackPayload::default())
    }

    /// The fixed free-tier limit message
    pub fn quota_exceeded() -> Self {
        DispatchResult::QuotaExceeded {
            message: QUOTA_MESSAGE.to_string(),
        }
    }

    /// True when the value was served from the request cache
    pub fn is_cached(&self) -> bool {
        matches!(self, DispatchResult::Success { cached: true, .. })
    }
}

/// Static troubleshooting suggestions returned when the AI service fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackPayload {
    pub fix: String,
    pub suggestions: Vec<String>,
    pub note: String,
}

impl Default for FallbackPayload {
    fn default() -> Self {
        Self {
            fix: "Check logs manually".to_string(),
            suggestions: vec![
                "Review the site's debug log".to_string(),
                "Check server error logs".to_string(),
                "Verify plugin compatibility".to_string(),
                "Clear cache and try again".to_string(),
                "Contact support if issue persists".to_string(),
            ],
            note: "AI service temporarily unavailable. Using fallback recommendations.".to_string(),
        }
    }
}

/// Daily quota state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    pub calls_today: u32,
    pub last_reset_date: NaiveDate,
}

impl QuotaState {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            calls_today: 0,
            last_reset_date: today,
        }
    }

    /// Reset the counter when the stored date no longer matches `today`.
    ///
    /// Idempotent: a second call on the same day is a no-op. Both the
    /// scheduled daily reset and the lazy on-read check converge here.
    pub fn reset_if_stale(&mut self, today: NaiveDate) -> bool {
        if self.last_reset_date != today {
            self.calls_today = 0;
            self.last_reset_date = today;
            return true;
        }
        false
    }

    /// Unconditional reset to a fresh day
    pub fn reset(&mut self, today: NaiveDate) {
        self.calls_today = 0;
        self.last_reset_date = today;
    }
}

/// Read-only usage snapshot for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub calls_today: u32,
    pub last_reset_date: NaiveDate,
    pub is_premium: bool,
    pub next_reset_date: NaiveDate,
}

impl UsageStats {
    pub fn from_state(state: &QuotaState, is_premium: bool, today: NaiveDate) -> Self {
        Self {
            calls_today: state.calls_today,
            last_reset_date: state.last_reset_date,
            is_premium,
            next_reset_date: today + Duration::days(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_reset_if_stale_on_new_day() {
        let mut state = QuotaState {
            calls_today: 7,
            last_reset_date: day("2026-08-05"),
        };

        assert!(state.reset_if_stale(day("2026-08-06")));
        assert_eq!(state.calls_today, 0);
        assert_eq!(state.last_reset_date, day("2026-08-06"));
    }

    #[test]
    fn test_reset_if_stale_is_idempotent() {
        let mut state = QuotaState::new(day("2026-08-06"));
        state.calls_today = 2;

        assert!(!state.reset_if_stale(day("2026-08-06")));
        assert_eq!(state.calls_today, 2);
    }

    #[test]
    fn test_unconditional_reset() {
        let mut state = QuotaState {
            calls_today: 5,
            last_reset_date: day("2026-08-05"),
        };

        state.reset(day("2026-08-06"));
        assert_eq!(state.calls_today, 0);
        assert_eq!(state.last_reset_date, day("2026-08-06"));
    }

    #[test]
    fn test_quota_message_mentions_upgrade() {
        match DispatchResult::quota_exceeded() {
            DispatchResult::QuotaExceeded { message } => {
                assert!(message.contains("Upgrade"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_fallback_payload_is_fixed() {
        let a = FallbackPayload::default();
        let b = FallbackPayload::default();
        assert_eq!(a, b);
        assert_eq!(a.suggestions.len(), 5);
        assert!(a.note.contains("temporarily unavailable"));
    }

    #[test]
    fn test_usage_stats_snapshot() {
        let state = QuotaState {
            calls_today: 3,
            last_reset_date: day("2026-08-06"),
        };
        let stats = UsageStats::from_state(&state, false, day("2026-08-06"));

        assert_eq!(stats.calls_today, 3);
        assert!(!stats.is_premium);
        assert_eq!(stats.next_reset_date, day("2026-08-07"));
    }

    #[test]
    fn test_dispatch_result_serializes_tagged() {
        let json = serde_json::to_value(DispatchResult::success("ok")).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["text"], "ok");
        assert_eq!(json["cached"], false);
    }
}
