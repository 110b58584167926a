//! Daily call counting and free-tier quota management

use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::core::errors::Result;
use crate::core::models::{QuotaState, UsageStats};
use crate::core::store::{Clock, OptionStore};

/// Daily call counter option name
const CALLS_OPTION: &str = "ai_daily_calls";

/// Last reset date option name
const RESET_DATE_OPTION: &str = "ai_reset_date";

/// Premium tier flag option name
const PREMIUM_OPTION: &str = "is_premium";

/// Tracks the shared daily call counter against the option store.
///
/// The external daily scheduler calls `reset`; every read path also runs
/// the lazy `reset_if_stale` check, so a missed scheduler tick converges
/// to the same state. Read-modify-write sequences are serialized behind a
/// mutex so concurrent dispatches cannot undercount.
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    store: Arc<dyn OptionStore>,
    clock: Arc<dyn Clock>,
    guard: Arc<Mutex<()>>,
}

impl QuotaTracker {
    pub fn new(store: Arc<dyn OptionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            guard: Arc::new(Mutex::new(())),
        }
    }

    /// Whether the account is on the premium tier.
    ///
    /// The flag is owned by the option store, not by the tracker.
    pub fn is_premium(&self) -> bool {
        matches!(
            self.store.get_or(PREMIUM_OPTION, "").as_str(),
            "1" | "true"
        )
    }

    /// Calls made today, after the lazy reset check
    pub fn calls_today(&self) -> u32 {
        let _lock = self.guard.lock().unwrap();
        let mut state = self.load_state();
        if state.reset_if_stale(self.clock.today()) {
            self.persist_quietly(&state);
        }
        state.calls_today
    }

    /// Reset the counter if the stored date is no longer today.
    ///
    /// Idempotent; the second call on the same day is a no-op.
    pub fn check_and_reset_if_new_day(&self) {
        let _lock = self.guard.lock().unwrap();
        let mut state = self.load_state();
        if state.reset_if_stale(self.clock.today()) {
            info!("daily AI call counter reset for {}", state.last_reset_date);
            self.persist_quietly(&state);
        }
    }

    /// Count one successful non-premium upstream call
    pub fn increment(&self) -> Result<()> {
        let _lock = self.guard.lock().unwrap();
        let mut state = self.load_state();
        state.reset_if_stale(self.clock.today());
        state.calls_today += 1;
        debug!("AI call counter now {}", state.calls_today);
        self.persist(&state)
    }

    /// Unconditional reset, the external daily scheduler's entry point
    pub fn reset(&self) -> Result<()> {
        let _lock = self.guard.lock().unwrap();
        let mut state = self.load_state();
        state.reset(self.clock.today());
        info!("daily AI call counter reset");
        self.persist(&state)
    }

    /// Read-only snapshot for display
    pub fn usage_stats(&self) -> UsageStats {
        let _lock = self.guard.lock().unwrap();
        let today = self.clock.today();
        let mut state = self.load_state();
        if state.reset_if_stale(today) {
            self.persist_quietly(&state);
        }
        UsageStats::from_state(&state, self.is_premium(), today)
    }

    fn load_state(&self) -> QuotaState {
        let calls_today = self
            .store
            .get(CALLS_OPTION)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let last_reset_date = self
            .store
            .get(RESET_DATE_OPTION)
            .and_then(|v| v.parse().ok())
            // No recorded date reads as stale, forcing a first reset
            .unwrap_or(chrono::NaiveDate::MIN);

        QuotaState {
            calls_today,
            last_reset_date,
        }
    }

    fn persist(&self, state: &QuotaState) -> Result<()> {
        self.store.set(CALLS_OPTION, &state.calls_today.to_string())?;
        self.store
            .set(RESET_DATE_OPTION, &state.last_reset_date.to_string())
    }

    fn persist_quietly(&self, state: &QuotaState) {
        if let Err(e) = self.persist(state) {
            tracing::warn!("failed to persist quota state: {}", e);
        }
    }
}
