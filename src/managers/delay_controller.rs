// DelayController: buffering delay tracking with user pinning
//
// Pinning is a control-layer concept: the engine only ever reports a
// free-running value, and a pinned controller ignores those reports.

use crate::config::ControlConfig;
use crate::error::{log_session_error, SessionError};

/// Current buffering delay plus the optional user pin.
///
/// `pinned_ms` is `Some` exactly when the delay is fixed, and then equals
/// `current_ms`. Values stay within `0..=max_ms`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayController {
    current_ms: i64,
    pinned_ms: Option<i64>,
    step_ms: i64,
    max_ms: i64,
}

impl DelayController {
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            current_ms: 0,
            pinned_ms: None,
            step_ms: config.delay_step_ms.max(1),
            max_ms: config.max_delay_ms.max(0),
        }
    }

    pub fn delay_ms(&self) -> i64 {
        self.current_ms
    }

    pub fn is_fixed(&self) -> bool {
        self.pinned_ms.is_some()
    }

    pub fn pinned_value_ms(&self) -> Option<i64> {
        self.pinned_ms
    }

    pub fn step_ms(&self) -> i64 {
        self.step_ms
    }

    /// Back to free-running at zero; used when a new session starts.
    pub fn reset(&mut self) {
        self.current_ms = 0;
        self.pinned_ms = None;
    }

    /// Drop the pin but keep the last value; used when a session stops.
    pub fn release_pin(&mut self) {
        self.pinned_ms = None;
    }

    /// Apply a delay reported by the engine.
    ///
    /// Returns `true` if the report changed the tracked value source, i.e.
    /// the controller is free-running and the report was in range.
    pub fn apply_engine_report(&mut self, delay_ms: i64) -> bool {
        if self.is_fixed() {
            return false;
        }
        if delay_ms < 0 {
            log::debug!("[Delay] Ignoring negative engine report {}", delay_ms);
            return false;
        }
        self.current_ms = delay_ms.min(self.max_ms);
        true
    }

    /// One step up; always pins the result.
    pub fn increase(&mut self) -> i64 {
        let next = self.current_ms.saturating_add(self.step_ms).min(self.max_ms);
        self.pin(next)
    }

    /// One step down, floored at zero; always pins the result.
    pub fn decrease(&mut self) -> i64 {
        let next = self.current_ms.saturating_sub(self.step_ms).max(0);
        self.pin(next)
    }

    /// Pin the delay at an explicit value.
    ///
    /// # Errors
    /// `InvalidInput` if `delay_ms` is negative or above the configured maximum.
    pub fn fix_at(&mut self, delay_ms: i64) -> Result<(), SessionError> {
        if delay_ms < 0 {
            let err = SessionError::invalid_input(format!(
                "delay must not be negative (got {})",
                delay_ms
            ));
            log_session_error(&err, "DelayController", "fix_delay_at");
            return Err(err);
        }
        if delay_ms > self.max_ms {
            let err = SessionError::invalid_input(format!(
                "delay must not exceed {} ms (got {})",
                self.max_ms, delay_ms
            ));
            log_session_error(&err, "DelayController", "fix_delay_at");
            return Err(err);
        }
        self.pin(delay_ms);
        Ok(())
    }

    /// Resume tracking engine reports, starting with the next one.
    pub fn unfix(&mut self) {
        self.pinned_ms = None;
    }

    fn pin(&mut self, delay_ms: i64) -> i64 {
        self.current_ms = delay_ms;
        self.pinned_ms = Some(delay_ms);
        delay_ms
    }
}
