// Session error types and constants

use crate::error::ErrorCode;
use log::{error, warn};
use std::fmt;

/// Session error code constants exposed to host bindings
///
/// Single source of truth for the numeric codes the host UI uses to tell a
/// rejected action apart from an engine failure.
///
/// Error code range: 3001-3005
pub struct SessionErrorCodes {}

impl SessionErrorCodes {
    /// Empty address, negative or out-of-range delay
    pub const INVALID_INPUT: i32 = 3001;

    /// Delay adjustment requested while nothing is playing
    pub const NOT_PLAYING: i32 = 3002;

    /// Native engine failed to open or close a handle
    pub const ENGINE_ERROR: i32 = 3003;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 3004;

    /// Control process already torn down
    pub const SERVICE_UNAVAILABLE: i32 = 3005;
}

/// Log a session error with structured context
///
/// Rejected actions (`InvalidInput`, `NotPlaying`) log at warn level, engine
/// and service failures at error level. The logging is non-blocking and will
/// not panic on failure.
pub fn log_session_error(err: &SessionError, component: &str, context: &str) {
    let line = session_error_line(err, component, context);
    if err.is_rejection() {
        warn!("{}", line);
    } else {
        error!("{}", line);
    }
}

fn session_error_line(err: &SessionError, component: &str, context: &str) -> String {
    format!(
        "Session error in {}: code={}, component={}, message={}",
        context,
        err.code(),
        component,
        err.message()
    )
}

/// Session and delay-control errors
///
/// None of these are fatal: every variant is terminal for the triggering call
/// only, and nothing in the control core retries on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Input rejected before touching any state
    InvalidInput { reason: String },

    /// Delay adjustment while stopped; carries the last-known delay
    NotPlaying { last_delay_ms: i64 },

    /// Native engine failed to open or close a handle
    EngineError { details: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// The control actor is gone (service torn down)
    ServiceUnavailable,
}

impl SessionError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        SessionError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn engine(details: impl Into<String>) -> Self {
        SessionError::EngineError {
            details: details.into(),
        }
    }

    /// Action refused without any engine or service fault.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidInput { .. } | SessionError::NotPlaying { .. }
        )
    }
}

impl ErrorCode for SessionError {
    fn code(&self) -> i32 {
        match self {
            SessionError::InvalidInput { .. } => SessionErrorCodes::INVALID_INPUT,
            SessionError::NotPlaying { .. } => SessionErrorCodes::NOT_PLAYING,
            SessionError::EngineError { .. } => SessionErrorCodes::ENGINE_ERROR,
            SessionError::LockPoisoned { .. } => SessionErrorCodes::LOCK_POISONED,
            SessionError::ServiceUnavailable => SessionErrorCodes::SERVICE_UNAVAILABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            SessionError::InvalidInput { reason } => format!("Invalid input: {}", reason),
            SessionError::NotPlaying { last_delay_ms } => format!(
                "Nothing is playing. Call play() first (last delay {} ms).",
                last_delay_ms
            ),
            SessionError::EngineError { details } => format!("Engine error: {}", details),
            SessionError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            SessionError::ServiceUnavailable => "Control service is no longer running".to_string(),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SessionError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for SessionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_codes() {
        assert_eq!(
            SessionError::invalid_input("empty").code(),
            SessionErrorCodes::INVALID_INPUT
        );
        assert_eq!(
            SessionError::NotPlaying { last_delay_ms: 0 }.code(),
            SessionErrorCodes::NOT_PLAYING
        );
        assert_eq!(
            SessionError::engine("boom").code(),
            SessionErrorCodes::ENGINE_ERROR
        );
        assert_eq!(
            SessionError::LockPoisoned {
                component: "session".to_string()
            }
            .code(),
            SessionErrorCodes::LOCK_POISONED
        );
        assert_eq!(
            SessionError::ServiceUnavailable.code(),
            SessionErrorCodes::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_session_error_messages() {
        let err = SessionError::invalid_input("address must not be empty");
        assert_eq!(err.message(), "Invalid input: address must not be empty");

        let err = SessionError::NotPlaying { last_delay_ms: 120 };
        assert!(err.message().contains("120 ms"));

        let err = SessionError::engine("socket closed");
        assert_eq!(err.message(), "Engine error: socket closed");
    }

    #[test]
    fn test_error_line_names_component_and_context() {
        let err = SessionError::NotPlaying { last_delay_ms: 40 };
        let line = session_error_line(&err, "DelayController", "increase_delay");
        assert!(line.contains("in increase_delay"));
        assert!(line.contains("code=3002"));
        assert!(line.contains("component=DelayController"));
        assert!(!line.contains("ControlService"));
    }

    #[test]
    fn test_rejections_are_distinguished_from_failures() {
        assert!(SessionError::invalid_input("empty").is_rejection());
        assert!(SessionError::NotPlaying { last_delay_ms: 0 }.is_rejection());
        assert!(!SessionError::engine("socket closed").is_rejection());
        assert!(!SessionError::ServiceUnavailable.is_rejection());
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::ServiceUnavailable;
        let display = format!("{}", err);
        assert!(display.contains("SessionError"));
        assert!(display.contains("3005"));
    }
}
