// SessionManager: Stopped <-> Playing state machine
//
// Single Responsibility: engine handle lifecycle for one playback session

use std::sync::Arc;

use crate::engine::{DelayChannel, EngineAdapter, EngineHandle, EngineOpenContext};
use crate::error::{log_session_error, SessionError};

/// Playback state; the engine handle only exists while playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Playing {
        address: String,
        handle: EngineHandle,
    },
}

/// Result of a `play` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Started(EngineHandle),
    AlreadyPlaying,
}

/// Result of a `stop` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    AlreadyStopped,
}

/// Owns the single engine handle of the current session.
///
/// `play`/`stop` call into the engine and may block briefly on handle
/// creation or teardown. Dropping a playing manager stops it first, so no
/// handle outlives the session.
pub struct SessionManager {
    engine: Arc<dyn EngineAdapter>,
    delay_channel: DelayChannel,
    state: SessionState,
}

impl SessionManager {
    pub fn new(engine: Arc<dyn EngineAdapter>, delay_channel: DelayChannel) -> Self {
        Self {
            engine,
            delay_channel,
            state: SessionState::Stopped,
        }
    }

    /// Start playing from `address`.
    ///
    /// # Errors
    /// - `InvalidInput` if the address is empty (state stays `Stopped`)
    /// - `EngineError` if the engine could not open a handle (state stays `Stopped`)
    pub fn play(&mut self, address: &str) -> Result<PlayOutcome, SessionError> {
        let address = address.trim();
        if address.is_empty() {
            let err = SessionError::invalid_input("address must not be empty");
            log_session_error(&err, "SessionManager", "play");
            return Err(err);
        }

        if self.is_playing() {
            log::debug!("[Session] play({}) ignored: already playing", address);
            return Ok(PlayOutcome::AlreadyPlaying);
        }

        let ctx = EngineOpenContext {
            address: address.to_string(),
            delay_channel: self.delay_channel.clone(),
        };
        let handle = self.engine.open(ctx).map_err(|err| {
            log_session_error(&err, "SessionManager", "play");
            err
        })?;

        log::info!("[Session] Playing {} on {}", address, handle);
        self.state = SessionState::Playing {
            address: address.to_string(),
            handle,
        };
        Ok(PlayOutcome::Started(handle))
    }

    /// Stop the current session and release its engine handle.
    ///
    /// The handle is considered released even if the engine reports a close
    /// failure; the failure is returned but the state is `Stopped` and the
    /// handle is never closed a second time.
    pub fn stop(&mut self) -> Result<StopOutcome, SessionError> {
        let handle = match std::mem::replace(&mut self.state, SessionState::Stopped) {
            SessionState::Stopped => return Ok(StopOutcome::AlreadyStopped),
            SessionState::Playing { handle, .. } => handle,
        };

        log::info!("[Session] Stopping {}", handle);
        self.engine.close(handle).map_err(|err| {
            log_session_error(&err, "SessionManager", "stop");
            err
        })?;
        Ok(StopOutcome::Stopped)
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, SessionState::Playing { .. })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn address(&self) -> Option<&str> {
        match &self.state {
            SessionState::Playing { address, .. } => Some(address),
            SessionState::Stopped => None,
        }
    }

    pub fn handle(&self) -> Option<EngineHandle> {
        match self.state {
            SessionState::Playing { handle, .. } => Some(handle),
            SessionState::Stopped => None,
        }
    }

    /// Latest delay the engine itself reports (diagnostics only).
    pub fn engine_delay_ms(&self) -> Option<i64> {
        self.handle()
            .filter(|handle| self.engine.is_active(*handle))
            .map(|handle| self.engine.current_delay_ms(handle))
    }

    pub fn dropped_reports(&self) -> u64 {
        self.delay_channel.dropped_reports()
    }

    /// Teardown path: stop if playing, logging instead of propagating.
    pub fn shutdown(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("[Session] Engine close failed during shutdown: {}", err);
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StubEngine;

    fn manager() -> (SessionManager, Arc<StubEngine>) {
        let engine = Arc::new(StubEngine::new());
        let (channel, _rx) = DelayChannel::bounded(8);
        (SessionManager::new(engine.clone(), channel), engine)
    }

    #[test]
    fn test_play_rejects_empty_address() {
        let (mut session, engine) = manager();
        let result = session.play("");
        assert!(matches!(result, Err(SessionError::InvalidInput { .. })));
        assert!(matches!(
            session.play("   "),
            Err(SessionError::InvalidInput { .. })
        ));
        assert_eq!(*session.state(), SessionState::Stopped);
        assert_eq!(engine.open_count(), 0);
    }

    #[test]
    fn test_play_then_stop() {
        let (mut session, engine) = manager();

        let outcome = session.play("10.0.0.5:9000").unwrap();
        let handle = match outcome {
            PlayOutcome::Started(handle) => handle,
            other => panic!("Expected Started, got {:?}", other),
        };
        assert!(session.is_playing());
        assert_eq!(session.handle(), Some(handle));
        assert_eq!(session.address(), Some("10.0.0.5:9000"));

        assert_eq!(session.stop().unwrap(), StopOutcome::Stopped);
        assert!(!session.is_playing());
        assert_eq!(session.handle(), None);
        assert_eq!(engine.close_count(), 1);
    }

    #[test]
    fn test_play_twice_is_noop() {
        let (mut session, engine) = manager();
        session.play("10.0.0.5:9000").unwrap();
        let first = session.state().clone();

        assert_eq!(
            session.play("10.0.0.5:9000").unwrap(),
            PlayOutcome::AlreadyPlaying
        );
        assert_eq!(*session.state(), first);
        assert_eq!(engine.open_count(), 1);
    }

    #[test]
    fn test_stop_twice_is_noop() {
        let (mut session, engine) = manager();
        session.play("10.0.0.5:9000").unwrap();
        session.stop().unwrap();
        assert_eq!(session.stop().unwrap(), StopOutcome::AlreadyStopped);
        assert_eq!(engine.close_count(), 1);
    }

    #[test]
    fn test_open_failure_stays_stopped() {
        let (mut session, engine) = manager();
        engine.fail_next_open("no route to host");

        let result = session.play("10.0.0.5:9000");
        assert!(matches!(result, Err(SessionError::EngineError { .. })));
        assert_eq!(*session.state(), SessionState::Stopped);
        assert_eq!(session.handle(), None);
    }

    #[test]
    fn test_close_failure_still_releases_handle() {
        let (mut session, engine) = manager();
        session.play("10.0.0.5:9000").unwrap();
        engine.fail_next_close("socket already closed");

        assert!(matches!(
            session.stop(),
            Err(SessionError::EngineError { .. })
        ));
        assert!(!session.is_playing());
        assert_eq!(session.stop().unwrap(), StopOutcome::AlreadyStopped);
        assert_eq!(engine.close_count(), 1);
    }

    #[test]
    fn test_drop_releases_handle_once() {
        let (mut session, engine) = manager();
        session.play("10.0.0.5:9000").unwrap();
        drop(session);
        assert_eq!(engine.close_count(), 1);
        assert_eq!(engine.active_count(), 0);
    }

    #[test]
    fn test_drop_after_failed_open_is_noop() {
        let (mut session, engine) = manager();
        engine.fail_next_open("refused");
        let _ = session.play("10.0.0.5:9000");
        drop(session);
        assert_eq!(engine.close_count(), 0);
    }
}
