use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::SessionError;

use super::{DelayNotifier, EngineAdapter, EngineHandle, EngineOpenContext};

/// Desktop stub engine used for deterministic testing and CLI tooling.
///
/// Simulates handle lifecycle and delay feedback without any network or
/// audio I/O. Addresses must parse as socket addresses, as they would for a
/// real receiver.
pub struct StubEngine {
    next_handle: AtomicU64,
    sessions: Mutex<HashMap<EngineHandle, StubSession>>,
    open_count: AtomicUsize,
    close_count: AtomicUsize,
    fail_open: Mutex<Option<String>>,
    fail_close: Mutex<Option<String>>,
}

struct StubSession {
    address: SocketAddr,
    notifier: DelayNotifier,
    last_delay_ms: i64,
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
            open_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
            fail_open: Mutex::new(None),
            fail_close: Mutex::new(None),
        }
    }

    /// Make the next `open` fail with the given details.
    pub fn fail_next_open(&self, details: impl Into<String>) {
        if let Ok(mut slot) = self.fail_open.lock() {
            *slot = Some(details.into());
        }
    }

    /// Make the next `close` fail with the given details.
    ///
    /// The handle is still released; only the result reports failure.
    pub fn fail_next_close(&self, details: impl Into<String>) {
        if let Ok(mut slot) = self.fail_close.lock() {
            *slot = Some(details.into());
        }
    }

    /// Simulate the engine reporting a new delay on every active session.
    ///
    /// Returns the number of reports successfully enqueued.
    pub fn emit_delay(&self, delay_ms: i64) -> usize {
        let Ok(mut sessions) = self.sessions.lock() else {
            return 0;
        };
        sessions
            .values_mut()
            .filter_map(|session| {
                session.last_delay_ms = delay_ms;
                session.notifier.notify(delay_ms).then_some(())
            })
            .count()
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Address the given handle was opened with.
    pub fn address_of(&self, handle: EngineHandle) -> Option<SocketAddr> {
        self.sessions
            .lock()
            .ok()
            .and_then(|s| s.get(&handle).map(|session| session.address))
    }

    fn take_failure(slot: &Mutex<Option<String>>) -> Option<String> {
        slot.lock().ok().and_then(|mut guard| guard.take())
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineAdapter for StubEngine {
    fn open(&self, ctx: EngineOpenContext) -> Result<EngineHandle, SessionError> {
        if let Some(details) = Self::take_failure(&self.fail_open) {
            return Err(SessionError::engine(details));
        }

        let address: SocketAddr = ctx.address.trim().parse().map_err(|err| {
            SessionError::engine(format!("cannot parse address {:?}: {}", ctx.address, err))
        })?;

        let handle = EngineHandle::from_raw(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let session = StubSession {
            address,
            notifier: ctx.delay_channel.notifier(handle),
            last_delay_ms: 0,
        };

        self.sessions
            .lock()
            .map_err(|_| SessionError::LockPoisoned {
                component: "stub_engine".to_string(),
            })?
            .insert(handle, session);
        self.open_count.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }

    fn close(&self, handle: EngineHandle) -> Result<(), SessionError> {
        let removed = self
            .sessions
            .lock()
            .map_err(|_| SessionError::LockPoisoned {
                component: "stub_engine".to_string(),
            })?
            .remove(&handle);

        if removed.is_none() {
            return Err(SessionError::engine(format!("{} is not open", handle)));
        }
        self.close_count.fetch_add(1, Ordering::SeqCst);

        match Self::take_failure(&self.fail_close) {
            Some(details) => Err(SessionError::engine(details)),
            None => Ok(()),
        }
    }

    fn is_active(&self, handle: EngineHandle) -> bool {
        self.sessions
            .lock()
            .map(|s| s.contains_key(&handle))
            .unwrap_or(false)
    }

    fn current_delay_ms(&self, handle: EngineHandle) -> i64 {
        self.sessions
            .lock()
            .ok()
            .and_then(|s| s.get(&handle).map(|session| session.last_delay_ms))
            .unwrap_or(0)
    }
}
