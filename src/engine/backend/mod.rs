//! Native engine adapter contract.
//!
//! The decode/transport engine is reached only through an opaque
//! [`EngineHandle`] and the small operation set on [`EngineAdapter`].
//! Delay changes flow back as [`DelayReport`]s over a bounded channel
//! owned by the control actor.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::SessionError;

/// Opaque reference to one native decode/transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineHandle(u64);

impl EngineHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// Delay-changed notification emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayReport {
    pub handle: EngineHandle,
    pub delay_ms: i64,
}

/// Receiving side of the bounded report channel, owned by the control actor.
pub type DelayReportReceiver = mpsc::Receiver<DelayReport>;

/// Producer half of the bounded report channel.
///
/// Cloned into every [`EngineOpenContext`]; the engine turns it into a
/// handle-bound [`DelayNotifier`] once it knows its handle.
#[derive(Clone)]
pub struct DelayChannel {
    tx: mpsc::Sender<DelayReport>,
    dropped: Arc<AtomicU64>,
}

impl DelayChannel {
    /// Create a channel holding at most `capacity` undelivered reports.
    pub fn bounded(capacity: usize) -> (Self, DelayReportReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    pub fn notifier(&self, handle: EngineHandle) -> DelayNotifier {
        DelayNotifier {
            handle,
            tx: self.tx.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// Reports discarded because the channel was full or closed.
    pub fn dropped_reports(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Handle-bound sender the engine calls from its own thread.
#[derive(Clone)]
pub struct DelayNotifier {
    handle: EngineHandle,
    tx: mpsc::Sender<DelayReport>,
    dropped: Arc<AtomicU64>,
}

impl DelayNotifier {
    /// Enqueue a delay report without blocking the engine thread.
    ///
    /// Returns `false` when the report was dropped.
    pub fn notify(&self, delay_ms: i64) -> bool {
        let report = DelayReport {
            handle: self.handle,
            delay_ms,
        };
        match self.tx.try_send(report) {
            Ok(()) => true,
            Err(err) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("[Engine] Dropped delay report for {}: {}", self.handle, err);
                false
            }
        }
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle
    }
}

/// Everything an adapter needs to open a session.
pub struct EngineOpenContext {
    pub address: String,
    pub delay_channel: DelayChannel,
}

/// Trait implemented by native engine adapters.
///
/// `open`/`close` may block briefly on handle creation and teardown; the
/// remaining calls must be cheap. The adapter owns no control logic.
pub trait EngineAdapter: Send + Sync {
    fn open(&self, ctx: EngineOpenContext) -> Result<EngineHandle, SessionError>;
    fn close(&self, handle: EngineHandle) -> Result<(), SessionError>;
    fn is_active(&self, handle: EngineHandle) -> bool;
    fn current_delay_ms(&self, handle: EngineHandle) -> i64;
}

mod desktop_stub;
pub use desktop_stub::StubEngine;
