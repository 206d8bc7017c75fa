//! Control-plane proxy: the long-lived owner of the playback session.
//!
//! [`ControlService`] spawns the single-writer [`actor`] on a dedicated
//! thread and outlives any UI. UIs come and go through [`ProxyHandle`]s
//! obtained from [`ControlService::attach`]; detaching never touches the
//! session or the delay state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::runtime::Builder;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::AppConfig;
use crate::engine::{DelayChannel, EngineAdapter};
use crate::error::{log_session_error, SessionError};
use crate::managers::{
    display_stream, ChannelObserver, DelayController, DelayObserver, DisplayPoller, DisplayUpdate,
    SessionManager,
};

mod actor;

use actor::{Command, ControlActor};

/// Start/stop trigger delivered by the hosting environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleCommand {
    Play { address: String },
    Stop,
}

/// Point-in-time view of the control state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub playing: bool,
    pub address: Option<String>,
    pub delay_ms: i64,
    pub delay_fixed: bool,
    /// Value the engine itself reports; diagnostics only.
    pub engine_delay_ms: Option<i64>,
    pub attached: bool,
    pub dropped_reports: u64,
}

/// Lifecycle event published by the control actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Milliseconds since the service was created
    pub timestamp_ms: u64,
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEventKind {
    Started { address: String },
    Stopped,
    EngineFailed { details: String },
    DelayPinned { delay_ms: i64 },
    DelayUnpinned,
}

/// Cloneable sender side shared by the service and every proxy handle.
#[derive(Clone)]
struct ControlClient {
    commands: mpsc::UnboundedSender<Command>,
    playing: Arc<AtomicBool>,
}

impl ControlClient {
    fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .map_err(|_| SessionError::ServiceUnavailable)?;
        reply_rx
            .blocking_recv()
            .map_err(|_| SessionError::ServiceUnavailable)
    }

    fn play(&self, address: &str) -> Result<(), SessionError> {
        let address = address.to_string();
        self.request(|reply| Command::Play { address, reply })?
    }

    fn stop(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Stop { reply })?
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn delay_ms(&self) -> Result<i64, SessionError> {
        self.request(|reply| Command::GetDelay { reply })
    }

    fn increase_delay(&self) -> Result<i64, SessionError> {
        self.request(|reply| Command::IncreaseDelay { reply })?
    }

    fn decrease_delay(&self) -> Result<i64, SessionError> {
        self.request(|reply| Command::DecreaseDelay { reply })?
    }

    fn is_delay_fixed(&self) -> Result<bool, SessionError> {
        self.request(|reply| Command::IsDelayFixed { reply })
    }

    fn fix_delay_at(&self, delay_ms: i64) -> Result<(), SessionError> {
        self.request(|reply| Command::FixDelayAt { delay_ms, reply })?
    }

    fn unfix_delay(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::UnfixDelay { reply })
    }

    fn status(&self) -> Result<SessionStatus, SessionError> {
        self.request(|reply| Command::Status { reply })
    }
}

/// Process-lifetime owner of the session, delay state, and poller.
///
/// All calls are synchronous and must not be made from inside an async
/// runtime or from an observer callback. `play`/`stop` may block briefly on
/// engine handle creation or teardown. Dropping the service stops a playing
/// session and releases its engine handle exactly once.
pub struct ControlService {
    client: ControlClient,
    events: broadcast::Sender<SessionEvent>,
    next_attachment: AtomicU64,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    config: AppConfig,
}

impl ControlService {
    /// Spawn the control actor with the given engine adapter.
    ///
    /// # Errors
    /// - `InvalidInput` if the configuration fails validation
    /// - `ServiceUnavailable` if the actor runtime or thread cannot be created
    pub fn new(config: AppConfig, engine: Arc<dyn EngineAdapter>) -> Result<Self, SessionError> {
        config.validate().map_err(|err| {
            log_session_error(&err, "ControlService", "new");
            err
        })?;

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| {
                log::error!("[ControlService] Failed to build actor runtime: {}", err);
                SessionError::ServiceUnavailable
            })?;

        let (delay_channel, reports) = DelayChannel::bounded(config.engine.notification_capacity);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (events, _) = broadcast::channel(64);
        let playing = Arc::new(AtomicBool::new(false));

        let actor = ControlActor::new(
            SessionManager::new(engine, delay_channel),
            DelayController::new(&config.control),
            DisplayPoller::new(Duration::from_millis(config.control.poll_interval_ms)),
            Arc::clone(&playing),
            events.clone(),
        );

        let worker = std::thread::Builder::new()
            .name("stream-audio-control".to_string())
            .spawn(move || runtime.block_on(actor.run(command_rx, reports, shutdown_rx)))
            .map_err(|err| {
                log::error!("[ControlService] Failed to spawn actor thread: {}", err);
                SessionError::ServiceUnavailable
            })?;

        log::info!(
            "[ControlService] Ready (poll={}ms, step={}ms)",
            config.control.poll_interval_ms,
            config.control.delay_step_ms
        );

        Ok(Self {
            client: ControlClient {
                commands: command_tx,
                playing,
            },
            events,
            next_attachment: AtomicU64::new(1),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            worker: Mutex::new(Some(worker)),
            config,
        })
    }

    /// Attach an observer and get a handle to the control operations.
    ///
    /// Never waits on the actor: the attachment is queued and takes effect
    /// in order with later commands. Replaces any previous attachment.
    pub fn attach(&self, observer: impl DelayObserver) -> ProxyHandle {
        let id = self.next_attachment.fetch_add(1, Ordering::SeqCst);
        let sent = self.client.commands.send(Command::Attach {
            id,
            observer: Box::new(observer),
        });
        if sent.is_err() {
            log::warn!("[ControlService] Attach {} after shutdown", id);
        }
        ProxyHandle {
            id,
            client: self.client.clone(),
            detached: AtomicBool::new(false),
        }
    }

    /// Attach a channel-backed observer and return its display stream.
    pub fn attach_stream(&self) -> (ProxyHandle, impl Stream<Item = DisplayUpdate> + Unpin) {
        let (observer, rx) = ChannelObserver::new();
        (self.attach(observer), display_stream(rx))
    }

    /// Detach a handle; see [`ProxyHandle::detach`].
    pub fn detach(&self, handle: &ProxyHandle) {
        handle.detach();
    }

    /// Dispatch a start/stop trigger from the hosting environment.
    pub fn handle_command(&self, command: LifecycleCommand) -> Result<(), SessionError> {
        log::info!("[ControlService] Lifecycle command {:?}", command);
        match command {
            LifecycleCommand::Play { address } => self.client.play(&address),
            LifecycleCommand::Stop => self.client.stop(),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.client.is_playing()
    }

    pub fn status(&self) -> Result<SessionStatus, SessionError> {
        self.client.status()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Stop the actor, stopping any playing session first.
    ///
    /// Idempotent; also run on drop.
    pub fn shutdown(&self) {
        let shutdown_tx = self.shutdown_tx.lock().ok().and_then(|mut slot| slot.take());
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(());
        }

        let worker = self.worker.lock().ok().and_then(|mut slot| slot.take());
        if let Some(worker) = worker {
            if worker.join().is_err() {
                log::error!("[ControlService] Actor thread panicked");
            }
        }
    }
}

impl Drop for ControlService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A UI's borrowed access to the control operations.
///
/// Every call except `is_playing` blocks on the control actor. Never call
/// them from a [`DelayObserver`] callback: the callback runs on the actor
/// itself, and the blocking wait panics its runtime.
///
/// Outlives nothing: when the service is gone every call fails with
/// `ServiceUnavailable` (or, for the delay steps, returns the fallback
/// value). Dropping the handle detaches it without waiting.
pub struct ProxyHandle {
    id: u64,
    client: ControlClient,
    detached: AtomicBool,
}

impl ProxyHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn play(&self, address: &str) -> Result<(), SessionError> {
        self.client.play(address)
    }

    pub fn stop(&self) -> Result<(), SessionError> {
        self.client.stop()
    }

    pub fn is_playing(&self) -> bool {
        self.client.is_playing()
    }

    pub fn get_delay_ms(&self) -> Result<i64, SessionError> {
        self.client.delay_ms()
    }

    /// Step the delay up; while stopped this is a no-op returning the
    /// last-known delay.
    pub fn increase_delay(&self) -> Result<i64, SessionError> {
        Self::last_known_on_stopped(self.client.increase_delay())
    }

    /// Step the delay down; while stopped this is a no-op returning the
    /// last-known delay.
    pub fn decrease_delay(&self) -> Result<i64, SessionError> {
        Self::last_known_on_stopped(self.client.decrease_delay())
    }

    pub fn is_delay_fixed(&self) -> Result<bool, SessionError> {
        self.client.is_delay_fixed()
    }

    pub fn fix_delay_at(&self, delay_ms: i64) -> Result<(), SessionError> {
        self.client.fix_delay_at(delay_ms)
    }

    pub fn unfix_delay(&self) -> Result<(), SessionError> {
        self.client.unfix_delay()
    }

    pub fn status(&self) -> Result<SessionStatus, SessionError> {
        self.client.status()
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    /// Detach this handle's observer and cancel its poller.
    ///
    /// Waits for the actor, so no observer callback fires after this
    /// returns. Calling it again is a no-op.
    pub fn detach(&self) {
        if self.detached.swap(true, Ordering::SeqCst) {
            return;
        }
        let id = self.id;
        if let Err(err) = self.client.request(|reply| Command::Detach { id, reply }) {
            log::debug!("[ProxyHandle] Detach {} skipped: {}", id, err);
        }
    }

    fn last_known_on_stopped(result: Result<i64, SessionError>) -> Result<i64, SessionError> {
        match result {
            Err(SessionError::NotPlaying { last_delay_ms }) => {
                log::debug!(
                    "[ProxyHandle] Delay step while stopped; keeping {} ms",
                    last_delay_ms
                );
                Ok(last_delay_ms)
            }
            other => other,
        }
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        if self.detached.swap(true, Ordering::SeqCst) {
            return;
        }
        let (reply, _) = oneshot::channel();
        let _ = self.client.commands.send(Command::Detach { id: self.id, reply });
    }
}
