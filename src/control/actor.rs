//! Single-writer control actor.
//!
//! Every mutation of the session, the delay controller, the poller, and the
//! attachment happens on this actor, one message at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::engine::{DelayReport, DelayReportReceiver};
use crate::error::{log_session_error, SessionError};
use crate::managers::{
    DelayController, DelayObserver, DisplayPoller, PlayOutcome, SessionManager, StopOutcome,
};

use super::{SessionEvent, SessionEventKind, SessionStatus};

type Reply<T> = oneshot::Sender<T>;

pub(crate) enum Command {
    Play {
        address: String,
        reply: Reply<Result<(), SessionError>>,
    },
    Stop {
        reply: Reply<Result<(), SessionError>>,
    },
    GetDelay {
        reply: Reply<i64>,
    },
    IncreaseDelay {
        reply: Reply<Result<i64, SessionError>>,
    },
    DecreaseDelay {
        reply: Reply<Result<i64, SessionError>>,
    },
    IsDelayFixed {
        reply: Reply<bool>,
    },
    FixDelayAt {
        delay_ms: i64,
        reply: Reply<Result<(), SessionError>>,
    },
    UnfixDelay {
        reply: Reply<()>,
    },
    Attach {
        id: u64,
        observer: Box<dyn DelayObserver>,
    },
    Detach {
        id: u64,
        reply: Reply<bool>,
    },
    Status {
        reply: Reply<SessionStatus>,
    },
}

struct Attachment {
    id: u64,
    observer: Box<dyn DelayObserver>,
}

pub(crate) struct ControlActor {
    session: SessionManager,
    delay: DelayController,
    poller: DisplayPoller,
    attachment: Option<Attachment>,
    playing: Arc<AtomicBool>,
    events: broadcast::Sender<SessionEvent>,
    started_at: Instant,
}

impl ControlActor {
    pub(crate) fn new(
        session: SessionManager,
        delay: DelayController,
        poller: DisplayPoller,
        playing: Arc<AtomicBool>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            session,
            delay,
            poller,
            attachment: None,
            playing,
            events,
            started_at: Instant::now(),
        }
    }

    /// Run until shutdown is requested or every command sender is gone.
    ///
    /// Engine reports are polled before commands, so a report enqueued
    /// before a command is always applied first.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut reports: DelayReportReceiver,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        log::info!("[ControlActor] Started");
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                Some(report) = reports.recv() => self.handle_report(report),
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = self.poller.tick() => self.handle_tick(),
            }
        }
        self.teardown();
        log::info!("[ControlActor] Stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Play { address, reply } => {
                let _ = reply.send(self.play(&address));
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.stop());
            }
            Command::GetDelay { reply } => {
                let _ = reply.send(self.delay.delay_ms());
            }
            Command::IncreaseDelay { reply } => {
                let _ = reply.send(self.adjust_delay("increase_delay", DelayController::increase));
            }
            Command::DecreaseDelay { reply } => {
                let _ = reply.send(self.adjust_delay("decrease_delay", DelayController::decrease));
            }
            Command::IsDelayFixed { reply } => {
                let _ = reply.send(self.delay.is_fixed());
            }
            Command::FixDelayAt { delay_ms, reply } => {
                let result = self.delay.fix_at(delay_ms);
                if result.is_ok() {
                    self.emit(SessionEventKind::DelayPinned { delay_ms });
                }
                let _ = reply.send(result);
            }
            Command::UnfixDelay { reply } => {
                if self.delay.is_fixed() {
                    self.delay.unfix();
                    self.emit(SessionEventKind::DelayUnpinned);
                }
                let _ = reply.send(());
            }
            Command::Attach { id, observer } => self.attach(id, observer),
            Command::Detach { id, reply } => {
                let _ = reply.send(self.detach(id));
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn play(&mut self, address: &str) -> Result<(), SessionError> {
        match self.session.play(address) {
            Ok(PlayOutcome::Started(_)) => {
                self.delay.reset();
                self.sync_playing();
                self.emit(SessionEventKind::Started {
                    address: address.trim().to_string(),
                });
                if let Some(attachment) = &self.attachment {
                    attachment.observer.on_playing_changed(true);
                    self.poller.start();
                }
                Ok(())
            }
            Ok(PlayOutcome::AlreadyPlaying) => Ok(()),
            Err(err) => {
                if let SessionError::EngineError { details } = &err {
                    self.emit(SessionEventKind::EngineFailed {
                        details: details.clone(),
                    });
                }
                Err(err)
            }
        }
    }

    fn stop(&mut self) -> Result<(), SessionError> {
        let was_playing = self.session.is_playing();
        let result = self.session.stop();

        if was_playing {
            self.poller.cancel();
            self.delay.release_pin();
            self.sync_playing();
            self.emit(SessionEventKind::Stopped);
            if let Some(attachment) = &self.attachment {
                attachment.observer.on_playing_changed(false);
            }
        }

        match result {
            Ok(StopOutcome::Stopped) | Ok(StopOutcome::AlreadyStopped) => Ok(()),
            Err(err) => {
                if let SessionError::EngineError { details } = &err {
                    self.emit(SessionEventKind::EngineFailed {
                        details: details.clone(),
                    });
                }
                Err(err)
            }
        }
    }

    fn adjust_delay(
        &mut self,
        context: &str,
        step: fn(&mut DelayController) -> i64,
    ) -> Result<i64, SessionError> {
        if !self.session.is_playing() {
            let err = SessionError::NotPlaying {
                last_delay_ms: self.delay.delay_ms(),
            };
            log_session_error(&err, "DelayController", context);
            return Err(err);
        }
        let delay_ms = step(&mut self.delay);
        self.emit(SessionEventKind::DelayPinned { delay_ms });
        Ok(delay_ms)
    }

    fn handle_report(&mut self, report: DelayReport) {
        if self.session.handle() != Some(report.handle) {
            log::debug!(
                "[ControlActor] Discarding stale report from {} ({} ms)",
                report.handle,
                report.delay_ms
            );
            return;
        }
        if self.delay.apply_engine_report(report.delay_ms) {
            tracing::trace!(delay_ms = report.delay_ms, "engine delay applied");
        }
    }

    fn handle_tick(&mut self) {
        if !self.session.is_playing() {
            self.poller.cancel();
            return;
        }
        match &self.attachment {
            Some(attachment) => attachment.observer.on_delay_ms(self.delay.delay_ms()),
            None => self.poller.cancel(),
        }
    }

    fn attach(&mut self, id: u64, observer: Box<dyn DelayObserver>) {
        if let Some(previous) = self.attachment.take() {
            log::info!("[ControlActor] Attachment {} replaced by {}", previous.id, id);
        }
        self.poller.cancel();

        let playing = self.session.is_playing();
        observer.on_playing_changed(playing);
        self.attachment = Some(Attachment { id, observer });
        if playing {
            self.poller.start();
        }
        log::info!("[ControlActor] Observer {} attached (playing={})", id, playing);
    }

    fn detach(&mut self, id: u64) -> bool {
        match &self.attachment {
            Some(attachment) if attachment.id == id => {
                self.poller.cancel();
                self.attachment = None;
                log::info!("[ControlActor] Observer {} detached", id);
                true
            }
            _ => false,
        }
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            playing: self.session.is_playing(),
            address: self.session.address().map(str::to_string),
            delay_ms: self.delay.delay_ms(),
            delay_fixed: self.delay.is_fixed(),
            engine_delay_ms: self.session.engine_delay_ms(),
            attached: self.attachment.is_some(),
            dropped_reports: self.session.dropped_reports(),
        }
    }

    fn teardown(&mut self) {
        self.poller.cancel();
        if self.session.is_playing() {
            log::info!("[ControlActor] Stopping session during teardown");
            if let Err(err) = self.stop() {
                log::warn!("[ControlActor] Teardown stop failed: {}", err);
            }
        }
        self.attachment = None;
        self.sync_playing();
    }

    fn sync_playing(&self) {
        self.playing.store(self.session.is_playing(), Ordering::SeqCst);
    }

    fn emit(&self, kind: SessionEventKind) {
        let timestamp_ms = self.started_at.elapsed().as_millis() as u64;
        let _ = self.events.send(SessionEvent { timestamp_ms, kind });
    }
}

impl Drop for ControlActor {
    // Also runs when an observer callback panics the actor thread; the
    // session manager closes its handle on drop, so the mirror must follow.
    fn drop(&mut self) {
        self.playing.store(false, Ordering::SeqCst);
    }
}
