// DisplayPoller: periodic delay refresh for the attached observer
//
// Owned by the control actor and driven from its select loop, so a tick
// can never run concurrently with a state transition or a detach.

use std::time::Duration;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Receives display updates for one attachment.
///
/// Callbacks run on the control actor thread. Implementations should hand
/// the value to their own UI context and return quickly; they must not call
/// back into the proxy synchronously.
pub trait DelayObserver: Send + 'static {
    fn on_delay_ms(&self, delay_ms: i64);

    fn on_playing_changed(&self, _playing: bool) {}
}

/// Display update delivered through a [`ChannelObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayUpdate {
    Delay { delay_ms: i64 },
    Playing { playing: bool },
}

/// Observer forwarding every update into an unbounded channel.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<DisplayUpdate>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DisplayUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DelayObserver for ChannelObserver {
    fn on_delay_ms(&self, delay_ms: i64) {
        let _ = self.tx.send(DisplayUpdate::Delay { delay_ms });
    }

    fn on_playing_changed(&self, playing: bool) {
        let _ = self.tx.send(DisplayUpdate::Playing { playing });
    }
}

/// Wrap a display receiver as an async stream.
pub fn display_stream(
    rx: mpsc::UnboundedReceiver<DisplayUpdate>,
) -> impl Stream<Item = DisplayUpdate> + Unpin {
    UnboundedReceiverStream::new(rx)
}

/// Cancellable periodic ticker; at most one is active at a time.
pub struct DisplayPoller {
    period: Duration,
    ticker: Option<Interval>,
}

impl DisplayPoller {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            ticker: None,
        }
    }

    /// Start ticking, replacing any running ticker.
    ///
    /// The first tick fires immediately. Must be called inside the actor's
    /// runtime.
    pub fn start(&mut self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        if self.ticker.replace(ticker).is_some() {
            log::debug!("[Poller] Restarted; previous ticker cancelled");
        } else {
            log::debug!("[Poller] Started with period {:?}", self.period);
        }
    }

    pub fn cancel(&mut self) {
        if self.ticker.take().is_some() {
            log::debug!("[Poller] Cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Resolve on the next tick; pends forever while cancelled.
    pub async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_first_tick_is_immediate() {
        let mut poller = DisplayPoller::new(Duration::from_secs(60));
        assert_eq!(poller.period(), Duration::from_secs(60));
        poller.start();
        let started = Instant::now();
        poller.tick().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cancelled_poller_never_ticks() {
        let mut poller = DisplayPoller::new(Duration::from_millis(5));
        poller.start();
        poller.cancel();
        assert!(!poller.is_active());

        let result = tokio::time::timeout(Duration::from_millis(50), poller.tick()).await;
        assert!(result.is_err(), "cancelled poller must not tick");
    }

    #[tokio::test]
    async fn test_restart_keeps_single_ticker() {
        let mut poller = DisplayPoller::new(Duration::from_millis(20));
        poller.start();
        poller.start();
        assert!(poller.is_active());
        poller.tick().await;
        poller.cancel();
        assert!(!poller.is_active());
    }

    #[test]
    fn test_channel_observer_forwards_updates() {
        let (observer, mut rx) = ChannelObserver::new();
        observer.on_playing_changed(true);
        observer.on_delay_ms(75);

        assert_eq!(
            rx.try_recv().unwrap(),
            DisplayUpdate::Playing { playing: true }
        );
        assert_eq!(rx.try_recv().unwrap(), DisplayUpdate::Delay { delay_ms: 75 });
    }

    #[test]
    fn test_display_update_json_shape() {
        let json = serde_json::to_string(&DisplayUpdate::Delay { delay_ms: 40 }).unwrap();
        assert_eq!(json, r#"{"type":"delay","delay_ms":40}"#);
    }
}
