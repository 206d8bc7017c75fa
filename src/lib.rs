// Stream Audio Control Core
// Session state machine and adaptive latency control for a network audio stream

// Module declarations
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod managers;

// Re-exports for convenience
pub use config::AppConfig;
pub use control::{
    ControlService, LifecycleCommand, ProxyHandle, SessionEvent, SessionEventKind, SessionStatus,
};
pub use engine::{EngineAdapter, EngineHandle, StubEngine};
pub use error::{ErrorCode, SessionError};
pub use managers::{ChannelObserver, DelayObserver, DisplayUpdate};

use once_cell::sync::OnceCell;

static LOGGING: OnceCell<()> = OnceCell::new();

/// Install the platform log backend once per process.
///
/// Safe to call repeatedly; later calls are no-ops.
pub fn init_logging() {
    LOGGING.get_or_init(|| {
        install_subscriber();
        log::info!("Logging initialized");
    });
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "android")] {
        fn install_subscriber() {
            use tracing_subscriber::prelude::*;

            match tracing_android::layer("StreamAudio") {
                Ok(layer) => {
                    let _ = tracing_subscriber::registry().with(layer).try_init();
                }
                Err(err) => eprintln!("StreamAudio: failed to init android logging: {err}"),
            }
        }
    } else {
        fn install_subscriber() {
            use tracing_subscriber::EnvFilter;

            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("info,stream_audio=debug")),
                )
                .try_init();
        }
    }
}
