// Managers Module
//
// Focused state holders owned by the control actor. Each handles one concern:
// - SessionManager: Stopped/Playing transitions and the engine handle
// - DelayController: buffering delay tracking and user pinning
// - DisplayPoller: periodic delay refresh for the attached observer

pub mod delay_controller;
pub mod display_poller;
pub mod session_manager;

pub use delay_controller::DelayController;
pub use display_poller::{
    display_stream, ChannelObserver, DelayObserver, DisplayPoller, DisplayUpdate,
};
pub use session_manager::{PlayOutcome, SessionManager, SessionState, StopOutcome};
