//! Engine module housing the native engine adapter contract.
//!
//! The decode/transport engine itself lives outside this crate; `backend`
//! defines the trait it is reached through plus a deterministic desktop stub.

pub mod backend;

pub use backend::{
    DelayChannel, DelayNotifier, DelayReport, DelayReportReceiver, EngineAdapter, EngineHandle,
    EngineOpenContext, StubEngine,
};
