//! Per-sensor live sessions.
//!
//! Each displayed sensor gets its own [`SensorSession`]; the [`SessionPool`]
//! keeps exactly one session per visible sensor id.

pub mod machine;
pub mod manager;
pub mod pool;

pub use machine::{
    Connectivity, Phase, RenderSignal, RenderState, SessionEvent, SessionMachine, SessionView,
};
pub use manager::{RenderReporter, SensorSession, SessionSettings};
pub use pool::{PoolChanges, SessionPool};
