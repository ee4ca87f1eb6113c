//! The per-call engine: session state, the orchestrator state machine
//! that drives a live call, the registry of active sessions, and the
//! observer relay.
//!
//! Concurrency model: one orchestrator task per call owns all mutation
//! of its session ("single writer"). HTTP handlers, the media socket,
//! recognition callbacks, and timers communicate with it exclusively by
//! enqueueing [`SessionEvent`]s.

pub mod orchestrator;
pub mod registry;
pub mod relay;
pub mod session;

pub use orchestrator::{
    AudioKind, EngineDeps, GenerationKind, Orchestrator, SessionEvent, TimerKind,
};
pub use registry::{start_purge_task, SessionRegistry, TERMINAL_GRACE};
pub use relay::ObserverRelay;
pub use session::{Session, SessionFlags, SessionState};
