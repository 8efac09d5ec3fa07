//! Actor layer: one registry actor serializes all session state.

pub mod session_registry;

pub use session_registry::{
    SessionRegistry, SessionRegistryArgs, SessionRegistryMsg, SessionSnapshot,
};
