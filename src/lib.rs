//! GameScout - interactive game-resource resolution engine
//!
//! This crate turns a free-text game query into a dispatched bundle of
//! download resources. A search against the standalone catalog yields
//! candidates; an ambiguous result opens a timed selection session, and
//! the chosen candidate is resolved against the standalone and
//! shared-session providers concurrently. A single registry actor owns
//! all session state.

pub mod actors;
pub mod config;
pub mod dispatch;
pub mod fetch;
pub mod providers;
pub mod resolver;
pub mod title;
pub mod translate;
pub mod types;

pub use config::EngineConfig;
pub use resolver::ResourceResolver;
pub use types::{Candidate, CoopItem, ResourceBundle, StandaloneLine};
