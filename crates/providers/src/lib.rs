//! Provider decorators for GuildPilot.
//!
//! Everything here implements `guildpilot_core::Provider`. Concrete model
//! backends live outside the workspace and are wrapped by these at startup.

pub mod retry;
pub mod scripted;

pub use retry::{RetryPolicy, RetryingProvider};
pub use scripted::{Script, ScriptStep, ScriptedProvider};
