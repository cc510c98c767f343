//! # GuildPilot Core
//!
//! Domain types, traits, and error definitions for the GuildPilot
//! orchestration engine. This crate has **zero framework dependencies**; it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is defined as a trait here: the generative provider,
//! the operation handlers, and the chat surface. Implementations live
//! elsewhere, which keeps stub implementations trivial in tests.

pub mod error;
pub mod event;
pub mod message;
pub mod operation;
pub mod platform;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{Error, OperationError, PlatformError, ProviderError, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationEntry, Part, Role};
pub use operation::{
    ContextGuard, ContextSlot, Operation, OperationCall, OperationContext, OperationRegistry,
};
pub use platform::{Attachment, ChatSurface, HistoryMessage, OriginMessage, PostedMessage};
pub use provider::{
    GenerateRequest, GenerateResponse, OperationDefinition, Provider, ResponseFormat,
};
