//! argus-core: run coordination and live-event distribution
//!
//! One conversation, at most one active run. While a run executes, the
//! engine reports progress through a structured event sink; events fan out
//! over a per-conversation multicast bus to any number of observers, in
//! publish order, with no backlog for late subscribers. The transcript store
//! keeps what survives the run; everything else lives only on the wire.

#![forbid(unsafe_code)]

pub mod auth;
pub mod controller;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod event;
pub mod session;

pub use auth::{AuthError, TokenStore};
pub use controller::{RunController, StartRun};
pub use conversation::{
    Conversation, ConversationStore, ConversationSummary, MemoryConversationStore, MessageRole,
    StoredMessage, ToolCallDecl,
};
pub use engine::{
    BusSink, EchoEngine, Engine, EngineRun, RunSink, ScriptStep, ScriptedEngine, TeeSink,
    TraceSink,
};
pub use error::{Error, Result};
pub use event::{Envelope, RunEvent, ToolData, ToolDataPhase};
pub use session::{ChatSession, SessionRegistry};
