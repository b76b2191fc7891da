//! Core logic for tiletalk: topic-scoped voice conversations backed by a
//! hosted chat-completion API.
//!
//! The crate is split along the seams a presentation layer cares about:
//! the conversation store (sessions and transcripts), the completion client
//! (one HTTP call per reply), the speech bridge (capture and playback as
//! cancellable async operations), and the session controller that
//! orchestrates all three and publishes its state for rendering.

pub mod completion;
pub mod controller;
pub mod conversation;
pub mod speech;

pub use completion::{CompletionApi, CompletionClient, CompletionError};
pub use controller::{
    ControllerError, ControllerState, Phase, SessionController, SessionSummary,
};
pub use conversation::{ChatTurn, Conversation, ConversationBoard, Role, Turn};
pub use speech::{CaptureOutcome, PlaybackOutcome, SpeechBridge, SpeechError};
