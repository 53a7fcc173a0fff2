//! Wire types and the agent transcript decoder registry shared between the
//! hook binaries and the checkpoint engine.

mod decoder;
mod generic_decoder;
mod hook;

pub use decoder::{get_decoder, AgentDecoder, AgentKind, DecodeError, Transcript, TranscriptLine};
pub use hook::{HookEventName, HookInput};
