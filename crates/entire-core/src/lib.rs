//! Session state, line attribution, and the checkpoint engine: the parts
//! of the system that decide what a turn cost and fold it into history.

mod attribution;
mod checkpoint;
mod engine;
mod errors;
mod session;
mod store;

pub use attribution::{attribute_turn, DiffStats, Reconciled};
pub use checkpoint::{condense, load_checkpoint, rewind, Checkpoint, CheckpointSession, CondenseSession, RewindMode};
pub use engine::{Engine, SessionEvent};
pub use errors::{CoreError, CoreResult};
pub use session::{PromptAttribution, Session, SessionPhase};
pub use store::SessionStore;
