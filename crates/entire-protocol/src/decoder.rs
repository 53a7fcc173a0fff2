//! The `AgentDecoder` collaborator interface and its explicit registry.
//!
//! Each supported coding agent writes its own native transcript format to
//! disk. `entire-core` never parses those formats directly; it asks the
//! registry for the decoder matching a session's `AgentKind` and talks to
//! the transcript only through this trait. Concrete decoders for specific
//! agents are an external concern — this crate ships the trait, the
//! registry, and one reference decoder used to exercise the engine in
//! tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

/// One line of a native transcript, kept as an opaque JSON value except for
/// the identifier fields the checkpoint engine needs to locate turn
/// boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptLine {
    pub raw: serde_json::Value,
    pub uuid: Option<String>,
    pub parent_uuid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript(pub Vec<TranscriptLine>);

impl Transcript {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to read transcript at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed transcript line {line_number} in {path}: {source}")]
    Parse {
        path: String,
        line_number: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Which agent produced a session's native transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Reference decoder, grounded in the Claude Code JSONL shape; used by
    /// default and by every test in this workspace.
    Generic,
}

/// The collaborator interface to one agent's native transcript format.
///
/// Scoping by identifier (`find_checkpoint_uuid`) rather than by byte or
/// line offset is the interface's only hard requirement: offsets are not
/// stable across an agent rewriting its own transcript file, but a
/// message's own `uuid` is.
pub trait AgentDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Parse a native transcript file into its line sequence.
    fn read_session(&self, path: &Path) -> Result<Transcript, DecodeError>;

    /// Serialize a (possibly truncated) line sequence back to the native
    /// format, overwriting `path`.
    fn write_session(&self, path: &Path, transcript: &Transcript) -> Result<(), DecodeError>;

    /// Drop every line from `uuid` onward (inclusive), returning the
    /// remaining prefix. A transcript with no line matching `uuid` is
    /// returned unchanged.
    fn truncate_at_uuid(&self, transcript: Transcript, uuid: &str) -> Transcript {
        let cut = transcript.0.iter().position(|l| l.uuid.as_deref() == Some(uuid));
        match cut {
            Some(idx) => Transcript(transcript.0[..idx].to_vec()),
            None => transcript,
        }
    }

    /// Find the `uuid` of the last line at or before `offset`, the anchor a
    /// checkpoint's metadata records so later rewinds can truncate back to
    /// exactly this point even if the file has grown since.
    fn find_checkpoint_uuid(&self, transcript: &Transcript, offset: usize) -> Option<String> {
        transcript.0[..offset.min(transcript.0.len())]
            .iter()
            .rev()
            .find_map(|l| l.uuid.clone())
    }

    /// Best-effort set of file paths the transcript's tool calls touched,
    /// scanned from each line's raw JSON rather than a dedicated field,
    /// since the native format carries no structured summary of this.
    /// Used to decide whether a mid-turn commit overlaps an active turn's
    /// in-progress edits before any shadow snapshot exists to diff against.
    fn modified_files(&self, transcript: &Transcript) -> Vec<String> {
        let mut files = Vec::new();
        for line in &transcript.0 {
            let path = line
                .raw
                .get("toolUseResult")
                .and_then(|v| v.get("filePath"))
                .and_then(|v| v.as_str())
                .or_else(|| {
                    line.raw
                        .get("tool_input")
                        .and_then(|v| v.get("file_path"))
                        .and_then(|v| v.as_str())
                });
            if let Some(path) = path {
                if !files.iter().any(|f: &String| f == path) {
                    files.push(path.to_string());
                }
            }
        }
        files
    }
}

/// Explicit table of every decoder this build supports, indexed by
/// [`AgentKind`]. Looked up once per hook invocation; never mutated after
/// construction.
struct DecoderRegistry {
    decoders: HashMap<AgentKind, Box<dyn AgentDecoder>>,
}

impl DecoderRegistry {
    fn new() -> Self {
        let mut decoders: HashMap<AgentKind, Box<dyn AgentDecoder>> = HashMap::new();
        decoders.insert(
            AgentKind::Generic,
            Box::new(crate::generic_decoder::GenericDecoder),
        );
        Self { decoders }
    }
}

static REGISTRY: LazyLock<DecoderRegistry> = LazyLock::new(DecoderRegistry::new);

pub fn get_decoder(kind: AgentKind) -> &'static dyn AgentDecoder {
    REGISTRY
        .decoders
        .get(&kind)
        .expect("every AgentKind variant must have a registered decoder")
        .as_ref()
}
