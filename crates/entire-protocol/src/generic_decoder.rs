//! Reference `AgentDecoder` implementation, grounded in the JSONL shape
//! Claude Code writes: one JSON object per line, each carrying its own
//! `uuid` and the `uuid` of the line it replies to.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::decoder::{AgentDecoder, DecodeError, Transcript, TranscriptLine};

pub struct GenericDecoder;

impl AgentDecoder for GenericDecoder {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn read_session(&self, path: &Path) -> Result<Transcript, DecodeError> {
        let file = std::fs::File::open(path).map_err(|source| DecodeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let reader = BufReader::new(file);
        let mut lines = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| DecodeError::Io {
                path: path.display().to_string(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let raw: serde_json::Value =
                serde_json::from_str(&line).map_err(|source| DecodeError::Parse {
                    path: path.display().to_string(),
                    line_number: idx + 1,
                    source,
                })?;
            let uuid = raw.get("uuid").and_then(|v| v.as_str()).map(str::to_string);
            let parent_uuid = raw
                .get("parentUuid")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            lines.push(TranscriptLine { raw, uuid, parent_uuid });
        }

        Ok(Transcript(lines))
    }

    fn write_session(&self, path: &Path, transcript: &Transcript) -> Result<(), DecodeError> {
        let temp_path = path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&temp_path).map_err(|source| DecodeError::Io {
                path: temp_path.display().to_string(),
                source,
            })?;
            for line in &transcript.0 {
                let serialized =
                    serde_json::to_string(&line.raw).expect("Value serialization cannot fail");
                writeln!(file, "{serialized}").map_err(|source| DecodeError::Io {
                    path: temp_path.display().to_string(),
                    source,
                })?;
            }
        }
        std::fs::rename(&temp_path, path).map_err(|source| DecodeError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_fixture(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("transcript.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"{{"uuid":"a","parentUuid":null,"type":"user"}}"#).unwrap();
        writeln!(file, r#"{{"uuid":"b","parentUuid":"a","type":"assistant"}}"#).unwrap();
        writeln!(file, r#"{{"uuid":"c","parentUuid":"b","type":"user"}}"#).unwrap();
        path
    }

    #[test]
    fn reads_jsonl_lines_with_uuid_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());

        let decoder = GenericDecoder;
        let transcript = decoder.read_session(&path).unwrap();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.0[1].uuid.as_deref(), Some("b"));
        assert_eq!(transcript.0[1].parent_uuid.as_deref(), Some("a"));
    }

    #[test]
    fn skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        std::fs::write(&path, "\n\n{\"uuid\":\"a\"}\n\n").unwrap();

        let decoder = GenericDecoder;
        let transcript = decoder.read_session(&path).unwrap();
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());
        let decoder = GenericDecoder;

        let transcript = decoder.read_session(&path).unwrap();
        let truncated = decoder.truncate_at_uuid(transcript, "c");
        decoder.write_session(&path, &truncated).unwrap();

        let reread = decoder.read_session(&path).unwrap();
        assert_eq!(reread.len(), 2);
        assert_eq!(reread.0.last().unwrap().uuid.as_deref(), Some("b"));
    }

    #[test]
    fn malformed_line_reports_its_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        std::fs::write(&path, "{\"uuid\":\"a\"}\nnot json\n").unwrap();

        let decoder = GenericDecoder;
        let err = decoder.read_session(&path).unwrap_err();
        match err {
            DecodeError::Parse { line_number, .. } => assert_eq!(line_number, 2),
            other => panic!("expected Parse error, got {other:?}"),
        }
    }
}
