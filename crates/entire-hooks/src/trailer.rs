//! Reading and writing the `Entire-Checkpoint` trailer in a commit message
//! file, per the RFC-5322-style trailer block Git itself expects in the
//! last paragraph of a message.

use std::path::Path;

pub const CHECKPOINT_TRAILER_KEY: &str = "Entire-Checkpoint";

/// Find an existing `Entire-Checkpoint: <value>` trailer line, if any.
pub fn find_trailer(message: &str, key: &str) -> Option<String> {
    let prefix = format!("{key}:");
    message
        .lines()
        .rev()
        .take_while(|l| !l.trim().is_empty())
        .find_map(|line| line.strip_prefix(&prefix).map(|v| v.trim().to_string()))
}

/// Append a trailer to the message's last paragraph, inserting a blank
/// line first if the message doesn't already end in a trailer block.
/// Strips any comment lines Git appended (`# Please enter...`) before
/// deciding where the message body ends.
pub fn append_trailer(message: &str, key: &str, value: &str) -> String {
    let body_end = message
        .find("\n# ")
        .map(|i| i + 1)
        .unwrap_or(message.len());
    let (body, rest) = message.split_at(body_end);
    let trimmed = body.trim_end_matches('\n');

    let last_para_is_trailers = trimmed
        .rsplit("\n\n")
        .next()
        .map(|para| para.lines().all(|l| l.contains(':') && !l.trim().is_empty()))
        .unwrap_or(false);

    let mut out = String::new();
    out.push_str(trimmed);
    if !last_para_is_trailers {
        out.push_str("\n\n");
    } else {
        out.push('\n');
    }
    out.push_str(key);
    out.push_str(": ");
    out.push_str(value);
    out.push('\n');
    out.push_str(rest);
    out
}

pub fn read(path: &Path) -> std::io::Result<String> {
    std::fs::read_to_string(path)
}

pub fn write(path: &Path, message: &str) -> std::io::Result<()> {
    std::fs::write(path, message)
}
