//! Stable grouping hashes for error events
//!
//! The fingerprint covers the classification fields and the top stack
//! frames only. Messages, ids, timestamps, line numbers and addresses change
//! from run to run without pointing at a different root cause, so they are
//! left out.

use crate::event::ErrorEvent;
use once_cell::sync::Lazy;
use regex::Regex;
use ring::digest::{digest, SHA256};

/// Stack frames that contribute to a fingerprint
pub const MAX_FRAMES: usize = 3;

const SEPARATOR: &str = "|";

/// Leading dotted (Go-style) or path-qualified (Rust-style) function name
static FUNC_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_./]+(?:\.|::)[A-Za-z0-9_:]*[A-Za-z0-9_])")
        .expect("function name pattern is valid")
});

static OFFSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+0x[0-9a-fA-F]+").expect("offset pattern is valid"));

static ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"0x[0-9a-fA-F]+").expect("address pattern is valid"));

/// Numbered backtrace prefix, e.g. `  12: `
static FRAME_INDEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+:\s*").expect("frame index pattern is valid"));

/// Compiler-appended symbol hash, e.g. `::h0123456789abcdef`
static SYMBOL_HASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"::h[0-9a-f]{16}$").expect("symbol hash pattern is valid"));

/// Compute the 32-character lowercase hex fingerprint of an event.
pub fn fingerprint(event: &ErrorEvent) -> String {
    let mut parts: Vec<&str> = vec![
        event.error_type.as_str(),
        event.operation.as_str(),
        event.agent_name.as_str(),
        event.tool_name.as_str(),
    ];

    let frames = normalize_stack_trace(&event.stack_trace);
    parts.extend(frames.iter().map(String::as_str));

    let input = parts.join(SEPARATOR);
    let hash = digest(&SHA256, input.as_bytes());
    hex::encode(&hash.as_ref()[..16])
}

/// Extract up to [`MAX_FRAMES`] bare function names from a stack trace.
///
/// Header lines (`goroutine N [...]`, `stack backtrace:`) and source location
/// lines (absolute paths, `at <path>`) are skipped. Remaining lines lose
/// addresses, offsets and call arguments before the leading function name is
/// taken.
pub fn normalize_stack_trace(trace: &str) -> Vec<String> {
    let mut frames = Vec::new();
    if trace.is_empty() {
        return frames;
    }

    for line in trace.lines() {
        let line = line.trim();
        if line.is_empty() || is_header(line) || is_location(line) {
            continue;
        }

        let line = FRAME_INDEX.replace(line, "");
        let line = OFFSET.replace_all(&line, "");
        let line = ADDRESS.replace_all(&line, "");
        let mut line = line.trim().trim_start_matches('-').trim();

        if let Some(idx) = line.find('(') {
            if idx > 0 {
                line = &line[..idx];
            }
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(name) = FUNC_NAME.captures(line).and_then(|c| c.get(1)) {
            let name = SYMBOL_HASH.replace(name.as_str(), "");
            frames.push(name.trim_end_matches(':').to_string());
            if frames.len() >= MAX_FRAMES {
                break;
            }
        }
    }

    frames
}

fn is_header(line: &str) -> bool {
    line.starts_with("goroutine ")
        || line.starts_with("stack backtrace")
        || line.starts_with("note:")
}

fn is_location(line: &str) -> bool {
    line.starts_with('/')
        || line.starts_with("at ")
        || line.starts_with("./")
        || line.get(1..3) == Some(":\\")
}
