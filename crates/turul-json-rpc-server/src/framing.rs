//! Isolating one JSON value from the front of a byte stream.
//!
//! There is no length prefix or delimiter on the wire: a message ends where
//! its JSON value is structurally complete. A parser error that occurs at
//! the end of the buffered bytes means more input is needed; an error
//! anywhere before that means the stream is malformed.

use serde_json::{Deserializer, Value};
use thiserror::Error;

/// Nesting depth accepted by default, counting every array and object level
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 2048;

/// Result of inspecting the buffered bytes
#[derive(Debug)]
pub enum Frame {
    /// A complete value; `consumed` covers it and any whitespace before it
    Message { value: Value, consumed: usize },
    /// Only whitespace is buffered; discard `consumed` bytes
    Blank { consumed: usize },
    /// The buffered bytes are a valid prefix of a larger value
    Incomplete,
    /// The bytes can never become an acceptable JSON value
    Malformed(MalformedFrame),
}

#[derive(Debug, Error)]
pub enum MalformedFrame {
    #[error("{0}")]
    Syntax(#[source] serde_json::Error),

    #[error("value nested deeper than {limit} levels")]
    TooDeep { limit: usize },
}

/// Try to frame one value starting at offset 0 of `buffered`.
///
/// Bytes after the first value (a pipelined follow-up request) are left
/// untouched for the next call. Values nested deeper than `max_depth`
/// are malformed; the parser's own recursion limit is lifted so that
/// `max_depth` is the only bound.
pub fn next_frame(buffered: &[u8], max_depth: usize) -> Frame {
    if exceeds_depth(buffered, max_depth) {
        return Frame::Malformed(MalformedFrame::TooDeep { limit: max_depth });
    }

    let mut de = Deserializer::from_slice(buffered);
    de.disable_recursion_limit();
    let mut stream = de.into_iter::<Value>();
    match stream.next() {
        None => Frame::Blank {
            consumed: stream.byte_offset(),
        },
        Some(Ok(value)) => Frame::Message {
            value,
            consumed: stream.byte_offset(),
        },
        Some(Err(err)) if err.is_eof() => Frame::Incomplete,
        Some(Err(err)) => Frame::Malformed(MalformedFrame::Syntax(err)),
    }
}

/// Scan the first buffered value for array/object nesting beyond `limit`.
///
/// Stops at the end of the first container or top-level string, and at the
/// start of any other top-level scalar, since those cannot nest.
fn exceeds_depth(buffered: &[u8], limit: usize) -> bool {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for &byte in buffered {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
                if depth == 0 {
                    return false;
                }
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                if depth > limit {
                    return true;
                }
            }
            b']' | b'}' => {
                if depth <= 1 {
                    return false;
                }
                depth -= 1;
            }
            b' ' | b'\t' | b'\n' | b'\r' => {}
            _ if depth == 0 => return false,
            _ => {}
        }
    }
    false
}
