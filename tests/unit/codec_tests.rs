//! Unit tests for the NDJSON codec over the agent stdio stream.
//!
//! Covers:
//! - single newline-terminated message decodes without the delimiter
//! - batched messages decode as separate items
//! - partial delivery is buffered until the newline arrives
//! - lines over the 1 MiB cap fail with "line too long"
//! - encoding appends the `\n` delimiter

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use acp_proxy::acp::codec::{NdjsonCodec, MAX_LINE_BYTES};
use acp_proxy::AppError;

// ── Single message ────────────────────────────────────────────────────────────

/// A complete JSON object on a single newline-terminated line is decoded
/// without error and returned without the trailing `\n`.
#[test]
fn single_message_decodes_without_delimiter() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("{\"jsonrpc\":\"2.0\",\"method\":\"session/update\"}\n");

    let result = codec
        .decode(&mut buf)
        .expect("decode must succeed for a valid NDJSON line");

    assert_eq!(
        result,
        Some("{\"jsonrpc\":\"2.0\",\"method\":\"session/update\"}".to_owned()),
        "codec must return the line content without the trailing newline"
    );
}

// ── Batched messages ──────────────────────────────────────────────────────────

/// Two JSON objects delivered in one buffer decode as two items.
#[test]
fn batched_messages_decode_separately() {
    let mut codec = NdjsonCodec::new();
    let raw = concat!(
        "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n",
        "{\"jsonrpc\":\"2.0\",\"method\":\"session/update\",\"params\":{}}\n",
    );
    let mut buf = BytesMut::from(raw);

    assert!(codec.decode(&mut buf).expect("first decode").is_some());
    assert!(codec.decode(&mut buf).expect("second decode").is_some());
    assert!(
        codec.decode(&mut buf).expect("empty decode").is_none(),
        "no further lines must be present"
    );
}

// ── Partial delivery ──────────────────────────────────────────────────────────

/// A fragment without its terminating `\n` is withheld; the complete line
/// is yielded once the newline arrives.
#[test]
fn partial_line_is_buffered_until_newline() {
    let mut codec = NdjsonCodec::new();

    let mut buf = BytesMut::from("{\"jsonrpc\":\"2.0\"");
    assert!(
        codec.decode(&mut buf).expect("partial decode").is_none(),
        "partial line must not be emitted before the newline arrives"
    );

    buf.extend_from_slice(b",\"id\":1}\n");
    assert!(
        codec.decode(&mut buf).expect("complete decode").is_some(),
        "complete line must be emitted after the newline arrives"
    );
}

// ── Oversized lines ───────────────────────────────────────────────────────────

/// A line exceeding `MAX_LINE_BYTES` fails with `AppError::Acp("line too
/// long …")` instead of allocating unbounded memory.
#[test]
fn oversized_line_fails_decode() {
    let mut codec = NdjsonCodec::new();
    let big_line = "a".repeat(MAX_LINE_BYTES + 1) + "\n";
    let mut buf = BytesMut::from(big_line.as_str());

    match codec.decode(&mut buf) {
        Err(AppError::Acp(msg)) => assert!(
            msg.contains("line too long"),
            "error must mention 'line too long', got: {msg}"
        ),
        other => panic!("expected Err(AppError::Acp(\"line too long …\")), got: {other:?}"),
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encoding a message appends exactly one `\n` delimiter.
#[test]
fn encode_appends_newline() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::new();

    codec
        .encode("{\"jsonrpc\":\"2.0\",\"id\":1}".to_owned(), &mut buf)
        .expect("encode must succeed");

    assert_eq!(&buf[..], b"{\"jsonrpc\":\"2.0\",\"id\":1}\n");
}
