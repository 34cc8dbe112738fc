use axum::body::Body;
use bytes::Bytes;
use serde_json::{Map, Value};

use graphgate_common::QueryRequest;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to read request body: {0}")]
    Read(#[source] axum::Error),
    #[error("request body is not a valid query request: {0}")]
    Json(#[from] serde_json::Error),
}

/// Collect at most `limit` bytes of body. Exceeding the limit is a read error.
pub async fn read_body(body: Body, limit: usize) -> Result<Bytes, DecodeError> {
    axum::body::to_bytes(body, limit)
        .await
        .map_err(DecodeError::Read)
}

/// Parse a UTF-8 JSON body into a [`QueryRequest`].
///
/// Invalid UTF-8, malformed JSON, a non-object top level, or fields of the
/// wrong type all fail here so nothing partially populated reaches the
/// orchestrator.
pub fn decode_request(body: &[u8]) -> Result<QueryRequest, DecodeError> {
    // Derived struct impls also accept sequences; only an object is a request.
    let object: Map<String, Value> = serde_json::from_slice(body)?;
    Ok(serde_json::from_value(Value::Object(object))?)
}
