use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

use graphgate_common::ExecutionResult;

const APPLICATION_JSON: &str = "application/json";
const FALLBACK_BODY: &[u8] = br#"{"data":null,"errors":[{"message":"failed to serialize response"}]}"#;

/// A fully serialised response, written in one piece.
#[derive(Debug, Clone)]
pub struct EncodedResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// `400` when the result carries any error, `200` otherwise.
pub fn status_for(result: &ExecutionResult) -> StatusCode {
    if result.has_errors() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    }
}

pub fn encode_result(result: &ExecutionResult) -> EncodedResponse {
    let status = status_for(result);
    match serde_json::to_vec(&result.to_envelope()) {
        Ok(body) => EncodedResponse {
            status,
            body: Bytes::from(body),
        },
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize execution result");
            EncodedResponse {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: Bytes::from_static(FALLBACK_BODY),
            }
        }
    }
}

impl EncodedResponse {
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl IntoResponse for EncodedResponse {
    fn into_response(self) -> Response {
        let len = self.body.len();
        let mut resp = Response::new(Body::from(self.body));
        *resp.status_mut() = self.status;
        let headers = resp.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        resp
    }
}
