//! Turns an [`Outcome`], a bind failure or a routing failure into the HTTP response.
//!
//! Successful calls answer the raw json value of the result. Everything else answers an
//! [`Envelope`]:
//!
//! | case                | status          | msg                       | data              |
//! |---------------------|-----------------|---------------------------|-------------------|
//! | panic               | 500             | `service method panicked` | `{panic, stack}`  |
//! | application error   | explicit or 500 | `service method error`    | the error message |
//! | bind failure        | 400             | `parse argument failed`   | the bind error    |
//!
//! Every response carries `X-Content-Type-Options: nosniff` and `Content-Type: application/json`.

use crate::body::ResponseBody;
use crate::context::ResponseState;
use crate::error::BindError;
use crate::invoke::Outcome;
use bytes::{BufMut, Bytes, BytesMut};
use http::header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use serde::Serialize;
use tracing::error;

pub const MSG_PANICKED: &str = "service method panicked";
pub const MSG_ERROR: &str = "service method error";
pub const MSG_PARSE_ARGUMENT: &str = "parse argument failed";
pub const MSG_ROUTE_NOT_FOUND: &str = "route not found";
pub const MSG_METHOD_NOT_ALLOWED: &str = "method not allowed";

/// The json wrapper of every failed call.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub msg: &'static str,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(status: StatusCode, msg: &'static str, data: T) -> Self {
        Self { code: status.as_u16(), msg, data }
    }

    fn encode(&self) -> Bytes {
        match serde_json::to_vec(self) {
            Ok(encoded) => Bytes::from(encoded),
            Err(e) => {
                error!(msg = self.msg, "encode response envelope failed: {e}");
                Bytes::new()
            }
        }
    }
}

/// A rendered response together with the json payload it carries, `None` when no payload was
/// written.
#[derive(Debug)]
pub(crate) struct Rendered {
    pub(crate) response: Response<ResponseBody>,
    pub(crate) payload: Option<Bytes>,
}

/// Render the outcome of a call with what the service method wrote through its context.
pub(crate) fn render_outcome(outcome: Outcome, state: ResponseState) -> Rendered {
    let ResponseState { status, headers, body } = state;

    match outcome {
        Outcome::Value(value) => {
            let status = status.unwrap_or(StatusCode::OK);
            Rendered { response: build(status, headers, body, Some(&value), true), payload: Some(value) }
        }
        Outcome::NoValue => {
            let status = status.unwrap_or(StatusCode::OK);
            Rendered { response: build(status, headers, body, None, false), payload: None }
        }
        Outcome::Error(message) => {
            let status = status.filter(|status| *status != StatusCode::OK).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let envelope = Envelope::new(status, MSG_ERROR, message).encode();
            Rendered { response: build(status, headers, body, Some(&envelope), true), payload: Some(envelope) }
        }
        Outcome::Panic(stack) => {
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            let envelope = Envelope::new(status, MSG_PANICKED, stack).encode();
            Rendered { response: build(status, headers, body, Some(&envelope), true), payload: Some(envelope) }
        }
    }
}

pub(crate) fn render_bind_failure(error: &BindError) -> Response<ResponseBody> {
    let status = StatusCode::BAD_REQUEST;
    let envelope = Envelope::new(status, MSG_PARSE_ARGUMENT, error.to_string()).encode();
    build(status, HeaderMap::new(), BytesMut::new(), Some(&envelope), true)
}

/// Answer a request no route could serve, `data` is the request path.
pub(crate) fn render_route_failure(status: StatusCode, msg: &'static str, path: &str, headers: HeaderMap) -> Response<ResponseBody> {
    let envelope = Envelope::new(status, msg, path).encode();
    build(status, headers, BytesMut::new(), Some(&envelope), true)
}

/// `raw` is what the method wrote through the body writer, it precedes the json payload.
fn build(
    status: StatusCode,
    mut headers: HeaderMap,
    mut raw: BytesMut,
    payload: Option<&Bytes>,
    force_content_type: bool,
) -> Response<ResponseBody> {
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    if force_content_type || !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    if let Some(payload) = payload {
        raw.reserve(payload.len() + 1);
        raw.put_slice(payload);
        raw.put_u8(b'\n');
    }

    let mut response = Response::new(ResponseBody::once(raw.freeze()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
