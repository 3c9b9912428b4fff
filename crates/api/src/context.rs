//! The per request handle given to every service method.

use crate::body::{OptionReqBody, ReqBody};
use crate::error::BodyError;
use crate::request::RequestContext;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use std::fmt::{Debug, Formatter};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Gives a service method access to the request it serves and to the response it produces.
///
/// Cloning is cheap, all clones share the same request and response state, so the context
/// can be moved into spawned tasks.
#[derive(Clone)]
pub struct MethodContext {
    inner: Arc<Inner>,
}

struct Inner {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    cancellation_token: CancellationToken,
    body: OptionReqBody,
    response: Mutex<ResponseState>,
}

/// What a service method wrote through the context, consumed when the response is built.
#[derive(Debug, Default)]
pub(crate) struct ResponseState {
    pub(crate) status: Option<StatusCode>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: BytesMut,
}

impl MethodContext {
    /// Take the cancellation token and the peer address from the request extensions, a new
    /// token is created when the transport provides none.
    pub(crate) fn new(req: &RequestContext<'_, '_>, body: OptionReqBody) -> Self {
        let cancellation_token = req.extensions().get::<CancellationToken>().cloned().unwrap_or_default();
        let remote_addr = req.extensions().get::<SocketAddr>().copied();

        Self {
            inner: Arc::new(Inner {
                method: req.method().clone(),
                uri: req.uri().clone(),
                headers: req.headers().clone(),
                remote_addr,
                cancellation_token,
                body,
                response: Mutex::new(ResponseState::default()),
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        let (parts, ()) = http::Request::new(()).into_parts();
        let params = crate::request::PathParams::empty();
        Self::new(&RequestContext::new(&parts, &params), OptionReqBody::empty())
    }

    /// Method of the request line.
    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    /// Request uri, query string included.
    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    /// Headers of the incoming request.
    pub fn request_headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    /// Cancelled by the transport once the client goes away.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancellation_token
    }

    /// The raw request body, for routes bypassing body parsing.
    ///
    /// On other routes the bytes the binder buffered are put back, so the body can still be
    /// read once.
    pub fn request_body(&self) -> &OptionReqBody {
        &self.inner.body
    }

    pub async fn take_request_body(&self) -> Option<ReqBody> {
        self.inner.body.take().await
    }

    pub async fn read_request_body(&self, limit: usize) -> Result<Bytes, BodyError> {
        self.inner.body.bytes(limit).await
    }

    /// Set the response status. Only the first call takes effect.
    ///
    /// Without an explicit status a successful call answers `200` and an error answers `500`.
    pub fn set_status(&self, status: StatusCode) {
        let mut response = self.response();
        match response.status {
            None => response.status = Some(status),
            Some(current) => warn!(%current, ignored = %status, "response status has already been set"),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response().status
    }

    /// Insert a response header, replacing any value set before under the same name.
    pub fn insert_response_header(&self, name: HeaderName, value: HeaderValue) {
        self.response().headers.insert(name, value);
    }

    pub fn append_response_header(&self, name: HeaderName, value: HeaderValue) {
        self.response().headers.append(name, value);
    }

    /// A raw writer to the response body, its bytes come before the encoded result.
    pub fn body_writer(&self) -> BodyWriter {
        BodyWriter { ctx: self.clone() }
    }

    pub(crate) fn take_response(&self) -> ResponseState {
        std::mem::take(&mut *self.response())
    }

    fn response(&self) -> MutexGuard<'_, ResponseState> {
        self.inner.response.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Debug for MethodContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodContext")
            .field("method", &self.inner.method)
            .field("uri", &self.inner.uri)
            .field("remote_addr", &self.inner.remote_addr)
            .finish_non_exhaustive()
    }
}

/// Appends raw bytes to the response body of a [`MethodContext`].
#[derive(Debug, Clone)]
pub struct BodyWriter {
    ctx: MethodContext,
}

impl io::Write for BodyWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ctx.response().body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
