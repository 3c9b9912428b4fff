use crate::error::{BodyError, BoxError};
use bytes::{Bytes, BytesMut};
use http_body::Body as HttpBody;
use http_body::{Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use std::convert::Infallible;
use std::fmt::{Debug, Formatter};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::Mutex;

/// The type-erased inbound body.
pub type ReqBody = UnsyncBoxBody<Bytes, BoxError>;

/// A shared handle to the request body which can be consumed only once.
///
/// The binder and the service method see the same handle, so a method on a
/// route that bypasses body parsing still gets the untouched stream.
#[derive(Clone)]
pub struct OptionReqBody {
    inner: Arc<Mutex<Option<ReqBody>>>,
}

impl OptionReqBody {
    pub fn new<B>(body: B) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        OptionReqBody { inner: Arc::new(Mutex::new(Some(body.map_err(Into::into).boxed_unsync()))) }
    }

    pub fn empty() -> Self {
        OptionReqBody { inner: Arc::new(Mutex::new(None)) }
    }

    pub async fn can_consume(&self) -> bool {
        let guard = self.inner.lock().await;
        guard.is_some()
    }

    pub async fn take(&self) -> Option<ReqBody> {
        let mut guard = self.inner.lock().await;
        guard.take()
    }

    pub(crate) async fn replace(&self, bytes: Bytes) {
        let mut guard = self.inner.lock().await;
        *guard = Some(Full::new(bytes).map_err(Into::into).boxed_unsync());
    }

    pub async fn apply<T, F, Fut>(&self, f: F) -> Result<T, BodyError>
    where
        F: FnOnce(ReqBody) -> Fut,
        Fut: Future<Output = Result<T, BodyError>>,
    {
        let req_body = self.take().await.ok_or(BodyError::Consumed)?;
        f(req_body).await
    }

    /// Collect the whole body, failing once more than `limit` bytes arrive.
    pub async fn bytes(&self, limit: usize) -> Result<Bytes, BodyError> {
        let req_body = self.take().await.ok_or(BodyError::Consumed)?;
        collect_limited(req_body, limit).await
    }
}

async fn collect_limited(mut body: ReqBody, limit: usize) -> Result<Bytes, BodyError> {
    let mut buf = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|source| BodyError::Read { source })?;
        let Ok(data) = frame.into_data() else {
            continue;
        };

        if buf.len() + data.len() > limit {
            return Err(BodyError::TooLarge { limit });
        }
        buf.extend_from_slice(&data);
    }
    Ok(buf.freeze())
}

impl Debug for OptionReqBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionReqBody").finish_non_exhaustive()
    }
}

/// The outbound body. Service method responses are always fully buffered.
#[derive(Debug)]
pub struct ResponseBody {
    inner: Option<Bytes>,
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self { inner: None }
    }

    pub fn once(bytes: Bytes) -> Self {
        if bytes.is_empty() { Self::empty() } else { Self { inner: Some(bytes) } }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::once(bytes)
    }
}

impl HttpBody for ResponseBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(self.get_mut().inner.take().map(|bytes| Ok(Frame::data(bytes))))
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            None => SizeHint::with_exact(0),
            Some(bytes) => SizeHint::with_exact(bytes.len() as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::body::{OptionReqBody, ResponseBody};
    use crate::error::BodyError;
    use bytes::Bytes;
    use http_body::{Body as HttpBody, Frame};
    use http_body_util::{BodyExt, Full};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    fn check_send<T: Send>() {}

    #[test]
    fn is_send() {
        check_send::<ResponseBody>();
        check_send::<OptionReqBody>();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_once_body() {
        let mut body = ResponseBody::from(Bytes::from("Hello world"));

        assert_eq!(body.size_hint().exact(), Some(11));
        assert!(!body.is_end_stream());

        let bytes = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(bytes, Bytes::from("Hello world"));

        assert!(body.is_end_stream());
        assert!(body.frame().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_empty_body() {
        let mut body = ResponseBody::from(Bytes::new());

        assert!(body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(0));
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn test_req_body_consumed_once() {
        let body = OptionReqBody::new(Full::new(Bytes::from("abc")));
        assert!(body.can_consume().await);

        let bytes = body.bytes(1024).await.unwrap();
        assert_eq!(bytes, Bytes::from("abc"));

        assert!(!body.can_consume().await);
        assert!(matches!(body.bytes(1024).await, Err(BodyError::Consumed)));
    }

    #[tokio::test]
    async fn test_req_body_replaced() {
        let body = OptionReqBody::new(Full::new(Bytes::from("abc")));
        let bytes = body.bytes(1024).await.unwrap();
        body.replace(bytes).await;

        assert_eq!(body.bytes(1024).await.unwrap(), Bytes::from("abc"));
    }

    #[tokio::test]
    async fn test_req_body_at_limit() {
        let body = OptionReqBody::new(Full::new(Bytes::from("0123")));
        assert_eq!(body.bytes(4).await.unwrap(), Bytes::from("0123"));
    }

    #[tokio::test]
    async fn test_req_body_read_error() {
        let body = OptionReqBody::new(FailingBody);
        assert!(matches!(body.bytes(1024).await, Err(BodyError::Read { .. })));
    }

    struct FailingBody;

    impl HttpBody for FailingBody {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
            Poll::Ready(Some(Err(std::io::Error::other("connection reset"))))
        }
    }

    #[tokio::test]
    async fn test_req_body_too_large() {
        let body = OptionReqBody::new(Full::new(Bytes::from("0123456789")));
        assert!(matches!(body.bytes(4).await, Err(BodyError::TooLarge { limit: 4 })));
    }
}
