//! Request access for the binder and the service handlers.
//!
//! - `RequestContext`: the request head together with the path parameters of the matched route
//! - `PathParams`: named segments captured by the route pattern

use http::request::Parts;
use http::{Extensions, HeaderMap, Method, Uri, Version};
use matchit::Params;
use mime::Mime;

/// Represents the context of an HTTP request, providing access to both the request head
/// and any path parameters extracted from the URL.
///
/// The lifetime parameters ensure that the request context does not outlive the router
/// or the request data it references.
#[derive(Debug)]
pub struct RequestContext<'server: 'req, 'req> {
    request_head: &'req Parts,
    path_params: &'req PathParams<'server, 'req>,
}

impl<'server, 'req> RequestContext<'server, 'req> {
    pub fn new(request_head: &'req Parts, path_params: &'req PathParams<'server, 'req>) -> Self {
        Self { request_head, path_params }
    }

    pub fn request_head(&self) -> &Parts {
        self.request_head
    }

    pub fn method(&self) -> &Method {
        &self.request_head.method
    }

    pub fn uri(&self) -> &Uri {
        &self.request_head.uri
    }

    pub fn version(&self) -> Version {
        self.request_head.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.request_head.headers
    }

    /// Transport supplied values, e.g. the peer `SocketAddr` or a `CancellationToken`.
    pub fn extensions(&self) -> &Extensions {
        &self.request_head.extensions
    }

    /// The parsed `Content-Type` header, `None` when it is missing or malformed.
    pub fn content_type(&self) -> Option<Mime> {
        self.headers().get(http::header::CONTENT_TYPE)?.to_str().ok()?.parse().ok()
    }

    pub fn path_params(&self) -> &PathParams<'server, 'req> {
        self.path_params
    }
}

/// Represents path parameters extracted from the URL path of an HTTP request.
///
/// For example, in the pattern "/users/{id}", "id" is a path parameter.
#[derive(Debug, Clone)]
pub struct PathParams<'server, 'req> {
    kind: PathParamsKind<'server, 'req>,
}

#[derive(Debug, Clone)]
enum PathParamsKind<'server, 'req> {
    None,
    Params(Params<'server, 'req>),
}

impl<'server, 'req> PathParams<'server, 'req> {
    #[inline]
    fn new(params: Params<'server, 'req>) -> Self {
        if params.is_empty() { Self::empty() } else { Self { kind: PathParamsKind::Params(params) } }
    }

    #[inline]
    pub fn empty() -> Self {
        Self { kind: PathParamsKind::None }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        match &self.kind {
            PathParamsKind::None => true,
            PathParamsKind::Params(params) => params.is_empty(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match &self.kind {
            PathParamsKind::None => 0,
            PathParamsKind::Params(params) => params.len(),
        }
    }

    #[inline]
    pub fn get(&self, key: impl AsRef<str>) -> Option<&'req str> {
        match &self.kind {
            PathParamsKind::Params(params) => params.get(key),
            PathParamsKind::None => None,
        }
    }

    /// Iterate `(name, value)` pairs in pattern order.
    pub fn iter(&self) -> impl Iterator<Item = (&'server str, &'req str)> + '_ {
        let params = match &self.kind {
            PathParamsKind::Params(params) => Some(params.iter()),
            PathParamsKind::None => None,
        };
        params.into_iter().flatten()
    }
}

impl<'server, 'req> From<Params<'server, 'req>> for PathParams<'server, 'req> {
    fn from(params: Params<'server, 'req>) -> Self {
        PathParams::new(params)
    }
}

#[cfg(test)]
mod tests {
    use super::{PathParams, RequestContext};
    use http::Request;

    #[test]
    fn test_path_params() {
        let mut router = matchit::Router::new();
        router.insert("/users/{id}/books/{book}", ()).unwrap();

        let matched = router.at("/users/7/books/rust").unwrap();
        let params = PathParams::from(matched.params);

        assert_eq!(params.len(), 2);
        assert_eq!(params.get("id"), Some("7"));
        assert_eq!(params.get("missing"), None);
        assert_eq!(params.iter().collect::<Vec<_>>(), vec![("id", "7"), ("book", "rust")]);
    }

    #[test]
    fn test_empty_path_params() {
        let params = PathParams::empty();
        assert!(params.is_empty());
        assert_eq!(params.iter().count(), 0);
    }

    #[test]
    fn test_content_type() {
        let (parts, ()) = Request::builder()
            .header(http::header::CONTENT_TYPE, "application/json; charset=utf-8")
            .body(())
            .unwrap()
            .into_parts();
        let params = PathParams::empty();
        let req = RequestContext::new(&parts, &params);

        assert_eq!(req.content_type().unwrap().essence_str(), "application/json");
    }
}
