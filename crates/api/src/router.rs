//! Route registry: maps `(method, pattern)` pairs to service handlers.
//!
//! ```no_run
//! use micro_api::router::{get, post};
//! use micro_api::{service_fn, MethodContext, Router};
//! use std::convert::Infallible;
//!
//! #[derive(serde::Serialize, serde::Deserialize, Default)]
//! struct GetUser {
//!     id: u64,
//! }
//!
//! async fn get_user(_ctx: MethodContext, arg: GetUser) -> Result<Option<u64>, Infallible> {
//!     Ok(Some(arg.id))
//! }
//!
//! let router = Router::builder()
//!     .route(get("/users/{id}", service_fn(get_user)))
//!     .route(post("/users/{id}/raw", service_fn(get_user)).bypass_request_body())
//!     .build()
//!     .unwrap();
//! ```

use crate::binder::Binder;
use crate::body::{OptionReqBody, ResponseBody};
use crate::config::BinderConfig;
use crate::error::{BoxError, HandlerError, RouterBuildError};
use crate::handler::{HandlerOptions, IntoRequestHandler, RequestHandler};
use crate::logger::MethodLogger;
use crate::request::{PathParams, RequestContext};
use crate::responder::{render_route_failure, MSG_METHOD_NOT_ALLOWED, MSG_ROUTE_NOT_FOUND};
use bytes::Bytes;
use http::header::ALLOW;
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use http_body::Body as HttpBody;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tracing::{debug, error};

type InnerRouter<T> = matchit::Router<T>;

pub struct Router {
    inner_router: InnerRouter<Vec<RouterItem>>,
}

/// A handler registered under one method of a pattern.
pub struct RouterItem {
    method: Method,
    handler: Box<dyn RequestHandler>,
}

/// Result of matching a path, the items of every method registered under the pattern.
pub struct RouteResult<'router, 'req> {
    router_items: &'router [RouterItem],
    params: PathParams<'router, 'req>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Match `path` against the registered patterns, empty when nothing matches.
    pub fn at<'router, 'req>(&'router self, path: &'req str) -> RouteResult<'router, 'req> {
        self.inner_router
            .at(path)
            .map(|matched| RouteResult { router_items: matched.value.as_slice(), params: matched.params.into() })
            .map_err(|e| debug!("match '{}' error: {}", path, e))
            .unwrap_or(RouteResult::empty())
    }

    /// Dispatch a request to the handler of its method and pattern.
    ///
    /// Unknown paths answer `404`, known paths without a handler for the method answer `405`
    /// with an `Allow` header.
    pub async fn handle<B>(&self, request: Request<B>) -> Result<Response<ResponseBody>, HandlerError>
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path();
        let route_result = self.at(path);

        if route_result.is_empty() {
            return Ok(render_route_failure(StatusCode::NOT_FOUND, MSG_ROUTE_NOT_FOUND, path, HeaderMap::new()));
        }

        let Some(item) = route_result.router_items().iter().find(|item| item.method == parts.method) else {
            let allow = route_result.router_items().iter().map(|item| item.method.as_str()).collect::<Vec<_>>().join(", ");
            let mut headers = HeaderMap::new();
            match HeaderValue::from_str(&allow) {
                Ok(value) => {
                    headers.insert(ALLOW, value);
                }
                Err(e) => error!(allow = %allow, "invalid allow header: {e}"),
            }
            return Ok(render_route_failure(StatusCode::METHOD_NOT_ALLOWED, MSG_METHOD_NOT_ALLOWED, path, headers));
        };

        let req = RequestContext::new(&parts, route_result.params());
        item.handler().invoke(&req, OptionReqBody::new(body)).await
    }
}

impl Debug for Router {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").finish_non_exhaustive()
    }
}

impl Debug for RouterItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterItem").field("method", &self.method).finish_non_exhaustive()
    }
}

impl Debug for RouteResult<'_, '_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteResult").field("router_items", &self.router_items).field("params", &self.params).finish()
    }
}

impl RouterItem {
    /// The http method this item answers.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The handler serving this item's method.
    pub fn handler(&self) -> &dyn RequestHandler {
        self.handler.as_ref()
    }
}

impl<'router, 'req> RouteResult<'router, 'req> {
    fn empty() -> Self {
        Self { router_items: &[], params: PathParams::empty() }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.router_items.is_empty()
    }

    /// Path params captured by the matched pattern, still percent-encoded.
    pub fn params(&self) -> &PathParams<'router, 'req> {
        &self.params
    }

    /// Every item registered under the matched pattern, one per method.
    pub fn router_items(&self) -> &'router [RouterItem] {
        self.router_items
    }
}

/// One registration: a method, a pattern like `/users/{id}` and the service method serving it.
pub struct Route {
    method: Method,
    path: String,
    handler: Box<dyn IntoRequestHandler>,
    bypass_request_body: bool,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>, handler: impl IntoRequestHandler) -> Self {
        Self { method, path: path.into(), handler: Box::new(handler), bypass_request_body: false }
    }

    /// Leave the request body to the service method: no form or json source is read while
    /// binding, the method gets the raw body through its context.
    #[must_use]
    pub fn bypass_request_body(mut self) -> Self {
        self.bypass_request_body = true;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Debug for Route {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("bypass_request_body", &self.bypass_request_body)
            .finish_non_exhaustive()
    }
}

macro_rules! method_route {
    ($method:ident, $http_method:ident) => {
        pub fn $method(path: impl Into<String>, handler: impl IntoRequestHandler) -> Route {
            Route::new(Method::$http_method, path, handler)
        }
    };
}

method_route!(get, GET);
method_route!(post, POST);
method_route!(put, PUT);
method_route!(delete, DELETE);
method_route!(head, HEAD);
method_route!(options, OPTIONS);
method_route!(patch, PATCH);

pub struct RouterBuilder {
    routes: Vec<Route>,
    binder_config: BinderConfig,
    method_logger: Option<Arc<dyn MethodLogger>>,
}

impl Debug for RouterBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("routes", &self.routes)
            .field("binder_config", &self.binder_config)
            .finish_non_exhaustive()
    }
}

impl RouterBuilder {
    fn new() -> Self {
        Self { routes: vec![], binder_config: BinderConfig::default(), method_logger: None }
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn routes(mut self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.routes.extend(routes);
        self
    }

    pub fn binder_config(mut self, binder_config: BinderConfig) -> Self {
        self.binder_config = binder_config;
        self
    }

    /// Report every call that reached a service method to `method_logger`.
    pub fn method_logger(mut self, method_logger: Arc<dyn MethodLogger>) -> Self {
        self.method_logger = Some(method_logger);
        self
    }

    /// Validate every service method and build the router.
    pub fn build(self) -> Result<Router, RouterBuildError> {
        let binder = Arc::new(Binder::new(self.binder_config));
        let mut data: HashMap<String, Vec<RouterItem>> = HashMap::new();

        for route in self.routes {
            let Route { method, path, handler, bypass_request_body } = route;
            let items = data.entry(path.clone()).or_default();
            if items.iter().any(|item| item.method == method) {
                return Err(RouterBuildError::Duplicate { method, path });
            }

            let options = HandlerOptions::new(Arc::clone(&binder))
                .with_bypass_request_body(bypass_request_body)
                .with_method_logger(self.method_logger.clone());
            let handler = match handler.into_request_handler(options) {
                Ok(handler) => handler,
                Err(source) => return Err(RouterBuildError::Signature { method, path, source }),
            };
            items.push(RouterItem { method, handler });
        }

        let mut inner_router = InnerRouter::new();
        for (path, items) in data {
            inner_router.insert(path.clone(), items).map_err(|source| RouterBuildError::Insert { path, source })?;
        }

        Ok(Router { inner_router })
    }
}
