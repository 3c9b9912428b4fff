//! Service handlers: the glue between a registered service method and the router.
//!
//! A [`ServiceFn`] is what a route is registered with. When the router is built it is turned
//! into a [`ServiceHandler`], which validates the argument shape once and then, per request,
//! binds the argument, calls the method and renders the outcome.

use crate::binder::Binder;
use crate::body::{OptionReqBody, ResponseBody};
use crate::context::MethodContext;
use crate::error::{HandlerError, SignatureError};
use crate::fn_trait::ServiceMethod;
use crate::invoke::{invoke, Outcome};
use crate::logger::{MethodLogRecord, MethodLogger, FIELD_ARGS};
use crate::request::RequestContext;
use crate::responder::{render_bind_failure, render_outcome, Rendered};
use crate::signature::{ArgShape, Argument};
use async_trait::async_trait;
use chrono::Local;
use http::Response;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info_span, warn, Instrument};

#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn invoke<'server, 'req>(
        &self,
        req: &RequestContext<'server, 'req>,
        req_body: OptionReqBody,
    ) -> Result<Response<ResponseBody>, HandlerError>;
}

/// Settings shared by the handlers of one router.
#[derive(Clone)]
pub struct HandlerOptions {
    binder: Arc<Binder>,
    bypass_request_body: bool,
    logger: Option<Arc<dyn MethodLogger>>,
}

impl HandlerOptions {
    pub fn new(binder: Arc<Binder>) -> Self {
        Self { binder, bypass_request_body: false, logger: None }
    }

    /// Skip every body source while binding, the method reads the body itself.
    #[must_use]
    pub fn with_bypass_request_body(mut self, bypass_request_body: bool) -> Self {
        self.bypass_request_body = bypass_request_body;
        self
    }

    #[must_use]
    pub fn with_method_logger(mut self, logger: Option<Arc<dyn MethodLogger>>) -> Self {
        self.logger = logger;
        self
    }
}

impl Debug for HandlerOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerOptions")
            .field("binder", &self.binder)
            .field("bypass_request_body", &self.bypass_request_body)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

/// Something that can serve a route once the router knows how to configure it.
pub trait IntoRequestHandler: Send + 'static {
    fn into_request_handler(self: Box<Self>, options: HandlerOptions) -> Result<Box<dyn RequestHandler>, SignatureError>;
}

/// A service method waiting to be registered, created by [`service_fn`].
pub struct ServiceFn<F, A> {
    f: F,
    _phantom: PhantomData<fn(A)>,
}

impl<F, A> Debug for ServiceFn<F, A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceFn").field("method", &std::any::type_name::<F>()).finish_non_exhaustive()
    }
}

pub fn service_fn<F, A>(f: F) -> ServiceFn<F, A>
where
    F: ServiceMethod<A>,
    A: Argument,
{
    ServiceFn { f, _phantom: PhantomData }
}

impl<F, A> IntoRequestHandler for ServiceFn<F, A>
where
    F: ServiceMethod<A>,
    A: Argument,
{
    fn into_request_handler(self: Box<Self>, options: HandlerOptions) -> Result<Box<dyn RequestHandler>, SignatureError> {
        let shape = ArgShape::<A>::of()?;
        Ok(Box::new(ServiceHandler { method: self.f, shape, options }))
    }
}

/// A validated service method ready to serve requests.
pub struct ServiceHandler<F, A> {
    method: F,
    shape: ArgShape<A>,
    options: HandlerOptions,
}

impl<F, A> Debug for ServiceHandler<F, A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandler")
            .field("method", &std::any::type_name::<F>())
            .field("kind", &self.shape.kind())
            .field("options", &self.options)
            .finish()
    }
}

impl<F, A> ServiceHandler<F, A>
where
    F: ServiceMethod<A>,
    A: Argument,
{
    async fn serve(&self, req: &RequestContext<'_, '_>, req_body: OptionReqBody) -> Result<Response<ResponseBody>, HandlerError> {
        let binder = &self.options.binder;
        let arg = match binder.bind(&self.shape, req, &req_body, self.options.bypass_request_body).await {
            Ok(arg) => arg,
            Err(e) => {
                warn!(cause = %e, "parse argument failed");
                return Ok(render_bind_failure(&e));
            }
        };

        // the argument is moved into the method, so it is encoded up front
        let args = self.options.logger.as_ref().map(|_| serde_json::to_string(&arg));

        let ctx = MethodContext::new(req, req_body);
        let begin = Local::now();
        let start = Instant::now();
        let outcome = invoke(&self.method, ctx.clone(), arg).await;
        let duration = start.elapsed();

        match &outcome {
            Outcome::Panic(stack) => error!(panic = %stack.panic, stack = %stack.stack, "service method panicked"),
            Outcome::Error(message) => warn!(cause = %message, "service method error"),
            Outcome::Value(value) => debug!(resp = %String::from_utf8_lossy(value), "service method returned"),
            Outcome::NoValue => debug!("service method returned without value"),
        }

        let Rendered { response, payload } = render_outcome(outcome, ctx.take_response());

        if let (Some(logger), Some(args)) = (&self.options.logger, args) {
            let args = args.map_err(|source| HandlerError::AccessLog { field: FIELD_ARGS, source })?;
            let resp = payload.map_or_else(|| "null".to_string(), |payload| String::from_utf8_lossy(&payload).into_owned());
            let path = req.uri().path().to_string();
            logger.record(&MethodLogRecord::new(req.method().clone(), path, args, resp, begin, duration));
        }

        Ok(response)
    }
}

#[async_trait]
impl<F, A> RequestHandler for ServiceHandler<F, A>
where
    F: ServiceMethod<A>,
    A: Argument,
{
    async fn invoke<'server, 'req>(
        &self,
        req: &RequestContext<'server, 'req>,
        req_body: OptionReqBody,
    ) -> Result<Response<ResponseBody>, HandlerError> {
        let span = info_span!("service_method", method = %req.method(), path = req.uri().path());
        self.serve(req, req_body).instrument(span).await
    }
}
