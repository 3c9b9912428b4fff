//! Turn plain async functions into json http endpoints.
//!
//! A service method takes a [`MethodContext`] and one argument, and returns either
//! `Result<(), E>` or `Result<Option<R>, E>`:
//!
//! ```no_run
//! use micro_api::router::post;
//! use micro_api::{service_fn, MethodContext, Router};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Default)]
//! struct CreateUser {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[derive(Serialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! async fn create_user(ctx: MethodContext, arg: CreateUser) -> Result<Option<User>, std::io::Error> {
//!     ctx.set_status(http::StatusCode::CREATED);
//!     Ok(Some(User { id: arg.id, name: arg.name }))
//! }
//!
//! # async fn serve() -> Result<(), Box<dyn std::error::Error>> {
//! let router = Router::builder().route(post("/users/{id}", service_fn(create_user))).build()?;
//!
//! let request = http::Request::post("/users/7?name=zava").body(http_body_util::Empty::<bytes::Bytes>::new())?;
//! let response = router.handle(request).await?;
//! assert_eq!(response.status(), http::StatusCode::CREATED);
//! # Ok(())
//! # }
//! ```
//!
//! The argument is bound from three sources, each overriding the fields named by the one
//! before it: the query string and form body, a json body, then the path parameters. A
//! successful call answers the json form of its result, failures answer an [`Envelope`]
//! with the matching status.

mod binder;
mod body;
mod config;
mod context;
mod error;
mod fn_trait;
mod handler;
mod invoke;
mod logger;
mod request;
mod responder;
mod signature;

pub mod router;

pub use binder::Binder;
pub use body::{OptionReqBody, ReqBody, ResponseBody};
pub use config::BinderConfig;
pub use context::{BodyWriter, MethodContext};
pub use error::{BindError, BodyError, BoxError, DecodeError, HandlerError, RouterBuildError, SignatureError};
pub use fn_trait::ServiceMethod;
pub use handler::{service_fn, HandlerOptions, IntoRequestHandler, RequestHandler, ServiceFn, ServiceHandler};
pub use invoke::{invoke, MethodReturn, Outcome, PanicStack};
pub use logger::{MethodLogRecord, MethodLogger, TracingMethodLogger};
pub use request::{PathParams, RequestContext};
pub use responder::Envelope;
pub use router::{Route, Router, RouterBuilder};
pub use signature::{ArgKind, ArgShape, Argument};
