use http::StatusCode;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use micro_api::router::{get, post, put};
use micro_api::{service_fn, BinderConfig, MethodContext, Router, TracingMethodLogger};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::io::Write;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Serialize, Deserialize, Default)]
struct Address {
    city: String,
    zip: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct UserArg {
    id: u64,
    name: String,
    age: u32,
    tags: Vec<String>,
    address: Address,
}

#[derive(Debug, Serialize)]
struct User {
    id: u64,
    name: String,
    age: u32,
    tags: Vec<String>,
    city: String,
}

#[derive(Debug, thiserror::Error)]
enum UserError {
    #[error("user {0} not found")]
    NotFound(u64),
}

async fn get_user(ctx: MethodContext, arg: UserArg) -> Result<Option<User>, UserError> {
    if arg.id == 0 {
        ctx.set_status(StatusCode::NOT_FOUND);
        return Err(UserError::NotFound(arg.id));
    }

    Ok(Some(User { id: arg.id, name: arg.name, age: arg.age, tags: arg.tags, city: arg.address.city }))
}

async fn create_user(ctx: MethodContext, arg: UserArg) -> Result<Option<User>, UserError> {
    ctx.set_status(StatusCode::CREATED);
    Ok(Some(User { id: arg.id, name: arg.name, age: arg.age, tags: arg.tags, city: arg.address.city }))
}

async fn panic_user(_ctx: MethodContext, arg: UserArg) -> Result<(), UserError> {
    if arg.age > 150 {
        panic!("nobody is {} years old", arg.age);
    }
    Ok(())
}

/// Counts the bytes of the raw body, the body is never parsed by the binder.
async fn upload(ctx: MethodContext, arg: HashMap<String, String>) -> Result<(), std::io::Error> {
    let body = ctx.read_request_body(1 << 20).await.map_err(std::io::Error::other)?;
    ctx.insert_response_header(http::header::CONTENT_TYPE, http::HeaderValue::from_static("text/plain"));
    let name = arg.get("name").map_or("unnamed", String::as_str);
    writeln!(ctx.body_writer(), "{name}: {} bytes", body.len())
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let router = Router::builder()
        .binder_config(BinderConfig::default().with_max_body_size(1 << 20))
        .method_logger(Arc::new(TracingMethodLogger))
        .route(get("/users/{id}", service_fn(get_user)))
        .route(post("/users/{id}", service_fn(create_user)))
        .route(put("/panic", service_fn(panic_user)))
        .route(post("/upload", service_fn(upload)).bypass_request_body())
        .build()
        .expect("build router failed");
    let router = Arc::new(router);

    info!(port = 8080, "start listening");
    let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
        Ok(tcp_listener) => tcp_listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    loop {
        let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        let router = Arc::clone(&router);
        let cancellation_token = CancellationToken::new();

        tokio::spawn(async move {
            let guard = cancellation_token.clone().drop_guard();
            let service = hyper::service::service_fn(move |mut request| {
                let router = Arc::clone(&router);
                request.extensions_mut().insert(remote_addr);
                request.extensions_mut().insert(cancellation_token.child_token());
                async move {
                    match router.handle(request).await {
                        Ok(response) => Ok::<_, Infallible>(response),
                        Err(e) => {
                            error!(cause = %e, "handle request failed");
                            let mut response = http::Response::new(micro_api::ResponseBody::empty());
                            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                            Ok(response)
                        }
                    }
                }
            });

            if let Err(e) = http1::Builder::new().serve_connection(TokioIo::new(tcp_stream), service).await {
                error!(cause = %e, "serve connection failed");
            }
            drop(guard);
        });
    }
}
