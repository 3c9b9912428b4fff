use bencher::{TestCase, TestFile, TestGroup, TestRequest};
use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use http::{Method, Request};
use http_body_util::Full;
use micro_api::router::post;
use micro_api::{service_fn, ArgShape, Binder, MethodContext, PathParams, RequestContext, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::hint::black_box;

static SMALL_JSON: TestFile = TestFile::new("user_small.json", include_str!("../resources/bind/user_small.json"));
static LARGE_JSON: TestFile = TestFile::new("user_large.json", include_str!("../resources/bind/user_large.json"));
static FORM: TestFile = TestFile::new("user_form.txt", include_str!("../resources/bind/user_form.txt"));
static QUERY: &str = include_str!("../resources/bind/user_query.txt");

#[derive(Debug, Serialize, Deserialize, Default)]
struct Address {
    city: String,
    street: String,
    zip: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Profile {
    nickname: String,
    bio: String,
    active: bool,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct User {
    id: u64,
    name: String,
    age: u32,
    email: Option<String>,
    tags: Vec<String>,
    address: Address,
    scores: Vec<u32>,
    profile: Profile,
}

fn create_test_cases() -> Vec<TestCase> {
    let query_uri: &'static str = Box::leak(format!("/users?{QUERY}").into_boxed_str());
    vec![
        TestCase::small("query", TestRequest::new(Method::GET, query_uri, None, TestFile::EMPTY)),
        TestCase::small("json_small", TestRequest::new(Method::POST, query_uri, Some("application/json"), SMALL_JSON)),
        TestCase::large("json_large", TestRequest::new(Method::POST, "/users", Some("application/json"), LARGE_JSON)),
        TestCase::large(
            "urlencoded",
            TestRequest::new(Method::POST, "/users", Some("application/x-www-form-urlencoded"), FORM),
        ),
    ]
}

fn benchmark_binder(criterion: &mut Criterion) {
    let binder = Binder::default();
    let shape = ArgShape::<User>::of().expect("User should be a valid argument");
    let params = PathParams::empty();
    let mut group = criterion.benchmark_group("binder");

    for case in create_test_cases() {
        let head = case.request().head();
        let body = case.request().body().content().as_bytes();
        let group_name = match case.group() {
            TestGroup::Small => "small",
            TestGroup::Large => "large",
        };

        group.throughput(Throughput::Bytes((head.uri.to_string().len() + body.len()) as u64));
        group.bench_with_input(BenchmarkId::new(group_name, case.name()), &head, |b, head| {
            let req = RequestContext::new(head, &params);
            b.iter(|| {
                let user = binder.bind_buffered(&shape, &req, Some(body), false).expect("request should bind");
                black_box(user);
            });
        });
    }

    group.finish();
}

async fn create_user(_ctx: MethodContext, arg: HashMap<String, serde_json::Value>) -> Result<Option<usize>, Infallible> {
    Ok(Some(arg.len()))
}

fn benchmark_router(criterion: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread().build().expect("runtime should start");
    let router = Router::builder().route(post("/users/{id}", service_fn(create_user))).build().expect("router should build");

    criterion.bench_function("router_handle_json", |b| {
        b.iter_batched(
            || {
                Request::post("/users/7?source=bench")
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Full::new(Bytes::from_static(SMALL_JSON.content().as_bytes())))
                    .expect("request should be valid")
            },
            |request| {
                let response = runtime.block_on(router.handle(request)).expect("request should be handled");
                black_box(response);
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(binder, benchmark_binder, benchmark_router);
criterion_main!(binder);
