use http::{Method, Request};

#[derive(Debug, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    request: TestRequest,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, request: TestRequest) -> Self {
        Self { name, group, request }
    }

    pub fn small(name: &'static str, request: TestRequest) -> Self {
        Self::new(name, TestGroup::Small, request)
    }

    pub fn large(name: &'static str, request: TestRequest) -> Self {
        Self::new(name, TestGroup::Large, request)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn request(&self) -> &TestRequest {
        &self.request
    }
}

/// A request to bind: method, uri, content type and a body loaded from `resources/`.
#[derive(Debug, Clone)]
pub struct TestRequest {
    method: Method,
    uri: &'static str,
    content_type: Option<&'static str>,
    body: TestFile,
}

impl TestRequest {
    pub const fn new(method: Method, uri: &'static str, content_type: Option<&'static str>, body: TestFile) -> Self {
        Self { method, uri, content_type, body }
    }

    pub fn body(&self) -> &TestFile {
        &self.body
    }

    /// The request head, the body is handed to the binder separately.
    pub fn head(&self) -> http::request::Parts {
        let mut builder = Request::builder().method(self.method.clone()).uri(self.uri);
        if let Some(content_type) = self.content_type {
            builder = builder.header(http::header::CONTENT_TYPE, content_type);
        }
        builder.body(()).expect("test request should be valid").into_parts().0
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TestFile {
    file_name: &'static str,
    content: &'static str,
}

impl TestFile {
    pub const EMPTY: TestFile = TestFile::new("empty", "");

    pub const fn new(file_name: &'static str, content: &'static str) -> Self {
        Self { file_name, content }
    }

    pub fn content(&self) -> &'static str {
        self.content
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Large,
}
