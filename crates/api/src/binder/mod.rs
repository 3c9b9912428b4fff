//! Builds the service method argument from the request.
//!
//! Three passes write into the same value, each one overriding the fields named by the
//! previous ones:
//!
//! 1. the query string, together with a urlencoded body (`POST`, `PUT`, `PATCH`) or the text
//!    fields of a `multipart/form-data` body (`POST`)
//! 2. a json body, for `POST` with `application/json`
//! 3. the percent-decoded path parameters of the matched route
//!
//! Fields no pass mentions keep the value of `A::default()`. Body sources are skipped when the
//! route bypasses the request body.

mod de;
mod form;
mod source;

use crate::body::OptionReqBody;
use crate::config::BinderConfig;
use crate::error::BindError;
use crate::request::RequestContext;
use crate::signature::{ArgShape, Argument};
use de::NodeDeserializer;
use form::{parse_multipart, FormValues};
use http::Method;
use mime::Mime;
use percent_encoding::percent_decode_str;
use source::Source;

#[derive(Debug, Clone, Default)]
pub struct Binder {
    config: BinderConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BodyKind {
    None,
    Urlencoded,
    Multipart(String),
    Json,
}

impl BodyKind {
    fn of(method: &Method, content_type: Option<Mime>, bypass: bool) -> Result<Self, BindError> {
        let Some(content_type) = content_type.filter(|_| !bypass) else {
            return Ok(BodyKind::None);
        };

        let kind = match content_type.essence_str() {
            "application/x-www-form-urlencoded" if matches!(*method, Method::POST | Method::PUT | Method::PATCH) => {
                BodyKind::Urlencoded
            }
            "multipart/form-data" if method == Method::POST => {
                let boundary = content_type
                    .get_param(mime::BOUNDARY)
                    .ok_or_else(|| BindError::multipart("missing boundary parameter"))?;
                BodyKind::Multipart(boundary.as_str().to_string())
            }
            "application/json" if method == Method::POST => BodyKind::Json,
            _ => BodyKind::None,
        };
        Ok(kind)
    }

    fn reads_body(&self) -> bool {
        !matches!(self, BodyKind::None)
    }
}

impl Binder {
    pub fn new(config: BinderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    /// Bind the argument, buffering the body first when a pass needs it.
    ///
    /// The buffered bytes are put back into `body`, so the service method can read the same
    /// body again.
    pub async fn bind<A: Argument>(
        &self,
        shape: &ArgShape<A>,
        req: &RequestContext<'_, '_>,
        body: &OptionReqBody,
        bypass: bool,
    ) -> Result<A, BindError> {
        let kind = BodyKind::of(req.method(), req.content_type(), bypass)?;
        if !kind.reads_body() {
            return self.bind_buffered(shape, req, None, bypass);
        }

        let bytes = body.bytes(self.config.max_body_size()).await?;
        body.replace(bytes.clone()).await;
        self.bind_buffered(shape, req, Some(&bytes), bypass)
    }

    /// Bind the argument from an already buffered body.
    pub fn bind_buffered<A: Argument>(
        &self,
        shape: &ArgShape<A>,
        req: &RequestContext<'_, '_>,
        body: Option<&[u8]>,
        bypass: bool,
    ) -> Result<A, BindError> {
        let kind = BodyKind::of(req.method(), req.content_type(), bypass)?;
        let body = body.unwrap_or_default();
        let ignore_unknown_keys = self.config.ignore_unknown_keys();
        let mut source = Source::new(shape.template().clone(), ignore_unknown_keys);

        let query = FormValues::from_query(req.uri().query())?;
        let form = match &kind {
            BodyKind::Urlencoded => {
                let mut form = FormValues::from_urlencoded(body)?;
                form.extend(query);
                form
            }
            BodyKind::Multipart(boundary) => {
                let mut form = query;
                form.extend(parse_multipart(body, boundary)?);
                form
            }
            BodyKind::None | BodyKind::Json => query,
        };

        for (key, values) in form.into_entries() {
            source.write_text(&key, values)?;
        }

        if kind == BodyKind::Json {
            let value = serde_json::from_slice::<serde_json::Value>(body)?;
            source.write_json(value)?;
        }

        for (name, value) in req.path_params().iter() {
            let value = percent_decode_str(value).decode_utf8_lossy().into_owned();
            source.write_text(name, vec![value])?;
        }

        let arg = A::deserialize(NodeDeserializer::new(source.into_root(), ignore_unknown_keys))?;
        Ok(arg)
    }
}
