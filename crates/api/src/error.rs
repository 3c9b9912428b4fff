use http::Method;
use serde::de;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A handler was rejected while building the router.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("the second argument should be a struct, sequence or string-keyed map, but `{type_name}` is a {found}")]
    SecondArgument { type_name: &'static str, found: &'static str },

    #[error("the second argument `{type_name}` can't be represented as json: {source}")]
    Template {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl SignatureError {
    pub fn second_argument(type_name: &'static str, found: &'static str) -> Self {
        Self::SecondArgument { type_name, found }
    }
}

#[derive(Debug, Error)]
pub enum RouterBuildError {
    #[error("invalid service method for {method} {path}: {source}")]
    Signature {
        method: Method,
        path: String,
        #[source]
        source: SignatureError,
    },

    #[error("route {method} {path} is registered more than once")]
    Duplicate { method: Method, path: String },

    #[error("can't insert route {path}: {source}")]
    Insert {
        path: String,
        #[source]
        source: matchit::InsertError,
    },
}

/// Failures while reading a request body.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("request body has been consumed")]
    Consumed,

    #[error("request body exceeds the limit of {limit} bytes")]
    TooLarge { limit: usize },

    #[error("read request body failed: {source}")]
    Read {
        #[source]
        source: BoxError,
    },
}

/// The request data could not be bound to the handler argument.
///
/// Every variant is reported to the client as a `400` envelope.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("invalid query string: {0}")]
    Query(#[source] serde_urlencoded::de::Error),

    #[error("invalid form body: {0}")]
    Form(#[source] serde_urlencoded::de::Error),

    #[error("invalid multipart body: {reason}")]
    Multipart { reason: String },

    #[error("invalid json body: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Body(#[from] BodyError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl BindError {
    pub fn multipart<S: ToString>(str: S) -> Self {
        Self::Multipart { reason: str.to_string() }
    }
}

/// A value from the query, form, json or path source doesn't fit the argument type.
#[derive(Debug, Error)]
pub struct DecodeError {
    field: Option<String>,
    message: String,
}

impl DecodeError {
    pub(crate) fn json(e: serde_json::Error) -> Self {
        de::Error::custom(e)
    }

    pub(crate) fn invalid_text(text: &str, expected: &str) -> Self {
        de::Error::custom(format_args!("invalid {expected} value `{text}`"))
    }

    pub(crate) fn unknown_key(key: &str) -> Self {
        de::Error::custom(format_args!("unknown key `{key}`"))
    }

    /// Prefix the error with the key it was found under.
    pub(crate) fn at(self, key: &str) -> Self {
        let field = match self.field {
            Some(field) => format!("{key}.{field}"),
            None => key.to_string(),
        };
        Self { field: Some(field), message: self.message }
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "field `{field}`: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl de::Error for DecodeError {
    fn custom<T: Display>(msg: T) -> Self {
        Self { field: None, message: msg.to_string() }
    }
}

/// An unrecoverable failure after the response was already determined.
///
/// This never becomes a client envelope, it is handed to the transport instead.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("serialize access log field `{field}` failed: {source}")]
    AccessLog {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::DecodeError;
    use serde::de::Error;

    #[test]
    fn test_decode_error_path() {
        let error = DecodeError::custom("invalid digit").at("age").at("user");
        assert_eq!(error.field(), Some("user.age"));
        assert_eq!(error.to_string(), "field `user.age`: invalid digit");
    }

    #[test]
    fn test_decode_error_without_field() {
        let error = DecodeError::unknown_key("nickname");
        assert_eq!(error.field(), None);
        assert_eq!(error.to_string(), "unknown key `nickname`");
    }
}
