//! Access logging of service method calls.

use chrono::{DateTime, Local};
use http::Method;
use std::time::Duration;
use tracing::info;

pub const FIELD_ARGS: &str = "args";
pub const FIELD_RESP: &str = "resp";
pub const FIELD_METHOD_BEGIN: &str = "methodBegin";
pub const FIELD_METHOD_DURATION: &str = "methodDuration";

/// One finished call, as reported to a [`MethodLogger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodLogRecord {
    pub method: Method,
    pub path: String,
    /// the bound argument as json
    pub args: String,
    /// the response payload as json, `null` when nothing was written
    pub resp: String,
    /// local time, `YYYY-MM-DD HH:MM:SS.ffffff`
    pub method_begin: String,
    /// decimal seconds
    pub method_duration: String,
}

impl MethodLogRecord {
    pub fn new(method: Method, path: String, args: String, resp: String, begin: DateTime<Local>, duration: Duration) -> Self {
        Self {
            method,
            path,
            args,
            resp,
            method_begin: begin.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            method_duration: duration.as_secs_f64().to_string(),
        }
    }

    /// The logged fields in their reporting order.
    pub fn fields(&self) -> [(&'static str, &str); 4] {
        [
            (FIELD_ARGS, self.args.as_str()),
            (FIELD_RESP, self.resp.as_str()),
            (FIELD_METHOD_BEGIN, self.method_begin.as_str()),
            (FIELD_METHOD_DURATION, self.method_duration.as_str()),
        ]
    }
}

/// Receives a record of every call that reached the service method.
///
/// Requests rejected while binding the argument are not reported.
#[cfg_attr(test, mockall::automock)]
pub trait MethodLogger: Send + Sync {
    fn record(&self, record: &MethodLogRecord);
}

/// Emits each record as an `info` event with the `micro_api::access` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMethodLogger;

impl MethodLogger for TracingMethodLogger {
    fn record(&self, record: &MethodLogRecord) {
        info!(
            target: "micro_api::access",
            method = %record.method,
            path = %record.path,
            args = %record.args,
            resp = %record.resp,
            method_begin = %record.method_begin,
            method_duration = %record.method_duration,
            "service method called"
        );
    }
}
