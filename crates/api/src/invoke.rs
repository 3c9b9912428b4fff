//! Calls a service method and classifies what came back.
//!
//! A panic raised while the method's future is created or polled is caught here and turned
//! into [`Outcome::Panic`], it never reaches the transport or other requests.

use crate::context::MethodContext;
use crate::error::BoxError;
use crate::fn_trait::ServiceMethod;
use bytes::Bytes;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

/// Return types a service method may have.
pub trait MethodReturn {
    fn into_outcome(self) -> Outcome;
}

impl<E> MethodReturn for Result<(), E>
where
    E: Into<BoxError>,
{
    fn into_outcome(self) -> Outcome {
        match self {
            Ok(()) => Outcome::NoValue,
            Err(e) => Outcome::Error(e.into().to_string()),
        }
    }
}

impl<R, E> MethodReturn for Result<Option<R>, E>
where
    R: Serialize,
    E: Into<BoxError>,
{
    fn into_outcome(self) -> Outcome {
        match self {
            Ok(None) => Outcome::NoValue,
            Ok(Some(value)) => match serde_json::to_vec(&value) {
                Ok(encoded) => Outcome::Value(Bytes::from(encoded)),
                Err(e) => Outcome::Error(format!("encode result failed: {e}")),
            },
            Err(e) => Outcome::Error(e.into().to_string()),
        }
    }
}

/// The result of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// the json encoded result
    Value(Bytes),
    NoValue,
    /// the message of an application error
    Error(String),
    Panic(PanicStack),
}

/// A caught panic: its message and the stack at the point it was raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanicStack {
    pub panic: String,
    pub stack: String,
}

impl PanicStack {
    fn new(payload: &(dyn Any + Send)) -> Self {
        let panic = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "Box<dyn Any>".to_string()
        };

        let stack = LAST_BACKTRACE.with(|last| last.borrow_mut().take()).unwrap_or_default();
        Self { panic, stack }
    }
}

pub async fn invoke<M, A>(method: &M, ctx: MethodContext, arg: A) -> Outcome
where
    M: ServiceMethod<A>,
{
    install_panic_hook();

    match AssertUnwindSafe(async move { method.call(ctx, arg).await }).catch_unwind().await {
        Ok(ret) => ret.into_outcome(),
        Err(payload) => Outcome::Panic(PanicStack::new(payload.as_ref())),
    }
}

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Record the stack of every panic on the panicking thread, then run the previous hook.
///
/// `catch_unwind` hands back the payload only, the stack is gone by then.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let stack = Backtrace::force_capture().to_string();
            LAST_BACKTRACE.with(|last| *last.borrow_mut() = Some(stack));
            previous(info);
        }));
    });
}

#[cfg(test)]
mod tests {
    use super::{invoke, MethodReturn, Outcome};
    use crate::context::MethodContext;
    use bytes::Bytes;
    use serde::Serialize;
    use std::collections::HashMap;
    use std::io;

    #[derive(Serialize)]
    struct User {
        name: &'static str,
    }

    struct NotJson;

    impl Serialize for NotJson {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("not representable"))
        }
    }

    type Arg = HashMap<String, String>;

    #[test]
    fn test_return_shapes() {
        assert_eq!(Ok::<(), io::Error>(()).into_outcome(), Outcome::NoValue);
        assert_eq!(Ok::<Option<User>, io::Error>(None).into_outcome(), Outcome::NoValue);
        assert_eq!(
            Ok::<_, io::Error>(Some(User { name: "zava" })).into_outcome(),
            Outcome::Value(Bytes::from_static(br#"{"name":"zava"}"#))
        );
        assert_eq!(Err::<(), _>("boom").into_outcome(), Outcome::Error("boom".into()));
        assert_eq!(
            Ok::<_, String>(Some(NotJson)).into_outcome(),
            Outcome::Error("encode result failed: not representable".into())
        );
    }

    #[tokio::test]
    async fn test_invoke_value() {
        async fn hello(_ctx: MethodContext, arg: Arg) -> Result<Option<String>, io::Error> {
            Ok(arg.get("name").map(|name| format!("hello {name}")))
        }

        let arg = HashMap::from([("name".to_string(), "zava".to_string())]);
        let outcome = invoke(&hello, MethodContext::detached(), arg).await;
        assert_eq!(outcome, Outcome::Value(Bytes::from_static(br#""hello zava""#)));
    }

    #[tokio::test]
    async fn test_invoke_error() {
        async fn fail(_ctx: MethodContext, _arg: Arg) -> Result<(), io::Error> {
            Err(io::Error::other("disk is full"))
        }

        let outcome = invoke(&fail, MethodContext::detached(), Arg::new()).await;
        assert_eq!(outcome, Outcome::Error("disk is full".into()));
    }

    #[tokio::test]
    async fn test_invoke_panic() {
        async fn explode(_ctx: MethodContext, arg: Arg) -> Result<(), io::Error> {
            if arg.is_empty() {
                panic!("oops {}", 42);
            }
            Ok(())
        }

        let Outcome::Panic(stack) = invoke(&explode, MethodContext::detached(), Arg::new()).await else {
            panic!("expect a panic outcome");
        };
        assert_eq!(stack.panic, "oops 42");
        assert!(!stack.stack.is_empty());
    }

    #[tokio::test]
    async fn test_invoke_panic_before_future() {
        let method = |_ctx: MethodContext, _arg: Arg| -> std::future::Ready<Result<(), io::Error>> {
            panic!("static message");
        };

        let Outcome::Panic(stack) = invoke(&method, MethodContext::detached(), Arg::new()).await else {
            panic!("expect a panic outcome");
        };
        assert_eq!(stack.panic, "static message");
    }
}
