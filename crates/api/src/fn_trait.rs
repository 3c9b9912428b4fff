use crate::context::MethodContext;
use crate::invoke::MethodReturn;

/// An async service method: `async fn(MethodContext, A) -> Result<(), E>` or
/// `async fn(MethodContext, A) -> Result<Option<R>, E>`.
///
/// It's implemented for every matching `Fn`, so plain async functions and closures returning
/// async blocks can both be registered:
///```no_run
/// use micro_api::MethodContext;
/// use std::convert::Infallible;
///
/// #[derive(serde::Serialize, serde::Deserialize, Default)]
/// struct Greet {
///     name: String,
/// }
///
/// async fn greet(_ctx: MethodContext, arg: Greet) -> Result<Option<String>, Infallible> {
///     Ok(Some(format!("hello {}", arg.name)))
/// }
///
/// let _handler = micro_api::service_fn(greet);
///```
pub trait ServiceMethod<A>: Send + Sync + 'static {
    type Output: MethodReturn;

    fn call(&self, ctx: MethodContext, arg: A) -> impl Future<Output = Self::Output> + Send + use<Self, A>;
}

impl<Func, Fut, A> ServiceMethod<A> for Func
where
    Func: Fn(MethodContext, A) -> Fut + Send + Sync + 'static,
    Fut: Future + Send,
    Fut::Output: MethodReturn,
{
    type Output = Fut::Output;

    #[inline]
    fn call(&self, ctx: MethodContext, arg: A) -> impl Future<Output = Self::Output> + Send + use<Func, Fut, A> {
        (self)(ctx, arg)
    }
}
