//! Adapters turning plain closures into [`FunctionHandler`]s.
//!
//! Sync, async and effectful handlers all normalise to one async
//! `Result<Value, HandlerError>`.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::HandlerError;
use crate::function_ctx::FunctionCtx;
use crate::traits::FunctionHandler;

/// Handler wrapping a synchronous closure of the input.
pub struct FnHandler<F> {
    f: F,
}

/// Wrap a synchronous `Fn(Value) -> Result<Value, HandlerError>`.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F> FunctionHandler for FnHandler<F>
where
    F: Fn(Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    async fn run(&self, _ctx: &FunctionCtx, input: Value) -> Result<Value, HandlerError> {
        (self.f)(input)
    }
}

/// Handler wrapping an async closure that receives its own context clone.
pub struct AsyncFnHandler<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

/// Wrap an async `Fn(FunctionCtx, Value) -> impl Future<Output = Result<..>>`.
pub fn async_handler_fn<F, Fut>(f: F) -> AsyncFnHandler<F, Fut>
where
    F: Fn(FunctionCtx, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    AsyncFnHandler {
        f,
        _fut: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> FunctionHandler for AsyncFnHandler<F, Fut>
where
    F: Fn(FunctionCtx, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn run(&self, ctx: &FunctionCtx, input: Value) -> Result<Value, HandlerError> {
        (self.f)(ctx.clone(), input).await
    }
}
