//! Action handlers (§3, §4.2).
//!
//! A handler is either *direct* (returns the final result) or *generative*
//! (emits progress events through a sink, then returns the final result).
//! Both are plain async trait objects — see `crate::progress` for why no
//! generator/stream machinery is needed for the generative case.

use crate::context::ExecutionContext;
use crate::progress::ProgressSink;
use crate::response::WireResponse;
use crate::schema::ValidatedArgs;
use async_trait::async_trait;
use serde_json::Value;

/// What a handler hands back to the pipeline for post-processing (§4.3
/// priority ladder). A response builder's `.build()` already yields a
/// `WireResponse`, collapsing priorities 1 and 2 of the ladder into one
/// variant; `Datum` covers priorities 3 and 4 (presenter or raw wrap).
#[derive(Clone)]
pub enum HandlerOutput {
    Wire(WireResponse),
    Datum(Value),
}

impl HandlerOutput {
    pub fn datum(value: impl Into<Value>) -> Self {
        HandlerOutput::Datum(value.into())
    }

    pub fn wire(response: WireResponse) -> Self {
        HandlerOutput::Wire(response)
    }
}

#[async_trait]
pub trait DirectHandler: Send + Sync {
    async fn call(&self, ctx: ExecutionContext, args: ValidatedArgs) -> anyhow::Result<HandlerOutput>;
}

#[async_trait]
pub trait GenerativeHandler: Send + Sync {
    async fn call(
        &self,
        ctx: ExecutionContext,
        args: ValidatedArgs,
        progress: Option<ProgressSink>,
    ) -> anyhow::Result<HandlerOutput>;
}

#[derive(Clone)]
pub enum Handler {
    Direct(std::sync::Arc<dyn DirectHandler>),
    Generative(std::sync::Arc<dyn GenerativeHandler>),
}

impl Handler {
    pub fn direct(handler: impl DirectHandler + 'static) -> Self {
        Handler::Direct(std::sync::Arc::new(handler))
    }

    pub fn generative(handler: impl GenerativeHandler + 'static) -> Self {
        Handler::Generative(std::sync::Arc::new(handler))
    }

    pub async fn invoke(
        &self,
        ctx: ExecutionContext,
        args: ValidatedArgs,
        progress: Option<ProgressSink>,
    ) -> anyhow::Result<HandlerOutput> {
        match self {
            Handler::Direct(h) => h.call(ctx, args).await,
            Handler::Generative(h) => h.call(ctx, args, progress).await,
        }
    }
}

/// Convenience adapter: wrap a plain async closure as a [`DirectHandler`].
/// Mirrors the teacher's preference for small free functions over
/// boilerplate trait impls at call sites that register a single tool.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> DirectHandler for FnHandler<F>
where
    F: Fn(ExecutionContext, ValidatedArgs) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<HandlerOutput>> + Send,
{
    async fn call(&self, ctx: ExecutionContext, args: ValidatedArgs) -> anyhow::Result<HandlerOutput> {
        (self.0)(ctx, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl DirectHandler for Echo {
        async fn call(&self, _ctx: ExecutionContext, args: ValidatedArgs) -> anyhow::Result<HandlerOutput> {
            Ok(HandlerOutput::datum(args.into_value()))
        }
    }

    #[tokio::test]
    async fn direct_handler_returns_datum() {
        let handler = Handler::direct(Echo);
        let mut args = ValidatedArgs::default();
        args.insert("x", json!(1));
        let out = handler.invoke(ExecutionContext::new(), args, None).await.unwrap();
        match out {
            HandlerOutput::Datum(v) => assert_eq!(v, json!({"x": 1})),
            HandlerOutput::Wire(_) => panic!("expected Datum"),
        }
    }

    #[tokio::test]
    async fn fn_handler_wraps_closure() {
        let handler = Handler::direct(FnHandler(|_ctx, _args| async {
            Ok(HandlerOutput::wire(WireResponse::text("hi")))
        }));
        let out = handler
            .invoke(ExecutionContext::new(), ValidatedArgs::default(), None)
            .await
            .unwrap();
        assert!(matches!(out, HandlerOutput::Wire(_)));
    }

    struct Progressive;

    #[async_trait]
    impl GenerativeHandler for Progressive {
        async fn call(
            &self,
            _ctx: ExecutionContext,
            _args: ValidatedArgs,
            progress: Option<ProgressSink>,
        ) -> anyhow::Result<HandlerOutput> {
            if let Some(sink) = progress {
                sink.emit(crate::progress::ProgressEvent::new("working").percent(50.0));
            }
            Ok(HandlerOutput::datum(json!({"done": true})))
        }
    }

    #[tokio::test]
    async fn generative_handler_emits_then_returns() {
        use crate::progress::{ProgressEvent, ProgressObserver};
        use std::sync::{Arc, Mutex};

        struct Recorder(Mutex<Vec<ProgressEvent>>);
        impl ProgressObserver for Recorder {
            fn emit(&self, event: ProgressEvent) {
                self.0.lock().unwrap().push(event);
            }
        }

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let handler = Handler::generative(Progressive);
        let out = handler
            .invoke(
                ExecutionContext::new(),
                ValidatedArgs::default(),
                Some(recorder.clone()),
            )
            .await
            .unwrap();
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
        assert!(matches!(out, HandlerOutput::Datum(_)));
    }
}
