//! Middleware compiler (§4.2).
//!
//! Middleware wraps a handler the same way the teacher's
//! `ToolMiddleware::before_execute`/`after_execute` pair wraps `Tool::execute`
//! (`examples/oxicrab-oxicrab/src/agent/tools/base/mod.rs`), but generalised
//! into a single `call(ctx, args, progress, next)` stage so a middleware can
//! short-circuit, rewrite arguments, derive context, or post-process a result
//! without the kernel needing two separate hook points. The chain is
//! pre-compiled into one boxed closure at `finalize()` time (§9 DESIGN NOTES:
//! "pre-bind the chain once at registration instead of re-walking a Vec on
//! every call") rather than walked per-call.

pub mod builtin;

use crate::context::ExecutionContext;
use crate::error::KernelError;
use crate::handler::{Handler, HandlerOutput};
use crate::progress::ProgressSink;
use crate::schema::ValidatedArgs;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// The continuation a middleware calls to run the rest of the chain. Boxed
/// because each middleware's inner future captures type-erased state from
/// the previous link; there is no way to name the concrete future type at a
/// compile-time chain boundary.
pub type NextFn =
    Arc<dyn Fn(ExecutionContext, ValidatedArgs, Option<ProgressSink>) -> BoxFuture<'static, Result<HandlerOutput, KernelError>> + Send + Sync>;

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn call(
        &self,
        ctx: ExecutionContext,
        args: ValidatedArgs,
        progress: Option<ProgressSink>,
        next: NextFn,
    ) -> Result<HandlerOutput, KernelError>;
}

/// Fold `global` then `action`-scoped middleware right-to-left around
/// `handler`, so the resulting `NextFn` runs global middleware first, then
/// action middleware, then the handler (§4.2: "M_global ∘ M_action ∘ H").
pub fn compile_chain(global: &[Arc<dyn Middleware>], action: &[Arc<dyn Middleware>], handler: Handler) -> NextFn {
    let mut next: NextFn = Arc::new(move |ctx, args, progress| {
        let handler = handler.clone();
        Box::pin(async move {
            handler
                .invoke(ctx, args, progress)
                .await
                .map_err(KernelError::Internal)
        })
    });

    for mw in action.iter().rev().chain(global.iter().rev()) {
        let mw = mw.clone();
        let inner = next;
        next = Arc::new(move |ctx, args, progress| {
            let mw = mw.clone();
            let inner = inner.clone();
            Box::pin(async move { mw.call(ctx, args, progress, inner).await })
        });
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{DirectHandler, HandlerOutput};
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl DirectHandler for Echo {
        async fn call(&self, _ctx: ExecutionContext, args: ValidatedArgs) -> anyhow::Result<HandlerOutput> {
            Ok(HandlerOutput::datum(args.into_value()))
        }
    }

    struct Tag(&'static str);

    #[async_trait]
    impl Middleware for Tag {
        async fn call(
            &self,
            mut ctx: ExecutionContext,
            args: ValidatedArgs,
            progress: Option<ProgressSink>,
            next: NextFn,
        ) -> Result<HandlerOutput, KernelError> {
            let mut order = ctx
                .get("order")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect::<Vec<_>>())
                .unwrap_or_default();
            order.push(self.0.to_string());
            ctx.insert("order", json!(order));
            next(ctx, args, progress).await
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl Middleware for ShortCircuit {
        async fn call(
            &self,
            _ctx: ExecutionContext,
            _args: ValidatedArgs,
            _progress: Option<ProgressSink>,
            _next: NextFn,
        ) -> Result<HandlerOutput, KernelError> {
            Ok(HandlerOutput::datum(json!({"short": true})))
        }
    }

    #[tokio::test]
    async fn chain_runs_global_then_action_then_handler() {
        let global: Vec<Arc<dyn Middleware>> = vec![Arc::new(Tag("global"))];
        let action: Vec<Arc<dyn Middleware>> = vec![Arc::new(Tag("action"))];
        let chain = compile_chain(&global, &action, Handler::direct(Echo));

        let out = chain(ExecutionContext::new(), ValidatedArgs::default(), None)
            .await
            .unwrap();
        match out {
            HandlerOutput::Datum(v) => {
                assert_eq!(v["order"], json!(["global", "action"]));
            }
            HandlerOutput::Wire(_) => panic!("expected Datum"),
        }
    }

    #[tokio::test]
    async fn middleware_can_short_circuit_without_calling_next() {
        let global: Vec<Arc<dyn Middleware>> = vec![Arc::new(ShortCircuit), Arc::new(Tag("never runs"))];
        let chain = compile_chain(&global, &[], Handler::direct(Echo));

        let out = chain(ExecutionContext::new(), ValidatedArgs::default(), None)
            .await
            .unwrap();
        match out {
            HandlerOutput::Datum(v) => assert_eq!(v, json!({"short": true})),
            HandlerOutput::Wire(_) => panic!("expected Datum"),
        }
    }

    #[tokio::test]
    async fn derived_context_survives_through_the_chain() {
        let global: Vec<Arc<dyn Middleware>> = vec![Arc::new(Tag("a")), Arc::new(Tag("b")), Arc::new(Tag("c"))];
        let chain = compile_chain(&global, &[], Handler::direct(Echo));

        let out = chain(ExecutionContext::new(), ValidatedArgs::default(), None)
            .await
            .unwrap();
        match out {
            HandlerOutput::Datum(v) => assert_eq!(v["order"], json!(["a", "b", "c"])),
            HandlerOutput::Wire(_) => panic!("expected Datum"),
        }
    }

    #[tokio::test]
    async fn empty_chain_invokes_handler_directly() {
        let chain = compile_chain(&[], &[], Handler::direct(Echo));
        let mut args = ValidatedArgs::default();
        args.insert("x", json!(1));
        let out = chain(ExecutionContext::new(), args, None).await.unwrap();
        match out {
            HandlerOutput::Datum(v) => assert_eq!(v, json!({"x": 1})),
            HandlerOutput::Wire(_) => panic!("expected Datum"),
        }
    }
}
