//! Built-in middleware ported from the teacher's agent tool registry
//! (`examples/oxicrab-oxicrab/src/agent/tools/registry.rs`): result caching,
//! truncation, and structured logging, adapted onto the kernel's unified
//! `Middleware::call` hook in place of the teacher's separate
//! `before_execute`/`after_execute` pair. A host wires these in as global
//! middleware to get the same behaviour the teacher's agent loop gets for
//! free, without the kernel hard-coding any of it.

use super::{Middleware, NextFn};
use crate::context::ExecutionContext;
use crate::error::KernelError;
use crate::handler::HandlerOutput;
use crate::progress::ProgressSink;
use crate::response::ContentBlock;
use crate::schema::ValidatedArgs;
use async_trait::async_trait;
use lru::LruCache;
use serde_json::Value;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Context key the pipeline sets to the dispatched tool's name. Builtin
/// middleware reads it for cache keys and log lines; a host composing its
/// own middleware is free to ignore it.
pub const CTX_TOOL_NAME: &str = "__tool_name";
/// Context key the pipeline sets to the dispatched action's name (flat
/// exposition: identical to the tool name).
pub const CTX_ACTION_NAME: &str = "__action_name";
/// Context key the pipeline sets to the action's declared `cacheable` flag.
pub const CTX_CACHEABLE: &str = "__cacheable";

fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&canonical_value(value)).unwrap_or_default()
}

fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> = map.iter().map(|(k, v)| (k, canonical_value(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonical_value).collect()),
        other => other.clone(),
    }
}

fn route_label(ctx: &ExecutionContext) -> String {
    let tool = ctx.get(CTX_TOOL_NAME).and_then(Value::as_str).unwrap_or("?");
    let action = ctx.get(CTX_ACTION_NAME).and_then(Value::as_str).unwrap_or(tool);
    if tool == action {
        tool.to_string()
    } else {
        format!("{tool}/{action}")
    }
}

fn is_cacheable(ctx: &ExecutionContext) -> bool {
    ctx.get(CTX_CACHEABLE).and_then(Value::as_bool).unwrap_or(false)
}

struct CachedResult {
    output: HandlerOutput,
    cached_at: Instant,
}

/// Caches successful results keyed on route name plus the canonical (sorted
/// object keys, stable array order) JSON encoding of the validated
/// arguments. Only routes the pipeline marks `cacheable` via
/// [`CTX_CACHEABLE`] participate; errors are never cached.
pub struct CacheMiddleware {
    cache: Mutex<LruCache<String, CachedResult>>,
    ttl_secs: u64,
}

impl CacheMiddleware {
    pub fn new(max_entries: usize, ttl_secs: u64) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(max_entries).expect("cache max_entries must be > 0"),
            )),
            ttl_secs,
        }
    }
}

#[async_trait]
impl Middleware for CacheMiddleware {
    async fn call(
        &self,
        ctx: ExecutionContext,
        args: ValidatedArgs,
        progress: Option<ProgressSink>,
        next: NextFn,
    ) -> Result<HandlerOutput, KernelError> {
        if !is_cacheable(&ctx) {
            return next(ctx, args, progress).await;
        }

        let label = route_label(&ctx);
        let key = format!("{label}:{}", canonical_json(&args.clone().into_value()));

        {
            let mut cache = self.cache.lock().await;
            if let Some(cached) = cache.get(&key) {
                if cached.cached_at.elapsed().as_secs() < self.ttl_secs {
                    debug!(route = %label, age = ?cached.cached_at.elapsed(), "cache hit");
                    return Ok(cached.output.clone());
                }
                cache.pop(&key);
            }
        }

        let output = next(ctx, args, progress).await?;
        if !matches!(&output, HandlerOutput::Wire(w) if w.is_error) {
            let mut cache = self.cache.lock().await;
            cache.put(
                key,
                CachedResult {
                    output: output.clone(),
                    cached_at: Instant::now(),
                },
            );
        }
        Ok(output)
    }
}

/// Truncates the text of every [`ContentBlock::Text`] in a `Wire` result to
/// `max_chars`. `Datum` outputs pass through untouched — truncation is a
/// presentation concern that the presenter (§4.4) applies once the datum has
/// been rendered into content blocks.
pub struct TruncationMiddleware {
    max_chars: usize,
}

impl TruncationMiddleware {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

#[async_trait]
impl Middleware for TruncationMiddleware {
    async fn call(
        &self,
        ctx: ExecutionContext,
        args: ValidatedArgs,
        progress: Option<ProgressSink>,
        next: NextFn,
    ) -> Result<HandlerOutput, KernelError> {
        let output = next(ctx, args, progress).await?;
        Ok(match output {
            HandlerOutput::Wire(mut wire) => {
                wire.content = wire
                    .content
                    .into_iter()
                    .map(|block| truncate_block(block, self.max_chars))
                    .collect();
                HandlerOutput::Wire(wire)
            }
            datum @ HandlerOutput::Datum(_) => datum,
        })
    }
}

fn truncate_block(block: ContentBlock, max_chars: usize) -> ContentBlock {
    match block {
        ContentBlock::Text { text } if text.chars().count() > max_chars => {
            let truncated: String = text.chars().take(max_chars).collect();
            ContentBlock::text(format!("{truncated}… [truncated]"))
        }
        other => other,
    }
}

/// Logs route entry at debug and completion at info/warn depending on
/// outcome, mirroring the teacher's `LoggingMiddleware`.
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn call(
        &self,
        ctx: ExecutionContext,
        args: ValidatedArgs,
        progress: Option<ProgressSink>,
        next: NextFn,
    ) -> Result<HandlerOutput, KernelError> {
        let label = route_label(&ctx);
        debug!(route = %label, args = %args.clone().into_value(), "dispatching");
        let result = next(ctx, args, progress).await;
        match &result {
            Ok(HandlerOutput::Wire(wire)) if wire.is_error => {
                warn!(route = %label, "route returned an error result");
            }
            Ok(_) => {
                info!(route = %label, "route completed");
            }
            Err(err) => {
                warn!(route = %label, error = %err, "route failed");
            }
        }
        result
    }
}
