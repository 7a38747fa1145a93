//! Execution pipeline (§4.3): `Kernel::dispatch` — the single entry point a
//! host transport calls for every `tools/call`.

use crate::context::ExecutionContext;
use crate::error::{ErrorBuilder, KernelError, Severity};
use crate::handler::HandlerOutput;
use crate::middleware::builtin::{CTX_ACTION_NAME, CTX_CACHEABLE, CTX_TOOL_NAME};
use crate::policy::decorate_invalidation;
use crate::progress::ProgressSink;
use crate::registry::{CompiledAction, Kernel, RouteKind};
use crate::schema::validate;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

impl Kernel {
    /// Route, validate, dispatch, present, and decorate a single call.
    /// Never panics and never returns `Err` — every failure mode becomes an
    /// error [`crate::response::WireResponse`] (§7).
    pub async fn dispatch(
        &self,
        route_name: &str,
        raw_args: Value,
        ctx: ExecutionContext,
        progress: Option<ProgressSink>,
    ) -> crate::response::WireResponse {
        self.observer.on_dispatch_start(route_name);
        let started = Instant::now();

        let response = self.dispatch_inner(route_name, raw_args, ctx, progress).await;

        self.observer
            .on_dispatch_end(route_name, response.is_error, started.elapsed());
        self.decorate(route_name, response)
    }

    async fn dispatch_inner(
        &self,
        route_name: &str,
        raw_args: Value,
        mut ctx: ExecutionContext,
        progress: Option<ProgressSink>,
    ) -> crate::response::WireResponse {
        let Some(route) = self.routes.get(route_name) else {
            return error_response(
                "unknown_tool",
                Severity::Error,
                format!("unknown tool '{route_name}'"),
                Some("call tools/list to see available tools".to_string()),
            );
        };

        let (action, mut args_obj, discriminator) = match &route.kind {
            RouteKind::Flat(action) => (action.clone(), into_object(raw_args), None),
            RouteKind::Grouped {
                discriminator_field,
                actions,
            } => {
                let mut obj = into_object(raw_args);
                let available = || actions.keys().cloned().collect::<Vec<_>>().join(", ");
                let Some(selector) = obj.remove(discriminator_field.as_str()).and_then(|v| v.as_str().map(String::from))
                else {
                    return error_response(
                        "discriminator_required",
                        Severity::Error,
                        format!("{discriminator_field} is required, available: {}", available()),
                        None,
                    );
                };
                let Some(action) = actions.get(&selector) else {
                    return error_response(
                        "unknown_action",
                        Severity::Error,
                        format!("unknown action '{selector}', available: {}", available()),
                        None,
                    );
                };
                (action.clone(), obj, Some((discriminator_field.clone(), selector)))
            }
        };

        let select = extract_select(&mut args_obj);
        let label = format!("{}/{}", action.tool_name, action.action_key);

        let mut validated = match validate(&action.schema, &Value::Object(args_obj)) {
            Ok(args) => args,
            Err(errors) => {
                let detail = errors
                    .iter()
                    .map(|e| format!("{label} {}: {}", e.path, e.message))
                    .collect::<Vec<_>>()
                    .join("; ");
                return error_response("validation_failed", Severity::Error, detail, None);
            }
        };

        if let Some((field, value)) = discriminator {
            validated.insert(field, Value::String(value));
        }

        ctx.insert(CTX_TOOL_NAME, Value::String(action.tool_name.clone()));
        ctx.insert(CTX_ACTION_NAME, Value::String(action.action_key.clone()));
        ctx.insert(CTX_CACHEABLE, Value::Bool(action.cacheable));

        let output = match (action.chain)(ctx.clone(), validated, progress).await {
            Ok(output) => output,
            Err(err) => {
                return error_response("handler_error", Severity::Error, format!("[{label}] {err}"), None);
            }
        };

        self.post_process(&action, output, &ctx, select.as_deref())
    }

    fn post_process(
        &self,
        action: &Arc<CompiledAction>,
        output: HandlerOutput,
        ctx: &ExecutionContext,
        select: Option<&[String]>,
    ) -> crate::response::WireResponse {
        match output {
            HandlerOutput::Wire(wire) => wire,
            HandlerOutput::Datum(datum) => match &action.presenter {
                Some(presenter) => match presenter.present(&datum, ctx, select) {
                    Ok(wire) => wire,
                    Err(KernelError::PresenterValidation(detail)) => {
                        error_response("presenter_validation_failed", Severity::Critical, detail, None)
                    }
                    Err(other) => error_response("presenter_error", Severity::Critical, other.to_string(), None),
                },
                None => wrap_raw_datum(datum),
            },
        }
    }

    fn decorate(&self, route_name: &str, response: crate::response::WireResponse) -> crate::response::WireResponse {
        let Some(policy) = &self.policy else {
            return response;
        };
        let resolved = policy.resolve(route_name);
        match decorate_invalidation(route_name, resolved.as_deref(), response.is_error) {
            Some(block) => response.with_prepended(block),
            None => response,
        }
    }
}

fn into_object(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

fn extract_select(obj: &mut serde_json::Map<String, Value>) -> Option<Vec<String>> {
    obj.remove("_select").and_then(|v| v.as_array().map(|arr| {
        arr.iter().filter_map(|item| item.as_str().map(String::from)).collect()
    }))
}

fn wrap_raw_datum(datum: Value) -> crate::response::WireResponse {
    match datum {
        Value::String(s) => crate::response::WireResponse::text(s),
        other => crate::response::WireResponse::text(serde_json::to_string_pretty(&other).unwrap_or_default()),
    }
}

fn error_response(code: &str, severity: Severity, message: String, suggestion: Option<String>) -> crate::response::WireResponse {
    let mut builder = ErrorBuilder::new(code, message).severity(severity);
    if let Some(suggestion) = suggestion {
        builder = builder.suggestion(suggestion);
    }
    crate::response::WireResponse::from_error(&builder.build())
}
