//! Presenter — the egress firewall (§4.4).
//!
//! Shapes a handler's raw datum into a [`WireResponse`]: validates against a
//! declared schema (dropping anything undeclared — the firewall), redacts
//! sensitive paths, applies `_select` field narrowing, truncates oversized
//! collections, and composes the content blocks an LLM client actually sees.
//! Reuses [`crate::schema`] for the declared-output schema the same way it is
//! used for declared-input parameters (see that module's doc comment).

#[cfg(test)]
mod tests;

use crate::context::ExecutionContext;
use crate::error::{KernelError, KernelResult};
use crate::response::{ContentBlock, WireResponse};
use crate::schema::{validate, ParamSpec};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const CENSOR: &str = "[REDACTED]";

pub type DynamicRule = Arc<dyn Fn(&ExecutionContext) -> Vec<String> + Send + Sync>;
pub type ElementUiBuilder = Arc<dyn Fn(&Value) -> Vec<ContentBlock> + Send + Sync>;
pub type CollectionUiBuilder = Arc<dyn Fn(&[Value]) -> Vec<ContentBlock> + Send + Sync>;
pub type SuggestedActionsBuilder = Arc<dyn Fn(&Value) -> Vec<SuggestedAction> + Send + Sync>;
pub type TruncationNoteBuilder = Arc<dyn Fn(usize) -> ContentBlock + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SuggestedAction {
    pub tool: String,
    pub reason: String,
}

impl SuggestedAction {
    pub fn new(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}

fn suggested_actions_block(actions: &[SuggestedAction]) -> ContentBlock {
    let mut out = String::from("[SUGGESTED_ACTIONS]\n");
    for action in actions {
        out.push_str(&format!("- {}: {}\n", action.tool, action.reason));
    }
    ContentBlock::text(out)
}

/// Maximum rows a caller may see in one response, plus an optional custom
/// notice builder for the hidden count.
pub struct AgentLimit {
    pub max: usize,
    pub on_truncate: Option<TruncationNoteBuilder>,
}

impl AgentLimit {
    pub fn new(max: usize) -> Self {
        Self { max, on_truncate: None }
    }

    #[must_use]
    pub fn on_truncate(mut self, builder: TruncationNoteBuilder) -> Self {
        self.on_truncate = Some(builder);
        self
    }

    fn note(&self, hidden: usize) -> ContentBlock {
        match &self.on_truncate {
            Some(builder) => builder(hidden),
            None => ContentBlock::text(format!("{hidden} items hidden")),
        }
    }
}

pub struct Presenter {
    name: String,
    schema: ParamSpec,
    static_rules: Vec<String>,
    dynamic_rules: Vec<DynamicRule>,
    auto_rules: bool,
    element_ui: Option<ElementUiBuilder>,
    collection_ui: Option<CollectionUiBuilder>,
    agent_limit: Option<AgentLimit>,
    redact_paths: Vec<String>,
    suggested_actions: Option<SuggestedActionsBuilder>,
    embeds: IndexMap<String, Arc<Presenter>>,
}

impl Presenter {
    pub fn builder(name: impl Into<String>, schema: ParamSpec) -> PresenterBuilder {
        PresenterBuilder::new(name, schema)
    }

    pub fn get_agent_limit_max(&self) -> Option<usize> {
        self.agent_limit.as_ref().map(|l| l.max)
    }

    pub fn get_schema_keys(&self) -> Vec<&String> {
        self.schema.iter().map(|(name, _)| name).collect()
    }

    pub fn get_redact_paths(&self) -> &[String] {
        &self.redact_paths
    }

    /// Run the full pipeline (§4.4 steps 1-6) over `datum`, which may be a
    /// single object or an array of objects.
    pub fn present(&self, datum: &Value, ctx: &ExecutionContext, select: Option<&[String]>) -> KernelResult<WireResponse> {
        let is_collection = datum.is_array();
        let elements: Vec<Value> = match datum {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };

        let mut validated = Vec::with_capacity(elements.len());
        for element in &elements {
            let args = validate(&self.schema, element).map_err(|errors| {
                let detail = errors
                    .iter()
                    .map(|e| format!("{}: {}", e.path, e.message))
                    .collect::<Vec<_>>()
                    .join("; ");
                KernelError::PresenterValidation(format!("{}: {detail}", self.name))
            })?;
            let mut value = args.into_value();
            for path in &self.redact_paths {
                redact_path(&mut value, path);
            }
            if let Some(fields) = select {
                value = select_fields(value, fields);
            }
            validated.push(value);
        }

        let original_count = validated.len();
        let mut truncation_note = None;
        if is_collection {
            if let Some(limit) = &self.agent_limit {
                if validated.len() > limit.max {
                    let hidden = validated.len() - limit.max;
                    validated.truncate(limit.max);
                    debug!(presenter = %self.name, hidden, original_count, "agent limit truncated collection");
                    truncation_note = Some(limit.note(hidden));
                }
            }
        }

        let primary_value = if is_collection {
            Value::Array(validated.clone())
        } else {
            validated.first().cloned().unwrap_or(Value::Null)
        };

        let mut content = vec![ContentBlock::text(
            serde_json::to_string_pretty(&primary_value).unwrap_or_default(),
        )];

        if let Some(builder) = &self.element_ui {
            for element in &validated {
                content.extend(builder(element));
            }
        }
        if is_collection {
            if let Some(builder) = &self.collection_ui {
                content.extend(builder(&validated));
            }
        }
        if let Some(note) = truncation_note {
            content.push(note);
        }

        if let Some(builder) = &self.suggested_actions {
            let actions = builder(&primary_value);
            if !actions.is_empty() {
                content.push(suggested_actions_block(&actions));
            }
        }

        let mut rules = self.own_rules(ctx);
        rules.extend(self.embed_rules(&primary_value, ctx));
        if !rules.is_empty() {
            content.push(ContentBlock::system_rules(&rules));
        }

        Ok(WireResponse::new(content))
    }

    fn own_rules(&self, ctx: &ExecutionContext) -> Vec<String> {
        let mut rules = self.static_rules.clone();
        for dynamic in &self.dynamic_rules {
            rules.extend(dynamic(ctx));
        }
        if self.auto_rules {
            for (name, def) in self.schema.iter() {
                if let Some(description) = &def.description {
                    rules.push(format!("{name}: {description}"));
                }
            }
        }
        rules
    }

    /// Rules contributed by embeds present in `datum` (§4.4 step 6). Rule
    /// derivation only depends on the child presenter's declaration and
    /// context, never on the embedded datum's content, so embeds are only
    /// gated on key presence, not on re-validating the child value.
    fn embed_rules(&self, datum: &Value, ctx: &ExecutionContext) -> Vec<String> {
        let mut rules = Vec::new();
        for (key, child) in &self.embeds {
            if datum.get(key).is_some() {
                rules.extend(child.own_rules(ctx));
                if let Some(child_datum) = datum.get(key) {
                    rules.extend(child.embed_rules(child_datum, ctx));
                }
            }
        }
        rules
    }
}

fn select_fields(value: Value, select: &[String]) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.into_iter().filter(|(k, _)| select.iter().any(|s| s == k)).collect()),
        other => other,
    }
}

fn redact_path(value: &mut Value, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    redact_segments(value, &segments);
}

fn redact_segments(value: &mut Value, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        censor_at(value, head);
        return;
    }
    match value {
        Value::Object(map) => {
            if *head == "*" {
                for v in map.values_mut() {
                    redact_segments(v, rest);
                }
            } else if let Some(v) = map.get_mut(*head) {
                redact_segments(v, rest);
            }
        }
        Value::Array(arr) => {
            if *head == "*" {
                for v in arr.iter_mut() {
                    redact_segments(v, rest);
                }
            } else if let Ok(idx) = head.parse::<usize>() {
                if let Some(v) = arr.get_mut(idx) {
                    redact_segments(v, rest);
                }
            }
        }
        _ => {}
    }
}

fn censor_at(value: &mut Value, head: &str) {
    match value {
        Value::Object(map) => {
            if head == "*" {
                for v in map.values_mut() {
                    *v = Value::String(CENSOR.to_string());
                }
            } else if let Some(v) = map.get_mut(head) {
                *v = Value::String(CENSOR.to_string());
            }
        }
        Value::Array(arr) => {
            if head == "*" {
                for v in arr.iter_mut() {
                    *v = Value::String(CENSOR.to_string());
                }
            } else if let Ok(idx) = head.parse::<usize>() {
                if let Some(v) = arr.get_mut(idx) {
                    *v = Value::String(CENSOR.to_string());
                }
            }
        }
        _ => {}
    }
}

pub struct PresenterBuilder {
    name: String,
    schema: ParamSpec,
    static_rules: Vec<String>,
    dynamic_rules: Vec<DynamicRule>,
    auto_rules: bool,
    element_ui: Option<ElementUiBuilder>,
    collection_ui: Option<CollectionUiBuilder>,
    agent_limit: Option<AgentLimit>,
    redact_paths: Vec<String>,
    suggested_actions: Option<SuggestedActionsBuilder>,
    embeds: IndexMap<String, Arc<Presenter>>,
}

impl PresenterBuilder {
    pub fn new(name: impl Into<String>, schema: ParamSpec) -> Self {
        Self {
            name: name.into(),
            schema,
            static_rules: Vec::new(),
            dynamic_rules: Vec::new(),
            auto_rules: false,
            element_ui: None,
            collection_ui: None,
            agent_limit: None,
            redact_paths: Vec::new(),
            suggested_actions: None,
            embeds: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn rule(mut self, rule: impl Into<String>) -> Self {
        self.static_rules.push(rule.into());
        self
    }

    #[must_use]
    pub fn dynamic_rule(mut self, rule: DynamicRule) -> Self {
        self.dynamic_rules.push(rule);
        self
    }

    #[must_use]
    pub fn auto_rules(mut self, enabled: bool) -> Self {
        self.auto_rules = enabled;
        self
    }

    #[must_use]
    pub fn element_ui(mut self, builder: ElementUiBuilder) -> Self {
        self.element_ui = Some(builder);
        self
    }

    #[must_use]
    pub fn collection_ui(mut self, builder: CollectionUiBuilder) -> Self {
        self.collection_ui = Some(builder);
        self
    }

    #[must_use]
    pub fn agent_limit(mut self, limit: AgentLimit) -> Self {
        self.agent_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn redact(mut self, path: impl Into<String>) -> Self {
        self.redact_paths.push(path.into());
        self
    }

    #[must_use]
    pub fn suggested_actions(mut self, builder: SuggestedActionsBuilder) -> Self {
        self.suggested_actions = Some(builder);
        self
    }

    #[must_use]
    pub fn embed(mut self, key: impl Into<String>, presenter: Arc<Presenter>) -> Self {
        self.embeds.insert(key.into(), presenter);
        self
    }

    pub fn build(self) -> Presenter {
        Presenter {
            name: self.name,
            schema: self.schema,
            static_rules: self.static_rules,
            dynamic_rules: self.dynamic_rules,
            auto_rules: self.auto_rules,
            element_ui: self.element_ui,
            collection_ui: self.collection_ui,
            agent_limit: self.agent_limit,
            redact_paths: self.redact_paths,
            suggested_actions: self.suggested_actions,
            embeds: self.embeds,
        }
    }
}
