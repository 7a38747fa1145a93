//! Registry & exposition compiler (§4.1) and kernel entry point.
//!
//! Tools are registered in a *building* phase (`KernelBuilder`), then
//! [`KernelBuilder::finalize`] projects them onto a routing table in one of
//! two exposition modes, compiling each action's middleware chain once.
//! After finalisation the [`Kernel`] is read-only and safe for unsynchronised
//! concurrent reads (§5).

use crate::error::{KernelError, KernelResult};
use crate::middleware::compile_chain;
use crate::observability::{KernelObserver, NullKernelObserver};
use crate::policy::{DescriptionDecorator, PolicyEngine};
use crate::presenter::Presenter;
use crate::prompts::PromptRegistry;
use crate::schema::{check_field_compatibility, to_json_schema, ParamDef, ParamSpec};
use crate::tool::{ActionAnnotations, ToolDef};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// How a tool's actions are projected onto routes (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exposition {
    Flat,
    Grouped,
}

impl Default for Exposition {
    fn default() -> Self {
        Exposition::Flat
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub exposition: Exposition,
    pub action_separator: String,
    pub discriminator_field: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            exposition: Exposition::Flat,
            action_separator: "_".to_string(),
            discriminator_field: "action".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ToolAnnotations {
    #[serde(rename = "readOnlyHint")]
    pub read_only_hint: bool,
    #[serde(rename = "destructiveHint")]
    pub destructive_hint: bool,
    #[serde(rename = "idempotentHint")]
    pub idempotent_hint: bool,
}

impl From<ActionAnnotations> for ToolAnnotations {
    fn from(a: ActionAnnotations) -> Self {
        Self {
            read_only_hint: a.read_only,
            destructive_hint: a.destructive,
            idempotent_hint: a.idempotent,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    pub annotations: ToolAnnotations,
}

/// A single action, compiled: its frozen middleware chain, merged input
/// schema, and everything the pipeline needs to dispatch a call.
pub struct CompiledAction {
    pub tool_name: String,
    pub action_key: String,
    pub schema: ParamSpec,
    pub chain: crate::middleware::NextFn,
    pub presenter: Option<Arc<Presenter>>,
    pub annotations: ActionAnnotations,
    pub cacheable: bool,
}

pub enum RouteKind {
    Flat(Arc<CompiledAction>),
    Grouped {
        discriminator_field: String,
        actions: IndexMap<String, Arc<CompiledAction>>,
    },
}

pub struct CompiledRoute {
    pub tool_name: String,
    pub kind: RouteKind,
}

/// The finalised, read-only kernel (§3 lifecycle, §5).
pub struct Kernel {
    pub(crate) routes: IndexMap<String, CompiledRoute>,
    pub(crate) descriptors: Vec<ToolDescriptor>,
    pub(crate) policy: Option<PolicyEngine>,
    pub(crate) description_decorator: DescriptionDecorator,
    pub(crate) prompts: PromptRegistry,
    pub(crate) observer: Arc<dyn KernelObserver>,
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Kernel {
    pub fn list(&self, filter: Option<&str>) -> Vec<ToolDescriptor> {
        self.descriptors
            .iter()
            .filter(|d| filter.is_none_or(|f| d.name.contains(f)))
            .map(|d| self.decorate_descriptor(d))
            .collect()
    }

    fn decorate_descriptor(&self, descriptor: &ToolDescriptor) -> ToolDescriptor {
        let Some(policy) = &self.policy else {
            return descriptor.clone();
        };
        let resolved = policy.resolve(&descriptor.name);
        let description = self
            .description_decorator
            .decorate(&descriptor.name, &descriptor.description, resolved.as_deref());
        ToolDescriptor {
            description,
            ..descriptor.clone()
        }
    }

    pub fn prompts(&self) -> &PromptRegistry {
        &self.prompts
    }
}

pub struct KernelBuilder {
    config: KernelConfig,
    tools: Vec<ToolDef>,
    tool_names: std::collections::HashSet<String>,
    policy_engine: Option<PolicyEngine>,
    prompts: PromptRegistry,
    observer: Arc<dyn KernelObserver>,
}

impl KernelBuilder {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            config,
            tools: Vec::new(),
            tool_names: std::collections::HashSet::new(),
            policy_engine: None,
            prompts: PromptRegistry::new(),
            observer: Arc::new(NullKernelObserver),
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn KernelObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn register_tool(&mut self, tool: ToolDef) -> KernelResult<()> {
        if !self.tool_names.insert(tool.name.clone()) {
            return Err(KernelError::DuplicateTool(tool.name));
        }
        debug!(tool = %tool.name, actions = tool.actions.len(), "registered tool");
        self.tools.push(tool);
        Ok(())
    }

    #[must_use]
    pub fn with_policy_engine(mut self, engine: PolicyEngine) -> Self {
        self.policy_engine = Some(engine);
        self
    }

    pub fn prompts_mut(&mut self) -> &mut PromptRegistry {
        &mut self.prompts
    }

    /// Compile the routing table. Takes `&self` rather than consuming the
    /// builder so it can be called twice and return a structurally identical
    /// `Kernel` both times (Testable Property #7) without the caller having
    /// to keep a spare clone of the builder around.
    pub fn finalize(&self) -> KernelResult<Kernel> {
        let mut routes = IndexMap::new();
        let mut descriptors = Vec::new();

        for tool in &self.tools {
            check_field_compatibility_across_actions(tool)?;

            match self.config.exposition {
                Exposition::Flat => {
                    for action in &tool.actions {
                        let route_name = format!("{}{}{}", tool.name, self.config.action_separator, action.key);
                        let schema = action.params.merged_with(&tool.common_params, &action.excluded_common);
                        let chain = compile_chain(&tool.global_middleware, &action.middleware, action.handler.clone());
                        let compiled = Arc::new(CompiledAction {
                            tool_name: tool.name.clone(),
                            action_key: action.key.clone(),
                            schema: schema.clone(),
                            chain,
                            presenter: action.presenter.clone(),
                            annotations: action.annotations,
                            cacheable: action.cacheable,
                        });
                        descriptors.push(ToolDescriptor {
                            name: route_name.clone(),
                            description: format!("{} — {}", tool.description, action.description),
                            input_schema: to_json_schema(&schema),
                            annotations: action.annotations.into(),
                        });
                        routes.insert(
                            route_name,
                            CompiledRoute {
                                tool_name: tool.name.clone(),
                                kind: RouteKind::Flat(compiled),
                            },
                        );
                    }
                }
                Exposition::Grouped => {
                    let mut actions = IndexMap::new();
                    for action in &tool.actions {
                        let schema = action.params.merged_with(&tool.common_params, &action.excluded_common);
                        let chain = compile_chain(&tool.global_middleware, &action.middleware, action.handler.clone());
                        actions.insert(
                            action.key.clone(),
                            Arc::new(CompiledAction {
                                tool_name: tool.name.clone(),
                                action_key: action.key.clone(),
                                schema,
                                chain,
                                presenter: action.presenter.clone(),
                                annotations: action.annotations,
                                cacheable: action.cacheable,
                            }),
                        );
                    }

                    let grouped_schema = build_grouped_schema(tool, &self.config.discriminator_field);
                    let aggregate = aggregate_annotations(tool);
                    descriptors.push(ToolDescriptor {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        input_schema: to_json_schema(&grouped_schema),
                        annotations: aggregate.into(),
                    });
                    routes.insert(
                        tool.name.clone(),
                        CompiledRoute {
                            tool_name: tool.name.clone(),
                            kind: RouteKind::Grouped {
                                discriminator_field: self.config.discriminator_field.clone(),
                                actions,
                            },
                        },
                    );
                }
            }
        }

        Ok(Kernel {
            routes,
            descriptors,
            policy: self.policy_engine.as_ref().map(clone_policy_engine),
            description_decorator: DescriptionDecorator::new(),
            prompts: self.prompts.clone(),
            observer: self.observer.clone(),
        })
    }
}

/// `PolicyEngine` holds a lock-guarded cache, so it is not `Clone`; finalize
/// may run more than once (idempotence), so each call gets a fresh engine
/// built from the same configuration rather than sharing state across
/// `Kernel` instances.
fn clone_policy_engine(engine: &PolicyEngine) -> PolicyEngine {
    engine.snapshot()
}

fn check_field_compatibility_across_actions(tool: &ToolDef) -> KernelResult<()> {
    let mut seen: IndexMap<&str, &ParamDef> = IndexMap::new();
    for (name, def) in tool.common_params.iter() {
        seen.insert(name.as_str(), def);
    }
    for action in &tool.actions {
        for (name, def) in action.params.iter() {
            match seen.get(name.as_str()) {
                Some(existing) => {
                    if let Err(detail) = check_field_compatibility(existing, def) {
                        return Err(KernelError::FieldConflict {
                            tool: tool.name.clone(),
                            field: name.clone(),
                            detail,
                        });
                    }
                }
                None => {
                    seen.insert(name.as_str(), def);
                }
            }
        }
    }
    Ok(())
}

fn build_grouped_schema(tool: &ToolDef, discriminator_field: &str) -> ParamSpec {
    let action_keys: Vec<String> = tool.actions.iter().map(|a| a.key.clone()).collect();
    let mut schema = ParamSpec::new().with(
        discriminator_field,
        ParamDef::new(crate::schema::ParamType::enum_of(action_keys.clone()))
            .describe("selects which action of this tool to run"),
    );

    for (name, def) in tool.common_params.iter() {
        schema = schema.with(name.clone(), def.clone());
    }

    let mut required_in: IndexMap<String, Vec<String>> = IndexMap::new();
    let mut optional_in: IndexMap<String, Vec<String>> = IndexMap::new();
    let mut defs: IndexMap<String, ParamDef> = IndexMap::new();

    for action in &tool.actions {
        for (name, def) in action.params.iter() {
            if tool.common_params.contains(name) {
                continue;
            }
            defs.entry(name.clone()).or_insert_with(|| def.clone());
            if def.optional {
                optional_in.entry(name.clone()).or_default().push(action.key.clone());
            } else {
                required_in.entry(name.clone()).or_default().push(action.key.clone());
            }
        }
    }

    for (name, def) in defs {
        let required = required_in.get(&name).cloned().unwrap_or_default();
        let optional = optional_in.get(&name).cloned().unwrap_or_default();
        let note = if required.len() == tool.actions.len() && optional.is_empty() {
            "(always required)".to_string()
        } else {
            let mut parts = Vec::new();
            if !required.is_empty() {
                parts.push(format!("Required for: {}", required.join(",")));
            }
            if !optional.is_empty() {
                parts.push(format!("For: {}", optional.join(",")));
            }
            parts.join("; ")
        };
        let description = match &def.description {
            Some(existing) => format!("{existing} ({note})"),
            None => note,
        };
        schema = schema.with(name, def.optional().describe(description));
    }

    schema
}

fn aggregate_annotations(tool: &ToolDef) -> ActionAnnotations {
    ActionAnnotations {
        read_only: tool.actions.iter().all(|a| a.annotations.read_only),
        destructive: tool.actions.iter().any(|a| a.annotations.destructive),
        idempotent: tool.actions.iter().all(|a| a.annotations.idempotent),
    }
}
