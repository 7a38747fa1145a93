//! Tool and action declarations (§3, §4.1).
//!
//! A [`ToolDef`] groups one or more [`ActionDef`]s under a shared name,
//! common parameters, and tool-global middleware; [`KernelBuilder`]
//! (`crate::registry`) compiles a set of `ToolDef`s into a routing table.

use crate::error::{KernelError, KernelResult};
use crate::handler::Handler;
use crate::middleware::Middleware;
use crate::presenter::Presenter;
use crate::schema::{ParamDef, ParamSpec};
use std::sync::Arc;

/// Annotation hints surfaced on a tool descriptor (§6): whether a call reads
/// without side effects, whether it is destructive, and whether repeating it
/// with the same arguments is safe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionAnnotations {
    pub read_only: bool,
    pub destructive: bool,
    pub idempotent: bool,
}

pub struct ActionDef {
    pub key: String,
    pub description: String,
    pub params: ParamSpec,
    pub excluded_common: Vec<String>,
    pub middleware: Vec<Arc<dyn Middleware>>,
    pub presenter: Option<Arc<Presenter>>,
    pub annotations: ActionAnnotations,
    pub cacheable: bool,
    pub handler: Handler,
}

impl std::fmt::Debug for ActionDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDef")
            .field("key", &self.key)
            .field("description", &self.description)
            .field("annotations", &self.annotations)
            .field("cacheable", &self.cacheable)
            .finish()
    }
}

pub struct ActionBuilder {
    key: String,
    description: String,
    params: ParamSpec,
    excluded_common: Vec<String>,
    middleware: Vec<Arc<dyn Middleware>>,
    presenter: Option<Arc<Presenter>>,
    annotations: ActionAnnotations,
    cacheable: bool,
    handler: Option<Handler>,
}

impl ActionBuilder {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
            params: ParamSpec::new(),
            excluded_common: Vec::new(),
            middleware: Vec::new(),
            presenter: None,
            annotations: ActionAnnotations::default(),
            cacheable: false,
            handler: None,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, def: ParamDef) -> Self {
        self.params = self.params.with(name, def);
        self
    }

    /// Opt this action out of a tool-level common parameter by name.
    #[must_use]
    pub fn exclude_common(mut self, name: impl Into<String>) -> Self {
        self.excluded_common.push(name.into());
        self
    }

    #[must_use]
    pub fn middleware(mut self, mw: Arc<dyn Middleware>) -> Self {
        self.middleware.push(mw);
        self
    }

    #[must_use]
    pub fn presenter(mut self, presenter: Arc<Presenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.annotations.read_only = true;
        self
    }

    #[must_use]
    pub fn destructive(mut self) -> Self {
        self.annotations.destructive = true;
        self
    }

    #[must_use]
    pub fn idempotent(mut self) -> Self {
        self.annotations.idempotent = true;
        self
    }

    #[must_use]
    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }

    #[must_use]
    pub fn handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn build(self) -> KernelResult<ActionDef> {
        let handler = self
            .handler
            .ok_or_else(|| KernelError::MissingHandler {
                tool: String::new(),
                action: self.key.clone(),
            })?;
        Ok(ActionDef {
            key: self.key,
            description: self.description,
            params: self.params,
            excluded_common: self.excluded_common,
            middleware: self.middleware,
            presenter: self.presenter,
            annotations: self.annotations,
            cacheable: self.cacheable,
            handler,
        })
    }
}

pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub common_params: ParamSpec,
    pub actions: Vec<ActionDef>,
    pub global_middleware: Vec<Arc<dyn Middleware>>,
    pub tags: Vec<String>,
}

impl std::fmt::Debug for ToolDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDef")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("actions", &self.actions)
            .field("tags", &self.tags)
            .finish()
    }
}

pub struct ToolBuilder {
    name: String,
    description: String,
    common_params: ParamSpec,
    actions: Vec<ActionDef>,
    global_middleware: Vec<Arc<dyn Middleware>>,
    tags: Vec<String>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            common_params: ParamSpec::new(),
            actions: Vec::new(),
            global_middleware: Vec::new(),
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn common_param(mut self, name: impl Into<String>, def: ParamDef) -> Self {
        self.common_params = self.common_params.with(name, def);
        self
    }

    #[must_use]
    pub fn global_middleware(mut self, mw: Arc<dyn Middleware>) -> Self {
        self.global_middleware.push(mw);
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn action(mut self, action: ActionDef) -> Self {
        self.actions.push(action);
        self
    }

    pub fn build(self) -> KernelResult<ToolDef> {
        let mut seen = std::collections::HashSet::new();
        for action in &self.actions {
            if !seen.insert(action.key.clone()) {
                return Err(KernelError::DuplicateAction {
                    tool: self.name.clone(),
                    action: action.key.clone(),
                });
            }
        }
        Ok(ToolDef {
            name: self.name,
            description: self.description,
            common_params: self.common_params,
            actions: self.actions,
            global_middleware: self.global_middleware,
            tags: self.tags,
        })
    }
}
