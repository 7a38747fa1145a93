//! Prompt registry (§2): reusable, parameterised message templates — the
//! symmetric counterpart to the tool registry, but rendering plain text
//! instead of dispatching a handler.

use crate::error::{KernelError, KernelResult};
use indexmap::IndexMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PromptArgDef {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl PromptArgDef {
    pub fn new(name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required,
        }
    }
}

pub type PromptRenderFn = Arc<dyn Fn(&IndexMap<String, String>) -> KernelResult<String> + Send + Sync>;

#[derive(Clone)]
pub struct PromptDef {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgDef>,
    pub render: PromptRenderFn,
}

impl PromptDef {
    pub fn new(name: impl Into<String>, description: impl Into<String>, render: PromptRenderFn) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            arguments: Vec::new(),
            render,
        }
    }

    #[must_use]
    pub fn argument(mut self, arg: PromptArgDef) -> Self {
        self.arguments.push(arg);
        self
    }
}

#[derive(Clone, Default)]
pub struct PromptRegistry {
    prompts: IndexMap<String, PromptDef>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, prompt: PromptDef) -> KernelResult<()> {
        if self.prompts.contains_key(&prompt.name) {
            return Err(KernelError::DuplicatePrompt(prompt.name));
        }
        self.prompts.insert(prompt.name.clone(), prompt);
        Ok(())
    }

    pub fn list(&self) -> impl Iterator<Item = &PromptDef> {
        self.prompts.values()
    }

    pub fn render(&self, name: &str, args: &IndexMap<String, String>) -> KernelResult<String> {
        let prompt = self
            .prompts
            .get(name)
            .ok_or_else(|| KernelError::PolicyConfig(format!("no such prompt '{name}'")))?;
        for arg in &prompt.arguments {
            if arg.required && !args.contains_key(&arg.name) {
                return Err(KernelError::PolicyConfig(format!(
                    "prompt '{name}' missing required argument '{}'",
                    arg.name
                )));
            }
        }
        (prompt.render)(args)
    }
}
