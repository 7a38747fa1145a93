//! Wire response and content-block model (§3, §6).

use crate::error::ErrorDescriptor;
use serde::Serialize;
use serde_json::Value;

/// A single content block. The wire protocol only ever carries `text`
/// blocks (§6) — charts, diagrams, and fenced code are conventions layered
/// on top via the constructors below, not distinct wire types.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Raw markdown — same wire shape as `text`, named for call-site clarity.
    pub fn markdown(text: impl Into<String>) -> Self {
        ContentBlock::text(text)
    }

    pub fn mermaid(diagram: impl AsRef<str>) -> Self {
        ContentBlock::text(format!("```mermaid\n{}\n```", diagram.as_ref()))
    }

    /// `echarts` configuration block (§6 chart convention).
    pub fn echart(config: &Value) -> Self {
        let json = serde_json::to_string_pretty(config).unwrap_or_else(|_| "{}".to_string());
        ContentBlock::text(format!("```echarts\n{}\n```", json))
    }

    pub fn code(language: impl AsRef<str>, code: impl AsRef<str>) -> Self {
        ContentBlock::text(format!("```{}\n{}\n```", language.as_ref(), code.as_ref()))
    }

    /// `[SYSTEM_RULES]` block (§4.4 step 5.4).
    pub fn system_rules(rules: &[String]) -> Self {
        let mut out = String::from("[SYSTEM_RULES]\n");
        for rule in rules {
            out.push_str("- ");
            out.push_str(rule);
            out.push('\n');
        }
        ContentBlock::text(out)
    }

    /// `[DOMAIN RULES]` block (§6, error builder recovery).
    pub fn domain_rules(rules: &[String]) -> Self {
        let mut out = String::from("[DOMAIN RULES]\n");
        for rule in rules {
            out.push_str("- ");
            out.push_str(rule);
            out.push('\n');
        }
        ContentBlock::text(out)
    }

    /// `<cache_invalidation .../>` marker block (§4.6).
    pub fn cache_invalidation(cause: &str, domains: &[String]) -> Self {
        ContentBlock::text(format!(
            "<cache_invalidation cause=\"{}\" domains=\"{}\" />",
            cause,
            domains.join(", ")
        ))
    }

    pub fn as_text(&self) -> &str {
        match self {
            ContentBlock::Text { text } => text,
        }
    }
}

/// The structured payload returned from `dispatch` (§3, §6).
#[derive(Debug, Clone, Serialize, Default)]
pub struct WireResponse {
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl WireResponse {
    pub fn new(content: Vec<ContentBlock>) -> Self {
        Self {
            content,
            is_error: false,
            structured_content: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![ContentBlock::text(text)])
    }

    pub fn with_structured(mut self, value: Value) -> Self {
        self.structured_content = Some(value);
        self
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: true,
            structured_content: None,
        }
    }

    /// Build a wire response from a structured error descriptor (§4.7).
    pub fn from_error(descriptor: &ErrorDescriptor) -> Self {
        Self {
            content: vec![ContentBlock::text(descriptor.render())],
            is_error: descriptor.is_error(),
            structured_content: None,
        }
    }

    /// Prepend a content block without mutating in place — the kernel never
    /// rewrites a response after it has been handed back (DESIGN NOTES:
    /// "decorator prepends content block" becomes an immutable rebuild).
    #[must_use]
    pub fn with_prepended(mut self, block: ContentBlock) -> Self {
        self.content.insert(0, block);
        self
    }
}
