//! Typed error hierarchy for the kernel.
//!
//! Use at module boundaries (registration, finalisation, policy construction).
//! Everything confined to a single `dispatch` call becomes a [`crate::response::WireResponse`]
//! instead — see [`crate::error::ErrorBuilder`] for that path. `KernelError` is
//! reserved for failures at *build time*: registration conflicts, field
//! incompatibilities, and policy configuration errors (kind 6 in the error
//! taxonomy), which are fatal at process startup rather than per-request.

use indexmap::IndexMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("action '{action}' is already registered on tool '{tool}'")]
    DuplicateAction { tool: String, action: String },

    #[error("prompt '{0}' is already registered")]
    DuplicatePrompt(String),

    #[error(
        "field compatibility conflict in tool '{tool}', parameter '{field}': {detail}"
    )]
    FieldConflict {
        tool: String,
        field: String,
        detail: String,
    },

    #[error("action '{tool}/{action}' has no handler")]
    MissingHandler { tool: String, action: String },

    #[error("policy configuration error: {0}")]
    PolicyConfig(String),

    #[error("presenter validation failed: {0}")]
    PresenterValidation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type KernelResult<T> = std::result::Result<T, KernelError>;

/// Severity of a structured error surfaced to the LLM. Only `Warning` is
/// non-fatal — it maps to `isError = false` so the caller can continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Critical,
}

impl Severity {
    fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// A structured error descriptor, rendered as a single `<tool_error>` text
/// block per §4.7.
#[derive(Debug, Clone)]
pub struct ErrorDescriptor {
    pub code: String,
    pub severity: Severity,
    pub message: String,
    pub suggestion: Option<String>,
    pub actions: Vec<String>,
    pub details: IndexMap<String, String>,
    pub retry_after: Option<u64>,
}

impl ErrorDescriptor {
    /// Per §4.7: `isError` is true except for severity `Warning`.
    pub fn is_error(&self) -> bool {
        self.severity != Severity::Warning
    }

    /// Render the compact XML-like envelope described in §4.7.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "<tool_error code=\"{}\" severity=\"{}\">",
            xml_escape(&self.code),
            self.severity.as_str()
        ));
        out.push_str(&format!("<message>{}</message>", xml_escape(&self.message)));
        if let Some(suggestion) = &self.suggestion {
            out.push_str(&format!("<recovery>{}</recovery>", xml_escape(suggestion)));
        }
        if !self.actions.is_empty() {
            out.push_str("<available_actions>");
            for action in &self.actions {
                out.push_str(&format!("<action>{}</action>", xml_escape(action)));
            }
            out.push_str("</available_actions>");
        }
        for (key, value) in &self.details {
            out.push_str(&format!(
                "<detail key=\"{}\">{}</detail>",
                xml_escape(key),
                xml_escape(value)
            ));
        }
        if let Some(retry_after) = self.retry_after {
            out.push_str(&format!("<retry_after>{} seconds</retry_after>", retry_after));
        }
        out.push_str("</tool_error>");
        out
    }
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Fluent builder for [`ErrorDescriptor`], mirroring the teacher's
/// `NanobotError` taxonomy but shaped for per-request (not process-level)
/// failures.
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    code: String,
    severity: Severity,
    message: String,
    suggestion: Option<String>,
    actions: Vec<String>,
    details: IndexMap<String, String>,
    retry_after: Option<u64>,
}

impl ErrorBuilder {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            severity: Severity::Error,
            message: message.into(),
            suggestion: None,
            actions: Vec::new(),
            details: IndexMap::new(),
            retry_after: None,
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    pub fn build(self) -> ErrorDescriptor {
        ErrorDescriptor {
            code: self.code,
            severity: self.severity,
            message: self.message,
            suggestion: self.suggestion,
            actions: self.actions,
            details: self.details,
            retry_after: self.retry_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_is_not_error() {
        let err = ErrorBuilder::new("rate_limit", "slow down")
            .severity(Severity::Warning)
            .build();
        assert!(!err.is_error());
    }

    #[test]
    fn error_and_critical_are_errors() {
        assert!(ErrorBuilder::new("x", "y").build().is_error());
        assert!(
            ErrorBuilder::new("x", "y")
                .severity(Severity::Critical)
                .build()
                .is_error()
        );
    }

    #[test]
    fn render_includes_all_fields() {
        let err = ErrorBuilder::new("unknown_tool", "no such tool 'foo'")
            .suggestion("call tools/list")
            .action("tools_list")
            .detail("tool", "foo")
            .retry_after(5)
            .build();
        let xml = err.render();
        assert!(xml.starts_with("<tool_error code=\"unknown_tool\" severity=\"error\">"));
        assert!(xml.contains("<message>no such tool 'foo'</message>"));
        assert!(xml.contains("<recovery>call tools/list</recovery>"));
        assert!(xml.contains("<action>tools_list</action>"));
        assert!(xml.contains("<detail key=\"tool\">foo</detail>"));
        assert!(xml.contains("<retry_after>5 seconds</retry_after>"));
        assert!(xml.ends_with("</tool_error>"));
    }

    #[test]
    fn render_escapes_xml_special_characters() {
        let err = ErrorBuilder::new("x", "a < b & c > d \"quoted\"").build();
        let xml = err.render();
        assert!(!xml.contains("a < b & c > d \"quoted\""));
        assert!(xml.contains("&lt;"));
        assert!(xml.contains("&amp;"));
        assert!(xml.contains("&gt;"));
        assert!(xml.contains("&quot;"));
    }
}
