//! State-Sync policy engine (§4.6).
//!
//! Decorates tool descriptions with cache-control directives and responses
//! with causal invalidation markers, so the LLM client never has to guess
//! whether a result is still fresh. Resolution is glob-based over
//! dot-segmented tool names and is frozen at construction — see §5: "policy
//! cache ... internally synchronised single-writer / many-reader ... bounded
//! size (on overflow: clear-all)", which is why the lookup cache here is a
//! plain `RwLock<HashMap>` cleared wholesale rather than an LRU.

use crate::error::{KernelError, KernelResult};
use crate::response::ContentBlock;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

const MAX_CACHE_SIZE: usize = 2048;
const MAX_GLOB_ITERATIONS: usize = 1024;

fn segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\*{1,2}|[A-Za-z0-9_-]+)$").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheControl {
    NoStore,
    Immutable,
}

impl CacheControl {
    pub fn directive(self) -> &'static str {
        match self {
            CacheControl::NoStore => "no-store",
            CacheControl::Immutable => "immutable",
        }
    }

    pub fn parse(directive: &str) -> Option<Self> {
        match directive {
            "no-store" => Some(CacheControl::NoStore),
            "immutable" => Some(CacheControl::Immutable),
            _ => None,
        }
    }
}

/// A single entry: tools whose name matches `match_glob` get `cache_control`
/// and, on a successful call, a causal-invalidation marker naming
/// `invalidates`.
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    pub match_glob: String,
    pub cache_control: Option<CacheControl>,
    pub invalidates: Vec<String>,
}

impl SyncPolicy {
    pub fn new(match_glob: impl Into<String>) -> Self {
        Self {
            match_glob: match_glob.into(),
            cache_control: None,
            invalidates: Vec::new(),
        }
    }

    #[must_use]
    pub fn cache_control(mut self, control: CacheControl) -> Self {
        self.cache_control = Some(control);
        self
    }

    #[must_use]
    pub fn invalidates(mut self, domain: impl Into<String>) -> Self {
        self.invalidates.push(domain.into());
        self
    }

    fn validate(&self) -> KernelResult<()> {
        validate_glob(&self.match_glob)?;
        for domain in &self.invalidates {
            validate_glob(domain)?;
        }
        Ok(())
    }
}

fn validate_glob(glob: &str) -> KernelResult<()> {
    let pattern = segment_pattern();
    for segment in glob.split('.') {
        if !pattern.is_match(segment) {
            return Err(KernelError::PolicyConfig(format!(
                "invalid glob segment '{segment}' in '{glob}'"
            )));
        }
    }
    Ok(())
}

/// Resolves a tool name to the first policy (in registration order) whose
/// glob matches, falling back to `default`. Resolutions are cached; the
/// cache is cleared wholesale once it exceeds [`MAX_CACHE_SIZE`] rather than
/// evicted piecemeal (§4.6, §5).
pub struct PolicyEngine {
    policies: Vec<Arc<SyncPolicy>>,
    default: Option<Arc<SyncPolicy>>,
    cache: RwLock<HashMap<String, Option<Arc<SyncPolicy>>>>,
}

impl PolicyEngine {
    pub fn new(policies: Vec<SyncPolicy>, default: Option<SyncPolicy>) -> KernelResult<Self> {
        for policy in &policies {
            policy.validate()?;
        }
        if let Some(default) = &default {
            default.validate()?;
        }
        Ok(Self {
            policies: policies.into_iter().map(Arc::new).collect(),
            default: default.map(Arc::new),
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Rebuild an engine from the same policies and default but with a fresh,
    /// empty lookup cache. `PolicyEngine` holds a lock-guarded cache and so
    /// is not itself `Clone`; `KernelBuilder::finalize` uses this to produce
    /// an independent `Kernel` on every call (idempotence, Testable Property
    /// #7) without sharing cache state across instances.
    pub fn snapshot(&self) -> PolicyEngine {
        PolicyEngine {
            policies: self.policies.clone(),
            default: self.default.clone(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, tool_name: &str) -> Option<Arc<SyncPolicy>> {
        if let Some(cached) = self.cache.read().unwrap().get(tool_name) {
            return cached.clone();
        }

        let resolved = self
            .policies
            .iter()
            .find(|policy| match_glob(&policy.match_glob, tool_name))
            .cloned()
            .or_else(|| self.default.clone());

        let mut cache = self.cache.write().unwrap();
        if cache.len() >= MAX_CACHE_SIZE {
            cache.clear();
        }
        cache.insert(tool_name.to_string(), resolved.clone());
        resolved
    }
}

/// Iterative, bounded-backtracking glob match over dot-separated segments.
/// `*` matches exactly one segment; `**` matches zero or more segments.
pub fn match_glob(pattern: &str, name: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let name: Vec<&str> = name.split('.').collect();

    let (mut pi, mut ni) = (0, 0);
    let (mut star_p, mut star_n) = (None, 0);
    let mut iterations = 0;

    loop {
        iterations += 1;
        if iterations > MAX_GLOB_ITERATIONS {
            return false;
        }

        if pi < pattern.len() {
            let seg = pattern[pi];
            if seg == "**" {
                star_p = Some(pi);
                star_n = ni;
                pi += 1;
                continue;
            }
            if ni < name.len() && (seg == "*" || seg == name[ni]) {
                pi += 1;
                ni += 1;
                continue;
            }
        } else if ni == name.len() {
            return true;
        }

        if let Some(sp) = star_p {
            pi = sp + 1;
            star_n += 1;
            ni = star_n;
            if ni > name.len() {
                return false;
            }
            continue;
        }

        return false;
    }
}

/// Description decorator (§4.6): appends `[Cache-Control: <directive>]` to a
/// tool's description. Memoised by tool name since tool definitions are
/// immutable after `finalize()`.
pub struct DescriptionDecorator {
    cache: RwLock<HashMap<String, String>>,
}

impl Default for DescriptionDecorator {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptionDecorator {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn decorate(&self, tool_name: &str, description: &str, policy: Option<&SyncPolicy>) -> String {
        let Some(control) = policy.and_then(|p| p.cache_control) else {
            return description.to_string();
        };

        if let Some(cached) = self.cache.read().unwrap().get(tool_name) {
            return cached.clone();
        }

        let decorated = format!("{description} [Cache-Control: {}]", control.directive());
        self.cache.write().unwrap().insert(tool_name.to_string(), decorated.clone());
        decorated
    }
}

/// Response decorator (§4.6): prepends a `<cache_invalidation>` marker for
/// successful calls whose policy declares `invalidates`. Errors are never
/// decorated.
pub fn decorate_invalidation(tool_name: &str, policy: Option<&SyncPolicy>, is_error: bool) -> Option<ContentBlock> {
    if is_error {
        return None;
    }
    let policy = policy?;
    if policy.invalidates.is_empty() {
        return None;
    }
    Some(ContentBlock::cache_invalidation(tool_name, &policy.invalidates))
}

/// Host-facing, `serde`-deserialisable mirror of [`SyncPolicy`], in the same
/// `#[serde(default)]` style as the teacher's `config::schema::tools` structs
/// — a host embeds this in its own TOML/YAML/JSON config instead of building
/// policies in code.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncPolicyConfig {
    #[serde(rename = "match")]
    pub match_glob: String,
    #[serde(default)]
    pub cache_control: Option<String>,
    #[serde(default)]
    pub invalidates: Vec<String>,
}

impl TryFrom<SyncPolicyConfig> for SyncPolicy {
    type Error = KernelError;

    fn try_from(config: SyncPolicyConfig) -> Result<Self, Self::Error> {
        let mut policy = SyncPolicy::new(config.match_glob);
        if let Some(directive) = config.cache_control {
            let control = CacheControl::parse(&directive)
                .ok_or_else(|| KernelError::PolicyConfig(format!("unknown cache-control directive '{directive}'")))?;
            policy = policy.cache_control(control);
        }
        for domain in config.invalidates {
            policy = policy.invalidates(domain);
        }
        Ok(policy)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StateSyncConfig {
    #[serde(default)]
    pub policies: Vec<SyncPolicyConfig>,
    #[serde(default)]
    pub default: Option<SyncPolicyConfig>,
}

impl TryFrom<StateSyncConfig> for PolicyEngine {
    type Error = KernelError;

    fn try_from(config: StateSyncConfig) -> Result<Self, Self::Error> {
        let policies = config
            .policies
            .into_iter()
            .map(SyncPolicy::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let default = config.default.map(SyncPolicy::try_from).transpose()?;
        PolicyEngine::new(policies, default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_star_matches_everything() {
        assert!(match_glob("**", "a.b.c"));
    }

    #[test]
    fn single_star_matches_exactly_one_segment() {
        assert!(match_glob("a.*", "a.b"));
        assert!(!match_glob("a.*", "a.b.c"));
    }

    #[test]
    fn double_star_matches_zero_or_more_trailing_segments() {
        assert!(match_glob("a.**", "a.b.c.d"));
        assert!(match_glob("a.**", "a"));
    }

    #[test]
    fn literal_segments_must_match_exactly() {
        assert!(match_glob("orders.create", "orders.create"));
        assert!(!match_glob("orders.create", "orders.cancel"));
    }

    #[test]
    fn invalid_glob_segment_is_rejected_at_construction() {
        let err = SyncPolicy::new("orders!").validate().unwrap_err();
        assert!(matches!(err, KernelError::PolicyConfig(_)));
    }

    #[test]
    fn engine_resolves_first_matching_policy_in_order() {
        let engine = PolicyEngine::new(
            vec![
                SyncPolicy::new("orders.*").cache_control(CacheControl::NoStore),
                SyncPolicy::new("**").cache_control(CacheControl::Immutable),
            ],
            None,
        )
        .unwrap();
        let resolved = engine.resolve("orders.create").unwrap();
        assert_eq!(resolved.cache_control, Some(CacheControl::NoStore));
    }

    #[test]
    fn engine_falls_back_to_default() {
        let engine = PolicyEngine::new(vec![], Some(SyncPolicy::new("**").cache_control(CacheControl::Immutable))).unwrap();
        let resolved = engine.resolve("anything").unwrap();
        assert_eq!(resolved.cache_control, Some(CacheControl::Immutable));
    }

    #[test]
    fn engine_resolution_is_cached_and_reused() {
        let engine = PolicyEngine::new(vec![SyncPolicy::new("**").cache_control(CacheControl::NoStore)], None).unwrap();
        let first = engine.resolve("x");
        let second = engine.resolve("x");
        assert!(Arc::ptr_eq(first.as_ref().unwrap(), second.as_ref().unwrap()));
    }

    #[test]
    fn description_decorator_appends_directive_once_and_memoises() {
        let decorator = DescriptionDecorator::new();
        let policy = SyncPolicy::new("**").cache_control(CacheControl::Immutable);
        let decorated = decorator.decorate("orders", "manage orders", Some(&policy));
        assert_eq!(decorated, "manage orders [Cache-Control: immutable]");
        let again = decorator.decorate("orders", "manage orders", Some(&policy));
        assert_eq!(again, decorated);
    }

    #[test]
    fn description_decorator_passes_through_without_policy() {
        let decorator = DescriptionDecorator::new();
        assert_eq!(decorator.decorate("orders", "manage orders", None), "manage orders");
    }

    #[test]
    fn invalidation_marker_only_on_success_with_domains() {
        let policy = SyncPolicy::new("**").invalidates("orders").invalidates("inventory");
        let block = decorate_invalidation("orders", Some(&policy), false).unwrap();
        let text = block.as_text();
        assert!(text.contains("cause=\"orders\""));
        assert!(text.contains("orders, inventory"));

        assert!(decorate_invalidation("orders", Some(&policy), true).is_none());
    }

    #[test]
    fn invalidation_marker_absent_when_policy_declares_no_domains() {
        let policy = SyncPolicy::new("**");
        assert!(decorate_invalidation("orders", Some(&policy), false).is_none());
    }

    #[test]
    fn state_sync_config_builds_a_working_engine() {
        let json = serde_json::json!({
            "policies": [
                {"match": "orders.*", "cache_control": "no-store", "invalidates": ["orders"]}
            ],
            "default": {"match": "**", "cache_control": "immutable"}
        });
        let config: StateSyncConfig = serde_json::from_value(json).unwrap();
        let engine = PolicyEngine::try_from(config).unwrap();
        let resolved = engine.resolve("orders.create").unwrap();
        assert_eq!(resolved.cache_control, Some(CacheControl::NoStore));
        assert_eq!(resolved.invalidates, vec!["orders".to_string()]);
    }

    #[test]
    fn state_sync_config_rejects_unknown_directive() {
        let config = StateSyncConfig {
            policies: vec![SyncPolicyConfig {
                match_glob: "**".to_string(),
                cache_control: Some("sometimes".to_string()),
                invalidates: Vec::new(),
            }],
            default: None,
        };
        assert!(PolicyEngine::try_from(config).is_err());
    }
}
