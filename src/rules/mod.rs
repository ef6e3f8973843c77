//! Compiled link rules and the per-workspace store that holds them.
//!
//! A [`RuleSet`] is immutable once built. The [`RuleStore`] hands out
//! `Arc` snapshots and replaces a workspace's whole set on reload, so an
//! extraction pass always sees one consistent set of rules even if a reload
//! lands in the middle of it.

mod loader;

pub use loader::{
    base_config, create_base_config, find_config_file, is_config_file, ConfigFormat,
    ConfigLoader, FileConfigLoader, LoadError, CONFIG_EXTENSIONS, CONFIG_FILE_STEM,
};

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::handler::LinkHandler;
use crate::path_filter::PathFilter;
use crate::scanner::Pattern;

/// One validated configuration entry.
#[derive(Clone)]
pub struct LinkRule {
    index: usize,
    filter: PathFilter,
    patterns: Vec<Pattern>,
    handler_name: String,
    handler: Arc<dyn LinkHandler>,
}

impl LinkRule {
    pub fn new(
        index: usize,
        filter: PathFilter,
        patterns: Vec<Pattern>,
        handler_name: String,
        handler: Arc<dyn LinkHandler>,
    ) -> Self {
        LinkRule {
            index,
            filter,
            patterns,
            handler_name,
            handler,
        }
    }

    /// Position of the rule in the configuration's `links` array.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    pub fn handler(&self) -> &dyn LinkHandler {
        self.handler.as_ref()
    }

    pub fn applies_to(&self, relative_path: &str) -> bool {
        self.filter.is_eligible(relative_path)
    }
}

impl fmt::Debug for LinkRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkRule")
            .field("index", &self.index)
            .field(
                "patterns",
                &self.patterns.iter().map(Pattern::as_str).collect::<Vec<_>>(),
            )
            .field("handler", &self.handler_name)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<LinkRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<LinkRule>) -> Self {
        RuleSet { rules }
    }

    pub fn rules(&self) -> &[LinkRule] {
        &self.rules
    }

    /// Rules applying to `relative_path`, in declaration order.
    pub fn eligible<'a>(&'a self, relative_path: &'a str) -> impl Iterator<Item = &'a LinkRule> {
        self.rules
            .iter()
            .filter(move |rule| rule.applies_to(relative_path))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Rule sets keyed by workspace root.
#[derive(Debug, Default)]
pub struct RuleStore {
    sets: RwLock<HashMap<PathBuf, Arc<RuleSet>>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current rule set of `root`.
    pub fn snapshot(&self, root: &Path) -> Option<Arc<RuleSet>> {
        self.sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(root)
            .cloned()
    }

    /// Replaces the whole rule set of `root`.
    pub fn replace(&self, root: &Path, rules: RuleSet) {
        self.sets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(root.to_path_buf(), Arc::new(rules));
    }

    pub fn remove(&self, root: &Path) -> bool {
        self.sets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(root)
            .is_some()
    }

    pub fn roots(&self) -> Vec<PathBuf> {
        self.sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerRegistry;
    use crate::test_utils::rule_set;
    use serde_json::json;

    fn handlers() -> HandlerRegistry {
        let mut handlers = HandlerRegistry::new();
        handlers.register_fn("h", |_ctx| Ok(json!({"target": "https://x"})));
        handlers
    }

    #[test]
    fn test_eligible_keeps_declaration_order() {
        let rules = rule_set(
            &handlers(),
            json!({"links": [
                {"include": "**/*.rs", "pattern": "a", "handle": "h"},
                {"include": "**/*.md", "pattern": "b", "handle": "h"},
                {"pattern": "c", "handle": "h"}
            ]}),
        );

        let indices: Vec<_> = rules.eligible("src/lib.rs").map(LinkRule::index).collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let store = RuleStore::new();
        let root = Path::new("/ws");
        store.replace(root, rule_set(&handlers(), json!({"links": [{"pattern": "a", "handle": "h"}]})));

        let before = store.snapshot(root).unwrap();
        store.replace(root, RuleSet::default());
        let after = store.snapshot(root).unwrap();

        assert_eq!(before.len(), 1, "old snapshot is untouched by the swap");
        assert!(after.is_empty());
    }

    #[test]
    fn test_remove_and_roots() {
        let store = RuleStore::new();
        store.replace(Path::new("/a"), RuleSet::default());
        store.replace(Path::new("/b"), RuleSet::default());

        let mut roots = store.roots();
        roots.sort();
        assert_eq!(roots, vec![PathBuf::from("/a"), PathBuf::from("/b")]);

        assert!(store.remove(Path::new("/a")));
        assert!(!store.remove(Path::new("/a")));
        assert!(store.snapshot(Path::new("/a")).is_none());
    }

    #[test]
    fn test_rule_debug_lists_patterns_and_handler() {
        let rules = rule_set(&handlers(), json!({"links": [{"pattern": ["a", "b+"], "handle": "h"}]}));
        assert_eq!(
            format!("{:?}", rules.rules()[0]),
            r#"LinkRule { index: 0, patterns: ["a", "b+"], handler: "h" }"#
        );
    }
}
