//! The host-facing entry point.
//!
//! [`LinkEngine`] bundles the state the core needs across calls: the rule
//! sets of every workspace root, the button token map, the registered
//! handlers and the diagnostic sink. Hosts create one engine and pass it to
//! whatever serves their documents; nothing here lives in a global.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use pathdiff::diff_paths;
use serde_json::Value;

use crate::buttons::{self, ButtonTokens, LinkButton, PresentableButton};
use crate::config::Settings;
use crate::diagnostics::DiagnosticSink;
use crate::extract::{self, LinkDescriptor};
use crate::handler::{self, HandlerRegistry};
use crate::resolve::{self, ContentLoader};
use crate::rules::{ConfigLoader, RuleStore};
use crate::schema::{self, ValidationError};

pub struct LinkEngine {
    settings: Settings,
    handlers: HandlerRegistry,
    rules: RuleStore,
    tokens: ButtonTokens,
    sink: Arc<dyn DiagnosticSink>,
}

impl LinkEngine {
    pub fn new(settings: Settings, handlers: HandlerRegistry, sink: Arc<dyn DiagnosticSink>) -> Self {
        LinkEngine {
            settings,
            handlers,
            rules: RuleStore::new(),
            tokens: ButtonTokens::new(),
            sink,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub fn tokens(&self) -> &ButtonTokens {
        &self.tokens
    }

    pub fn sink(&self) -> &dyn DiagnosticSink {
        self.sink.as_ref()
    }

    /// Reloads the rules of `root` through `loader`.
    ///
    /// A workspace without a configuration file loses its rules. A file
    /// that fails to load or validate leaves the previous rules in place.
    /// Returns whether the rules of `root` changed.
    pub async fn reload<C>(&self, root: &Path, loader: &C) -> bool
    where
        C: ConfigLoader,
    {
        match loader.load(root).await {
            Ok(Some(raw)) => self.apply_config(root, &raw).is_ok(),
            Ok(None) => {
                log::debug!("No link configuration in {}", root.display());
                self.rules.remove(root)
            }
            Err(err) => {
                self.sink.error(&err.to_string());
                false
            }
        }
    }

    /// Validates `raw` and, if it is valid, swaps it in as the rules of `root`.
    pub fn apply_config(&self, root: &Path, raw: &Value) -> Result<(), ValidationError> {
        match schema::validate(raw, &self.handlers, &self.settings) {
            Ok(rules) => {
                let count = rules.len();
                self.rules.replace(root, rules);
                self.sink.info(&format!(
                    "Config in workspace \"{}\" loaded ({count} rules)",
                    root.display()
                ));
                Ok(())
            }
            Err(err) => {
                let kept = if self.rules.snapshot(root).is_some() {
                    "; keeping the previous rules"
                } else {
                    ""
                };
                self.sink.error(&format!(
                    "Invalid config in workspace \"{}\"{kept}:\n{}",
                    root.display(),
                    err.violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
                ));
                Err(err)
            }
        }
    }

    /// Forgets a workspace root that was closed.
    pub fn remove_root(&self, root: &Path) -> bool {
        self.rules.remove(root)
    }

    /// The loaded workspace root containing `path`, preferring the deepest.
    pub fn workspace_root_for(&self, path: &Path) -> Option<PathBuf> {
        self.rules
            .roots()
            .into_iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
    }

    /// Links in a document of the workspace at `workspace_root`.
    ///
    /// `document_path` may be absolute or relative to the workspace root.
    pub fn extract_links(
        &self,
        document_path: &Path,
        text: &str,
        workspace_root: &Path,
    ) -> Vec<LinkDescriptor> {
        let Some(rules) = self.rules.snapshot(workspace_root) else {
            self.sink.error(&format!(
                "No valid config loaded in workspace \"{}\"",
                workspace_root.display()
            ));
            return Vec::new();
        };

        let relative = if document_path.is_absolute() {
            diff_paths(document_path, workspace_root)
        } else {
            Some(document_path.to_path_buf())
        };
        let Some(relative) = relative.filter(|relative| !relative.is_absolute()) else {
            self.sink.warn(&format!(
                "Can't make \"{}\" relative to workspace \"{}\"; no links extracted",
                document_path.display(),
                workspace_root.display()
            ));
            return Vec::new();
        };
        if matches!(relative.components().next(), Some(Component::ParentDir)) {
            log::debug!(
                "{} is outside workspace {}",
                document_path.display(),
                workspace_root.display()
            );
            return Vec::new();
        }

        extract::extract(
            &rules,
            &relative.to_string_lossy(),
            text,
            workspace_root,
            self.sink.as_ref(),
            self.settings.max_matches_per_rule,
        )
    }

    /// Resolves a deferred link at activation time.
    pub async fn resolve_link<L>(&self, descriptor: LinkDescriptor, loader: &L) -> LinkDescriptor
    where
        L: ContentLoader,
    {
        resolve::resolve(descriptor, loader, self.sink.as_ref()).await
    }

    pub fn materialize_buttons(&self, buttons: &[LinkButton]) -> Vec<PresentableButton> {
        buttons::materialize(buttons, &self.tokens)
    }

    /// Runs the callback behind a button token. Each token works once.
    pub fn dispatch_action(&self, token: &str) -> bool {
        let Some(action) = self.tokens.take(token) else {
            self.sink
                .warn(&format!("Unknown or already used button token \"{token}\""));
            return false;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| action.call())) {
            Ok(()) => true,
            Err(payload) => {
                self.sink.error(&format!(
                    "Button action panicked: {}",
                    handler::panic_message(payload.as_ref())
                ));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Level;
    use crate::rules::{FileConfigLoader, LinkRule};
    use crate::test_utils::{create_test_workspace, RecordingSink};
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine(sink: Arc<RecordingSink>) -> LinkEngine {
        let mut handlers = HandlerRegistry::new();
        handlers.register_fn("issue", |ctx| {
            Ok(json!({
                "target": format!("https://tracker/{}", ctx.link_text()),
                "buttons": [{"title": "Log", "action": ctx.action(|| {})}]
            }))
        });
        LinkEngine::new(Settings::default(), handlers, sink)
    }

    #[test]
    fn test_extract_without_config_logs_error() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine(sink.clone());

        let links = engine.extract_links(Path::new("a.txt"), "#1", Path::new("/ws"));

        assert!(links.is_empty());
        assert!(sink.contains("No valid config loaded"));
    }

    #[test]
    fn test_apply_config_and_extract_absolute_path() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine(sink.clone());
        let root = Path::new("/ws");
        engine
            .apply_config(root, &json!({"links": [{"include": "src/**", "pattern": r"#(?<link>\d+)", "handle": "issue"}]}))
            .unwrap();

        let links = engine.extract_links(Path::new("/ws/src/main.rs"), "fix #12 and #7", root);

        let targets: Vec<_> = links
            .iter()
            .filter_map(|link| link.resolved_target().map(|url| url.to_string()))
            .collect();
        assert_eq!(targets, vec!["https://tracker/12", "https://tracker/7"]);
        assert_eq!(links[0].range, 5..7);
    }

    #[test]
    fn test_document_outside_root_gets_no_links() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine(sink.clone());
        let root = Path::new("/ws");
        engine
            .apply_config(root, &json!({"links": [{"pattern": "ok", "handle": "issue"}]}))
            .unwrap();

        assert!(engine
            .extract_links(Path::new("/elsewhere/a.txt"), "ok ok", root)
            .is_empty());
        assert!(engine
            .extract_links(Path::new("../elsewhere/a.txt"), "ok", root)
            .is_empty());
        assert_eq!(
            engine.extract_links(Path::new("/ws/a.txt"), "ok ok", root).len(),
            2
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn test_unrelatable_document_path_warns() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine(sink.clone());
        let root = Path::new("ws");
        engine
            .apply_config(root, &json!({"links": [{"pattern": "ok", "handle": "issue"}]}))
            .unwrap();

        let links = engine.extract_links(Path::new("/abs/a.txt"), "ok", root);

        assert!(links.is_empty());
        assert_eq!(sink.count(Level::Warn), 1);
        assert!(sink.contains("Can't make \"/abs/a.txt\" relative"));
    }

    #[test]
    fn test_invalid_reload_keeps_previous_rules() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine(sink.clone());
        let root = Path::new("/ws");
        engine
            .apply_config(root, &json!({"links": [{"pattern": "x", "handle": "issue"}]}))
            .unwrap();

        let err = engine
            .apply_config(root, &json!({"links": [{"pattern": "x", "handle": "nope"}]}))
            .unwrap_err();

        assert_eq!(err.violations[0].path, "/links/0/handle");
        assert!(sink.contains("keeping the previous rules"));
        let rules = engine.rules().snapshot(root).unwrap();
        assert_eq!(rules.rules().iter().map(LinkRule::handler_name).collect::<Vec<_>>(), vec!["issue"]);
    }

    #[tokio::test]
    async fn test_reload_from_disk_and_config_removal() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine(sink.clone());
        let (_temp_dir, root) = create_test_workspace();
        let config = root.join("linksmith.config.yaml");
        fs::write(&config, "links:\n  - pattern: 'x'\n    handle: issue\n").unwrap();

        assert!(engine.reload(&root, &FileConfigLoader).await);
        assert_eq!(engine.rules().snapshot(&root).unwrap().len(), 1);
        assert_eq!(engine.workspace_root_for(&root.join("deep/file.txt")), Some(root.clone()));

        fs::write(&config, "links: [").unwrap();
        assert!(!engine.reload(&root, &FileConfigLoader).await);
        assert_eq!(sink.count(Level::Error), 1);
        assert!(engine.rules().snapshot(&root).is_some(), "load errors keep old rules");

        fs::remove_file(&config).unwrap();
        assert!(engine.reload(&root, &FileConfigLoader).await);
        assert!(engine.rules().snapshot(&root).is_none());
    }

    #[test]
    fn test_workspace_root_prefers_deepest() {
        let engine = engine(Arc::new(RecordingSink::default()));
        engine.apply_config(Path::new("/ws"), &json!({"links": []})).unwrap();
        engine.apply_config(Path::new("/ws/nested"), &json!({"links": []})).unwrap();

        assert_eq!(
            engine.workspace_root_for(Path::new("/ws/nested/a.txt")),
            Some(PathBuf::from("/ws/nested"))
        );
        assert_eq!(
            engine.workspace_root_for(Path::new("/ws/a.txt")),
            Some(PathBuf::from("/ws"))
        );
        assert_eq!(engine.workspace_root_for(Path::new("/elsewhere/a.txt")), None);

        assert!(engine.remove_root(Path::new("/ws/nested")));
        assert_eq!(
            engine.workspace_root_for(Path::new("/ws/nested/a.txt")),
            Some(PathBuf::from("/ws"))
        );
    }

    #[test]
    fn test_dispatch_action_runs_once() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine(sink.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let buttons = vec![LinkButton::Action {
            title: "Count".to_string(),
            action: crate::buttons::ButtonAction::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        }];

        let presentable = engine.materialize_buttons(&buttons);
        let PresentableButton::Command { token, .. } = &presentable[0] else {
            panic!("expected command button");
        };

        assert!(engine.dispatch_action(token));
        assert!(!engine.dispatch_action(token));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sink.contains("already used"));
    }

    #[test]
    fn test_panicking_action_is_contained() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine(sink.clone());
        let buttons = vec![LinkButton::Action {
            title: "Boom".to_string(),
            action: crate::buttons::ButtonAction::new(|| panic!("kaboom")),
        }];

        let presentable = engine.materialize_buttons(&buttons);
        let PresentableButton::Command { token, .. } = &presentable[0] else {
            panic!("expected command button");
        };

        assert!(!engine.dispatch_action(token));
        assert!(sink.contains("kaboom"));
    }
}
