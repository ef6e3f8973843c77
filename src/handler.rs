//! User handlers and the context they are invoked with.
//!
//! A handler maps one matched piece of text to link metadata. Handlers are
//! registered by name in a [`HandlerRegistry`]; a rule's `handle` field picks
//! one. Their output is untrusted JSON, checked against the response schema
//! before anything is built from it.
//!
//! [`invoke`] is the only place a handler runs. It turns every way a handler
//! can misbehave (an `Err`, a panic, a malformed response) into a
//! [`HandlerError`] for that single match.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tower_lsp::lsp_types::Url;

use crate::buttons::{ButtonAction, LinkButton};
use crate::diagnostics::DiagnosticSink;
use crate::resolve::JumpPattern;
use crate::rules::LinkRule;
use crate::scanner::MatchSpan;
use crate::schema::{self, ValidationError};

pub trait LinkHandler: Send + Sync {
    fn handle(&self, ctx: &MatchContext<'_>) -> anyhow::Result<Value>;
}

impl<F> LinkHandler for F
where
    F: Fn(&MatchContext<'_>) -> anyhow::Result<Value> + Send + Sync,
{
    fn handle(&self, ctx: &MatchContext<'_>) -> anyhow::Result<Value> {
        self(ctx)
    }
}

/// Named handlers available to rule configurations.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn LinkHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, name: impl Into<String>, handler: H) -> &mut Self
    where
        H: LinkHandler + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    /// Same as [`register`](Self::register), with closure signature inference.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&MatchContext<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register(name, handler)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LinkHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &names)
            .finish()
    }
}

#[cfg(windows)]
const FILE_PREFIX: &str = "file:///";
#[cfg(not(windows))]
const FILE_PREFIX: &str = "file://";

static PATH_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\\/]+").unwrap());

/// Input handed to a handler for one match.
pub struct MatchContext<'a> {
    link_text: &'a str,
    workspace_root: &'a Path,
    sink: &'a dyn DiagnosticSink,
    actions: RefCell<Vec<ButtonAction>>,
}

impl<'a> MatchContext<'a> {
    pub fn new(link_text: &'a str, workspace_root: &'a Path, sink: &'a dyn DiagnosticSink) -> Self {
        MatchContext {
            link_text,
            workspace_root,
            sink,
            actions: RefCell::new(Vec::new()),
        }
    }

    /// The matched text (or the `link` group, when the pattern has one).
    pub fn link_text(&self) -> &str {
        self.link_text
    }

    pub fn workspace_root(&self) -> &Path {
        self.workspace_root
    }

    /// File URI for a path relative to the workspace root.
    pub fn workspace(&self, relative: &str) -> String {
        let joined = format!("{}/{}", self.workspace_root.display(), relative);
        format!("{FILE_PREFIX}{}", PATH_SEPARATORS.replace_all(&joined, "/"))
    }

    /// File URI for an absolute path.
    pub fn file(&self, absolute: &str) -> String {
        format!("{FILE_PREFIX}{}", PATH_SEPARATORS.replace_all(absolute, "/"))
    }

    pub fn log(&self, message: impl fmt::Display) {
        self.sink.info(&message.to_string());
    }

    /// Registers a button callback and returns the value to put in the
    /// button's `action` field.
    pub fn action<F>(&self, callback: F) -> Value
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut actions = self.actions.borrow_mut();
        actions.push(ButtonAction::new(callback));
        Value::from(actions.len() - 1)
    }

    fn into_actions(self) -> Vec<ButtonAction> {
        self.actions.into_inner()
    }
}

/// A validated handler response.
#[derive(Debug, Clone)]
pub struct HandlerResult {
    pub target: String,
    /// `target` parsed as a URI.
    pub uri: Url,
    pub tooltip: Option<String>,
    pub description: Option<String>,
    pub jump_pattern: Option<JumpPattern>,
    pub buttons: Vec<LinkButton>,
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("handler failed: {0:#}")]
    Failed(anyhow::Error),
    #[error("handler panicked: {0}")]
    Panicked(String),
    #[error("invalid handler response: {0}")]
    InvalidResponse(#[from] ValidationError),
}

/// Runs the rule's handler for one match and validates what it returns.
pub fn invoke(
    rule: &LinkRule,
    span: MatchSpan,
    text: &str,
    workspace_root: &Path,
    sink: &dyn DiagnosticSink,
) -> Result<HandlerResult, HandlerError> {
    let ctx = MatchContext::new(span.as_str(text), workspace_root, sink);
    let handler = rule.handler();

    let value = match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&ctx))) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => return Err(HandlerError::Failed(err)),
        Err(payload) => return Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
    };

    let actions = ctx.into_actions();
    Ok(schema::validate_response(&value, &actions)?)
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
