//! Link buttons and the one-shot token map behind callback buttons.
//!
//! A presentation layer only understands strings and URIs, so a callback
//! button is swapped for a random token when it is materialized. The host's
//! command dispatcher later trades the token back for the callback with
//! [`ButtonTokens::take`]. Tokens are discarded on first use; tokens that are
//! never used stay in the map until [`ButtonTokens::clear`] is called.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Zero-argument callback attached to a button.
#[derive(Clone)]
pub struct ButtonAction(Arc<dyn Fn() + Send + Sync>);

impl ButtonAction {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        ButtonAction(Arc::new(callback))
    }

    pub fn call(&self) {
        (self.0)()
    }
}

impl fmt::Debug for ButtonAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ButtonAction(..)")
    }
}

/// A button as returned by a handler.
#[derive(Debug, Clone)]
pub enum LinkButton {
    Target { title: String, target: String },
    Action { title: String, action: ButtonAction },
}

impl LinkButton {
    pub fn title(&self) -> &str {
        match self {
            LinkButton::Target { title, .. } | LinkButton::Action { title, .. } => title,
        }
    }
}

/// A button ready for a presentation layer: plain strings only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum PresentableButton {
    Link { title: String, target: String },
    Command { title: String, token: String },
}

impl PresentableButton {
    pub fn title(&self) -> &str {
        match self {
            PresentableButton::Link { title, .. } | PresentableButton::Command { title, .. } => {
                title
            }
        }
    }
}

/// Process-wide token to callback map, owned by the engine.
#[derive(Default)]
pub struct ButtonTokens {
    actions: Mutex<HashMap<String, ButtonAction>>,
}

impl ButtonTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `action` under a fresh token and returns the token.
    pub fn insert(&self, action: ButtonAction) -> String {
        let token = nanoid::nanoid!();
        self.lock().insert(token.clone(), action);
        token
    }

    /// Removes and returns the callback for `token`.
    pub fn take(&self, token: &str) -> Option<ButtonAction> {
        self.lock().remove(token)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ButtonAction>> {
        self.actions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ButtonTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ButtonTokens")
            .field("pending", &self.len())
            .finish()
    }
}

/// Turns handler buttons into presentable ones, registering a token for
/// every callback button.
pub fn materialize(buttons: &[LinkButton], tokens: &ButtonTokens) -> Vec<PresentableButton> {
    buttons
        .iter()
        .map(|button| match button {
            LinkButton::Target { title, target } => PresentableButton::Link {
                title: sanitize_title(title),
                target: target.clone(),
            },
            LinkButton::Action { title, action } => PresentableButton::Command {
                title: sanitize_title(title),
                token: tokens.insert(action.clone()),
            },
        })
        .collect()
}

static MARKDOWN_LINK_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\[\]()\\])").unwrap());

/// Escapes the characters that would break a markdown `[title](target)`.
pub fn sanitize_title(title: &str) -> String {
    MARKDOWN_LINK_CHARS.replace_all(title, r"\$1").into_owned()
}
