//! Hover provider for extracted links.
//!
//! Hovering a link shows its description followed by a row of its buttons.
//! Target buttons are plain markdown links. Callback buttons become command
//! links that carry a one-shot token; the client sends the token back through
//! `workspace/executeCommand` and [`action_token`] pulls it out again.
//!
//! # Configuration
//!
//! Either part can be switched off through [`Settings`]:
//!
//! ```toml
//! descriptions = false
//! buttons = true
//! ```

use ropey::Rope;
use serde_json::{json, Value};
use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position};

use crate::buttons::{self, ButtonTokens, PresentableButton};
use crate::config::Settings;
use crate::document_link::{lsp_range, offset_at};
use crate::extract::LinkDescriptor;

/// Command the client runs when a callback button is clicked.
pub const BUTTON_COMMAND: &str = "linksmith.linkButton";

const BUTTON_SEPARATOR: &str = "  •  ";

/// Hover content for the first link under `position` that has anything to
/// show.
pub fn hover(
    links: &[LinkDescriptor],
    position: Position,
    rope: &Rope,
    tokens: &ButtonTokens,
    settings: &Settings,
) -> Option<Hover> {
    let offset = offset_at(rope, position)?;

    let link = links.iter().find(|link| {
        link.contains(offset)
            && ((settings.descriptions && link.description.is_some())
                || (settings.buttons && !link.buttons.is_empty()))
    })?;

    let mut sections = Vec::new();
    if settings.descriptions {
        if let Some(description) = &link.description {
            sections.push(description.clone());
        }
    }
    if settings.buttons && !link.buttons.is_empty() {
        let row = buttons::materialize(&link.buttons, tokens)
            .iter()
            .map(button_markdown)
            .collect::<Vec<_>>()
            .join(BUTTON_SEPARATOR);
        sections.push(row);
    }

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: sections.join("\n\n"),
        }),
        range: Some(lsp_range(rope, link.range.clone())),
    })
}

fn button_markdown(button: &PresentableButton) -> String {
    match button {
        PresentableButton::Link { title, target } => format!("[{title}]({target})"),
        PresentableButton::Command { title, token } => {
            format!("[{title}]({})", command_uri(token))
        }
    }
}

/// `command:` URI that runs [`BUTTON_COMMAND`] with `token`.
pub fn command_uri(token: &str) -> String {
    let arguments = json!({ "actionToken": token }).to_string();
    format!("command:{BUTTON_COMMAND}?{}", urlencoding::encode(&arguments))
}

/// Token carried by a [`BUTTON_COMMAND`] invocation.
pub fn action_token(arguments: &[Value]) -> Option<String> {
    arguments
        .first()?
        .get("actionToken")?
        .as_str()
        .map(str::to_string)
}
