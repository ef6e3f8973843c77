//! Link extraction.
//!
//! [`extract`] runs every eligible rule of a rule set over one document and
//! returns the links found, in a fixed order: rule declaration order, then
//! pattern order within the rule, then left to right through the text.
//! Presentation layers resolve overlapping links by "first registered wins",
//! so that order is part of the contract.
//!
//! Extraction is a pure function of its inputs. A document is re-scanned
//! from scratch on every call; nothing is cached between calls.

use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::Url;

use crate::buttons::LinkButton;
use crate::diagnostics::DiagnosticSink;
use crate::handler::{self, HandlerError, HandlerResult};
use crate::path_filter::normalize_path;
use crate::resolve::JumpPattern;
use crate::rules::RuleSet;
use crate::scanner::{self, MatchSpan};

/// One link found in a document.
///
/// `range` holds UTF-8 byte offsets into the scanned text, not character
/// offsets: slice the text with it directly, and go through
/// [`crate::document_link::lsp_range`] for editor positions.
#[derive(Debug, Clone)]
pub struct LinkDescriptor {
    /// Byte range in the document text the link attaches to.
    pub range: Range<usize>,
    pub target: LinkTarget,
    pub tooltip: Option<String>,
    pub description: Option<String>,
    pub buttons: Vec<LinkButton>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkTarget {
    /// Usable as is.
    Resolved(Url),
    /// Needs a search of the target content when activated.
    Deferred(DeferredTarget),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredTarget {
    /// Target string exactly as the handler returned it.
    pub original: String,
    /// Parsed target, used when the jump pattern can't be resolved.
    pub fallback: Url,
    pub jump_pattern: JumpPattern,
}

impl LinkDescriptor {
    pub fn from_result(span: MatchSpan, result: HandlerResult) -> Self {
        let target = match result.jump_pattern {
            Some(jump_pattern) => LinkTarget::Deferred(DeferredTarget {
                original: result.target,
                fallback: result.uri,
                jump_pattern,
            }),
            None => LinkTarget::Resolved(result.uri),
        };

        LinkDescriptor {
            range: span.into(),
            target,
            tooltip: result.tooltip,
            description: result.description,
            buttons: result.buttons,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.target, LinkTarget::Resolved(_))
    }

    pub fn resolved_target(&self) -> Option<&Url> {
        match &self.target {
            LinkTarget::Resolved(url) => Some(url),
            LinkTarget::Deferred(_) => None,
        }
    }

    /// Whether `offset` lies inside the link, end inclusive.
    pub fn contains(&self, offset: usize) -> bool {
        self.range.start <= offset && offset <= self.range.end
    }
}

/// Finds every link in `text`.
///
/// `document_path` is relative to `workspace_root`. A rule stops after
/// `max_matches_per_rule` matches in one document, with a warning.
pub fn extract(
    rules: &RuleSet,
    document_path: &str,
    text: &str,
    workspace_root: &Path,
    sink: &dyn DiagnosticSink,
    max_matches_per_rule: usize,
) -> Vec<LinkDescriptor> {
    let document_path = normalize_path(document_path);
    let mut links = Vec::new();

    for rule in rules.eligible(&document_path) {
        log::trace!("Scanning {document_path} with rule #{}", rule.index());

        for (count, span) in scanner::scan(rule.patterns(), text).enumerate() {
            if count == max_matches_per_rule {
                sink.warn(&format!(
                    "Rule #{} matched more than {max_matches_per_rule} times in \"{document_path}\"; remaining matches were skipped",
                    rule.index()
                ));
                break;
            }

            match handler::invoke(rule, span, text, workspace_root, sink) {
                Ok(result) => links.push(LinkDescriptor::from_result(span, result)),
                Err(err) => report_skipped(sink, rule.index(), span.as_str(text), &document_path, &err),
            }
        }
    }

    log::debug!("Extracted {} links from {document_path}", links.len());
    links
}

fn report_skipped(
    sink: &dyn DiagnosticSink,
    rule_index: usize,
    link_text: &str,
    document_path: &str,
    err: &HandlerError,
) {
    let message = format!(
        "Skipping link \"{link_text}\" (rule #{rule_index}) in file \"{document_path}\": {err}"
    );
    match err {
        HandlerError::InvalidResponse(_) => sink.warn(&message),
        HandlerError::Failed(_) | HandlerError::Panicked(_) => sink.error(&message),
    }
}
