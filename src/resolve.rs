//! Deferred target resolution.
//!
//! A handler may ask for a link into "wherever `jumpPattern` first occurs in
//! the target file". Searching every target while scanning would be wasteful,
//! so extraction only records the request as a [`LinkTarget::Deferred`] and
//! the search happens here, when the link is activated.
//!
//! The result is a fresh, resolved descriptor whose target is the original
//! target string with a `#L<line>:<column>` fragment appended. Any failure
//! (unreadable target, no occurrence) falls back to the plain target and
//! emits a diagnostic.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{PoisonError, RwLock};

use anyhow::{anyhow, Context};
use regex::Regex;
use ropey::Rope;
use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::Url;

use crate::diagnostics::DiagnosticSink;
use crate::extract::{DeferredTarget, LinkDescriptor, LinkTarget};

/// What to look for inside the target content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "JumpPatternRepr", try_from = "JumpPatternRepr")]
pub enum JumpPattern {
    Literal(String),
    Regex(Regex),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum JumpPatternRepr {
    Literal(String),
    Regex { regex: String },
}

impl JumpPattern {
    pub fn regex(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(JumpPattern::Regex)
    }

    /// Byte offset of the first occurrence in `text`.
    pub fn find(&self, text: &str) -> Option<usize> {
        match self {
            JumpPattern::Literal(needle) => text.find(needle.as_str()),
            JumpPattern::Regex(regex) => regex.find(text).map(|m| m.start()),
        }
    }
}

impl PartialEq for JumpPattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JumpPattern::Literal(a), JumpPattern::Literal(b)) => a == b,
            (JumpPattern::Regex(a), JumpPattern::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl From<JumpPattern> for JumpPatternRepr {
    fn from(pattern: JumpPattern) -> Self {
        match pattern {
            JumpPattern::Literal(literal) => JumpPatternRepr::Literal(literal),
            JumpPattern::Regex(regex) => JumpPatternRepr::Regex {
                regex: regex.as_str().to_string(),
            },
        }
    }
}

impl TryFrom<JumpPatternRepr> for JumpPattern {
    type Error = regex::Error;

    fn try_from(repr: JumpPatternRepr) -> Result<Self, Self::Error> {
        match repr {
            JumpPatternRepr::Literal(literal) => Ok(JumpPattern::Literal(literal)),
            JumpPatternRepr::Regex { regex } => JumpPattern::regex(&regex),
        }
    }
}

/// Source of target content for resolution.
pub trait ContentLoader: Send + Sync {
    fn load(&self, uri: &Url) -> impl Future<Output = anyhow::Result<String>> + Send;
}

/// Reads `file:` URIs from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskLoader;

impl ContentLoader for DiskLoader {
    async fn load(&self, uri: &Url) -> anyhow::Result<String> {
        read_from_disk(uri).await
    }
}

/// In-memory buffers of open documents.
///
/// An open buffer may hold unsaved edits, so it takes precedence over the
/// file on disk when loading content.
#[derive(Debug, Default)]
pub struct OpenDocuments {
    buffers: RwLock<HashMap<Url, Rope>>,
}

impl OpenDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or replaces) the buffer of an open document.
    pub fn open(&self, uri: &Url, text: &str) {
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(buffer_key(uri), Rope::from_str(text));
    }

    pub fn close(&self, uri: &Url) -> bool {
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&buffer_key(uri))
            .is_some()
    }

    pub fn rope(&self, uri: &Url) -> Option<Rope> {
        self.buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&buffer_key(uri))
            .cloned()
    }

    pub fn text(&self, uri: &Url) -> Option<String> {
        self.rope(uri).map(|rope| rope.to_string())
    }
}

impl ContentLoader for OpenDocuments {
    async fn load(&self, uri: &Url) -> anyhow::Result<String> {
        if let Some(text) = self.text(uri) {
            return Ok(text);
        }
        read_from_disk(uri).await
    }
}

fn buffer_key(uri: &Url) -> Url {
    let mut key = uri.clone();
    key.set_fragment(None);
    key
}

async fn read_from_disk(uri: &Url) -> anyhow::Result<String> {
    let path = uri
        .to_file_path()
        .map_err(|()| anyhow!("Not a file URI: {uri}"))?;
    tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// Resolves a deferred descriptor. Resolved descriptors come back unchanged.
pub async fn resolve<L>(
    descriptor: LinkDescriptor,
    loader: &L,
    sink: &dyn DiagnosticSink,
) -> LinkDescriptor
where
    L: ContentLoader,
{
    let LinkTarget::Deferred(deferred) = &descriptor.target else {
        return descriptor;
    };

    let target = resolve_target(deferred, loader, sink).await;
    LinkDescriptor {
        target: LinkTarget::Resolved(target),
        ..descriptor
    }
}

async fn resolve_target<L>(deferred: &DeferredTarget, loader: &L, sink: &dyn DiagnosticSink) -> Url
where
    L: ContentLoader,
{
    let content = match loader.load(&deferred.fallback).await {
        Ok(content) => content,
        Err(err) => {
            sink.error(&format!("{err:#}"));
            return deferred.fallback.clone();
        }
    };

    let Some(offset) = deferred.jump_pattern.find(&content) else {
        sink.error(&format!(
            "Could not find jumpPattern in document: {}",
            deferred.fallback.path()
        ));
        return deferred.fallback.clone();
    };

    let (line, column) = line_column(&content, offset);
    let anchored = format!("{}#L{line}:{column}", deferred.original);
    log::debug!("Resolved jump target {anchored}");

    match Url::parse(&anchored) {
        Ok(url) => url,
        Err(err) => {
            sink.error(&format!("Invalid resolved target \"{anchored}\": {err}"));
            deferred.fallback.clone()
        }
    }
}

/// 1-based `(line, column)` of a byte offset; lines split on `\n`, columns
/// count characters. Offsets past the end clamp to the end of the text.
pub fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }

    let before = &text[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |index| index + 1);
    let column = before[line_start..].chars().count() + 1;

    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_workspace, RecordingSink};
    use std::fs;

    fn deferred(target: &str, jump_pattern: JumpPattern) -> LinkDescriptor {
        LinkDescriptor {
            range: 0..4,
            target: LinkTarget::Deferred(DeferredTarget {
                original: target.to_string(),
                fallback: Url::parse(target).unwrap(),
                jump_pattern,
            }),
            tooltip: Some("tip".to_string()),
            description: None,
            buttons: vec![],
        }
    }

    #[test]
    fn test_line_column_counts_newlines() {
        let text = "hay\nneedle\n";
        assert_eq!(line_column(text, 0), (1, 1));
        assert_eq!(line_column(text, 2), (1, 3));
        assert_eq!(line_column(text, 4), (2, 1));
        assert_eq!(line_column(text, 7), (2, 4));
    }

    #[test]
    fn test_line_column_matches_manual_count() {
        let text = "one\ntwo three\n\nfour five six\nseven";
        let needle = "five";
        let k = text.find(needle).unwrap();

        let manual_line = text[..k].chars().filter(|c| *c == '\n').count() + 1;
        let manual_column = k - text[..k].rfind('\n').map_or(0, |i| i + 1) + 1;

        assert_eq!(line_column(text, k), (manual_line, manual_column));
    }

    #[test]
    fn test_line_column_clamps_out_of_range() {
        let text = "ab\ncd";
        assert_eq!(line_column(text, 999), (2, 3));
        assert_eq!(line_column("", 5), (1, 1));
    }

    #[test]
    fn test_line_column_counts_characters_not_bytes() {
        let text = "é€x";
        let offset = text.find('x').unwrap();
        assert_eq!(line_column(text, offset), (1, 3));
        // Mid-character offsets snap back to the character start.
        assert_eq!(line_column(text, 1), (1, 1));
    }

    #[test]
    fn test_jump_pattern_find() {
        let literal = JumpPattern::Literal("fn main".to_string());
        assert_eq!(literal.find("// x\nfn main() {}"), Some(5));

        let regex = JumpPattern::regex(r"fn\s+\w+").unwrap();
        assert_eq!(regex.find("struct A;\nfn run() {}"), Some(10));
        assert_eq!(regex.find("nothing"), None);
    }

    #[test]
    fn test_jump_pattern_serde_round_trip() {
        let literal: JumpPattern = serde_json::from_str(r#""needle""#).unwrap();
        assert_eq!(literal, JumpPattern::Literal("needle".to_string()));

        let regex: JumpPattern = serde_json::from_str(r#"{"regex":"ne+dle"}"#).unwrap();
        assert_eq!(regex, JumpPattern::regex("ne+dle").unwrap());
        assert_eq!(
            serde_json::to_value(&regex).unwrap(),
            serde_json::json!({"regex": "ne+dle"})
        );

        assert!(serde_json::from_str::<JumpPattern>(r#"{"regex":"("}"#).is_err());
    }

    #[tokio::test]
    async fn test_resolve_literal_from_disk() {
        let (_temp_dir, root) = create_test_workspace();
        let target = root.join("a.txt");
        fs::write(&target, "hay\nneedle\n").unwrap();
        let uri = Url::from_file_path(&target).unwrap();
        let sink = RecordingSink::default();

        let resolved = resolve(
            deferred(uri.as_str(), JumpPattern::Literal("needle".to_string())),
            &DiskLoader,
            &sink,
        )
        .await;

        let LinkTarget::Resolved(url) = &resolved.target else {
            panic!("expected resolved target");
        };
        assert_eq!(url.fragment(), Some("L2:1"));
        assert_eq!(resolved.tooltip.as_deref(), Some("tip"));
        assert!(sink.entries().is_empty());
    }

    #[tokio::test]
    async fn test_open_buffer_takes_precedence() {
        let (_temp_dir, root) = create_test_workspace();
        let target = root.join("lib.rs");
        fs::write(&target, "fn target() {}\n").unwrap();
        let uri = Url::from_file_path(&target).unwrap();

        let documents = OpenDocuments::new();
        documents.open(&uri, "// unsaved\n\n  fn target() {}\n");

        let resolved = resolve(
            deferred(uri.as_str(), JumpPattern::regex(r"fn target").unwrap()),
            &documents,
            &RecordingSink::default(),
        )
        .await;

        assert_eq!(
            resolved.resolved_target().and_then(Url::fragment),
            Some("L3:3")
        );

        documents.close(&uri);
        let resolved = resolve(
            deferred(uri.as_str(), JumpPattern::regex(r"fn target").unwrap()),
            &documents,
            &RecordingSink::default(),
        )
        .await;
        assert_eq!(
            resolved.resolved_target().and_then(Url::fragment),
            Some("L1:1")
        );
    }

    #[tokio::test]
    async fn test_missing_pattern_falls_back_to_plain_target() {
        let (_temp_dir, root) = create_test_workspace();
        let target = root.join("a.txt");
        fs::write(&target, "nothing here").unwrap();
        let uri = Url::from_file_path(&target).unwrap();
        let sink = RecordingSink::default();

        let resolved = resolve(
            deferred(uri.as_str(), JumpPattern::Literal("needle".to_string())),
            &DiskLoader,
            &sink,
        )
        .await;

        assert_eq!(resolved.resolved_target(), Some(&uri));
        assert_eq!(sink.count(crate::diagnostics::Level::Error), 1);
    }

    #[tokio::test]
    async fn test_unreadable_target_falls_back() {
        let (_temp_dir, root) = create_test_workspace();
        let uri = Url::from_file_path(root.join("missing.txt")).unwrap();
        let sink = RecordingSink::default();

        let resolved = resolve(
            deferred(uri.as_str(), JumpPattern::Literal("x".to_string())),
            &DiskLoader,
            &sink,
        )
        .await;

        assert_eq!(resolved.resolved_target(), Some(&uri));
        assert!(sink.contains("Failed to read"));
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let (_temp_dir, root) = create_test_workspace();
        let target = root.join("a.txt");
        fs::write(&target, "x\ny\n").unwrap();
        let uri = Url::from_file_path(&target).unwrap();
        let sink = RecordingSink::default();

        let once = resolve(
            deferred(uri.as_str(), JumpPattern::Literal("y".to_string())),
            &DiskLoader,
            &sink,
        )
        .await;
        let twice = resolve(once.clone(), &DiskLoader, &sink).await;

        assert_eq!(once.target, twice.target);
        assert_eq!(once.range, twice.range);
    }

    #[tokio::test]
    async fn test_non_file_uri_falls_back() {
        let sink = RecordingSink::default();
        let resolved = resolve(
            deferred(
                "https://example.com/page",
                JumpPattern::Literal("x".to_string()),
            ),
            &DiskLoader,
            &sink,
        )
        .await;

        assert_eq!(
            resolved.resolved_target().map(Url::as_str),
            Some("https://example.com/page")
        );
        assert!(sink.contains("Not a file URI"));
    }
}
