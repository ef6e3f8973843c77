//! Pattern scanning.
//!
//! Every configured pattern is run over the full document text with
//! "find all non-overlapping matches" semantics. A pattern declared
//! non-global yields at most its first match.
//!
//! If a pattern has a named group called `link`, the reported span narrows
//! to that group, so `see <(?<link>https?://[^>]+)> for details` only
//! underlines the URL.

use regex::Regex;

/// Name of the capture group that narrows a match to its link text.
pub const LINK_GROUP: &str = "link";

/// A compiled rule pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
    global: bool,
    link_group: Option<usize>,
}

/// Absolute byte offsets into the scanned text, end-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
}

impl MatchSpan {
    pub fn as_str<'t>(&self, text: &'t str) -> &'t str {
        &text[self.start..self.end]
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl From<MatchSpan> for std::ops::Range<usize> {
    fn from(span: MatchSpan) -> Self {
        span.start..span.end
    }
}

impl Pattern {
    pub fn new(source: &str, global: bool) -> Result<Self, regex::Error> {
        Regex::new(source).map(|regex| Pattern::from_regex(regex, global))
    }

    pub fn from_regex(regex: Regex, global: bool) -> Self {
        let link_group = regex
            .capture_names()
            .position(|name| name == Some(LINK_GROUP));
        Pattern {
            regex,
            global,
            link_group,
        }
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    /// Matches of this pattern over `text`, each call starting from offset 0.
    pub fn matches<'p, 't>(&'p self, text: &'t str) -> Matches<'p, 't> {
        Matches {
            pattern: self,
            text,
            cursor: Some(0),
        }
    }
}

/// Iterator over the match spans of one pattern in one text.
///
/// The cursor lives in the iterator, so two scans never share state.
#[derive(Debug)]
pub struct Matches<'p, 't> {
    pattern: &'p Pattern,
    text: &'t str,
    cursor: Option<usize>,
}

impl Iterator for Matches<'_, '_> {
    type Item = MatchSpan;

    fn next(&mut self) -> Option<MatchSpan> {
        let position = self.cursor.take()?;
        if position > self.text.len() {
            return None;
        }

        let captures = self.pattern.regex.captures_at(self.text, position)?;
        let whole = captures.get(0)?;

        if self.pattern.global {
            self.cursor = if whole.is_empty() {
                next_char_boundary(self.text, whole.end())
            } else {
                Some(whole.end())
            };
        }

        let span = self
            .pattern
            .link_group
            .and_then(|index| captures.get(index))
            .unwrap_or(whole);

        Some(MatchSpan {
            start: span.start(),
            end: span.end(),
        })
    }
}

/// Offset just past the character at `offset`, or `None` at end of text.
fn next_char_boundary(text: &str, offset: usize) -> Option<usize> {
    text.get(offset..)?
        .chars()
        .next()
        .map(|c| offset + c.len_utf8())
}

/// All spans of all `patterns` in declaration order, then left to right.
pub fn scan<'p, 't>(patterns: &'p [Pattern], text: &'t str) -> impl Iterator<Item = MatchSpan> + 'p
where
    't: 'p,
{
    patterns.iter().flat_map(move |pattern| pattern.matches(text))
}
