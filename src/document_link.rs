//! Conversion between [`LinkDescriptor`]s and LSP document links.
//!
//! Descriptors address text by byte offset; LSP wants line/character
//! positions. A deferred link goes out without a target and with enough
//! `data` to rebuild its descriptor when the client sends
//! `documentLink/resolve`.

use std::ops::Range;

use ropey::Rope;
use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::{DocumentLink, Position};

use crate::extract::{DeferredTarget, LinkDescriptor, LinkTarget};

/// Payload stored in `DocumentLink::data` for deferred links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkData {
    range: Range<usize>,
    deferred: DeferredTarget,
}

/// LSP range of a byte range. Offsets past the end of the text clamp to it.
pub fn lsp_range(rope: &Rope, range: Range<usize>) -> tower_lsp::lsp_types::Range {
    let len = rope.len_bytes();
    let char_start = rope.byte_to_char(range.start.min(len));
    let char_end = rope.byte_to_char(range.end.min(len));

    tower_lsp::lsp_types::Range {
        start: position_of(rope, char_start),
        end: position_of(rope, char_end),
    }
}

fn position_of(rope: &Rope, char_index: usize) -> Position {
    let line = rope.char_to_line(char_index);
    let character = char_index - rope.line_to_char(line);
    Position {
        line: line as u32,
        character: character as u32,
    }
}

/// Byte offset of an LSP position, or `None` if the line doesn't exist.
/// Characters past the end of a line clamp to the end of that line.
pub fn offset_at(rope: &Rope, position: Position) -> Option<usize> {
    let line = position.line as usize;
    if line >= rope.len_lines() {
        return None;
    }

    let line_start = rope.line_to_char(line);
    let line_len = rope.line(line).len_chars();
    let char_index = line_start + (position.character as usize).min(line_len);
    Some(rope.char_to_byte(char_index))
}

pub fn to_document_link(link: &LinkDescriptor, rope: &Rope) -> DocumentLink {
    let (target, data) = match &link.target {
        LinkTarget::Resolved(url) => (Some(url.clone()), None),
        LinkTarget::Deferred(deferred) => {
            let data = LinkData {
                range: link.range.clone(),
                deferred: deferred.clone(),
            };
            (None, serde_json::to_value(data).ok())
        }
    };

    DocumentLink {
        range: lsp_range(rope, link.range.clone()),
        target,
        tooltip: link.tooltip.clone(),
        data,
    }
}

/// Rebuilds the descriptor of a deferred link sent back for resolution.
///
/// Descriptions and buttons do not survive the trip; the resolved link only
/// needs its target.
pub fn from_document_link(link: &DocumentLink) -> Option<LinkDescriptor> {
    let data: LinkData = serde_json::from_value(link.data.clone()?).ok()?;

    Some(LinkDescriptor {
        range: data.range,
        target: LinkTarget::Deferred(data.deferred),
        tooltip: link.tooltip.clone(),
        description: None,
        buttons: Vec::new(),
    })
}
