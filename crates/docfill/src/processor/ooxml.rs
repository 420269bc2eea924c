//! Placeholder scanning and substitution inside OOXML parts.
//!
//! Word processors split text into runs freely, so a `{{name}}` token may
//! span several `<w:t>` elements of one paragraph. Text elements (local
//! name `t`) are grouped per paragraph (`p`) or shared-string item (`si`,
//! `is`), placeholders are matched on the joined group text, and the
//! replacement is written into the run where the token starts.
//!
//! Rewriting works on byte ranges of the original part: everything outside
//! the touched text contents is copied verbatim.

use std::collections::HashMap;
use std::ops::Range;

use quick_xml::escape::{partial_escape, unescape};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::template::placeholder::{find_placeholders, PlaceholderSet};

const PRESERVE_SPACE_ATTR: &str = " xml:space=\"preserve\"";

/// A text element found in a part.
#[derive(Debug)]
struct TextNode {
    /// Byte range of the opening tag.
    open_tag: Range<usize>,
    /// Byte range of the raw (escaped) content.
    content: Range<usize>,
    /// Unescaped content.
    text: String,
}

fn is_group_boundary(local_name: &[u8]) -> bool {
    matches!(local_name, b"p" | b"si" | b"is")
}

/// Collects the text elements of `xml`, grouped by paragraph.
fn scan_text_groups(xml: &str) -> Result<Vec<Vec<TextNode>>, String> {
    let mut reader = Reader::from_str(xml);
    let mut groups = Vec::new();
    let mut current: Vec<TextNode> = Vec::new();
    let mut open: Option<(usize, usize)> = None;

    loop {
        let before = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    open = Some((before, reader.buffer_position() as usize));
                }
            }
            Ok(Event::End(e)) => {
                let local_name = e.local_name();
                if local_name.as_ref() == b"t" {
                    if let Some((tag_start, content_start)) = open.take() {
                        // Content with entities we cannot resolve is never
                        // rewritten, and no placeholder may span it.
                        match unescape(&xml[content_start..before]) {
                            Ok(text) => current.push(TextNode {
                                open_tag: tag_start..content_start,
                                content: content_start..before,
                                text: text.into_owned(),
                            }),
                            Err(_) => {
                                if !current.is_empty() {
                                    groups.push(std::mem::take(&mut current));
                                }
                            }
                        }
                    }
                } else if is_group_boundary(local_name.as_ref()) && !current.is_empty() {
                    groups.push(std::mem::take(&mut current));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "XML parsing error at byte {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
            _ => {}
        }
    }

    if !current.is_empty() {
        groups.push(current);
    }

    Ok(groups)
}

fn joined_text(group: &[TextNode]) -> (String, Vec<usize>) {
    let mut joined = String::new();
    let mut starts = Vec::with_capacity(group.len());
    for node in group {
        starts.push(joined.len());
        joined.push_str(&node.text);
    }
    (joined, starts)
}

/// Adds every placeholder found in the part to `set`, in document order.
pub fn collect_placeholders(xml: &str, set: &mut PlaceholderSet) -> Result<(), String> {
    for group in scan_text_groups(xml)? {
        let (joined, _) = joined_text(&group);
        set.scan(&joined);
    }
    Ok(())
}

/// Computes the new text of each node in a group after substitution.
/// Returns `None` when nothing in the group changes.
fn substitute_group(
    group: &[TextNode],
    values: &HashMap<String, String>,
) -> Option<Vec<String>> {
    let (joined, starts) = joined_text(group);
    let node_ranges: Vec<Range<usize>> = starts
        .iter()
        .zip(group)
        .map(|(start, node)| *start..start + node.text.len())
        .collect();

    let mut outputs = vec![String::new(); group.len()];
    let mut cursor = 0;
    let mut changed = false;

    let copy_range = |outputs: &mut Vec<String>, from: usize, to: usize| {
        if from >= to {
            return;
        }
        for (i, range) in node_ranges.iter().enumerate() {
            let start = range.start.max(from);
            let end = range.end.min(to);
            if start < end {
                outputs[i].push_str(&joined[start..end]);
            }
        }
    };

    for m in find_placeholders(&joined) {
        let Some(value) = values.get(m.name) else {
            continue;
        };
        copy_range(&mut outputs, cursor, m.span.start);
        let owner = node_ranges
            .iter()
            .position(|r| r.start <= m.span.start && m.span.start < r.end)
            .unwrap_or(0);
        outputs[owner].push_str(value);
        cursor = m.span.end;
        changed = true;
    }

    if !changed {
        return None;
    }
    copy_range(&mut outputs, cursor, joined.len());
    Some(outputs)
}

fn needs_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}

/// Replaces the placeholders of one part. Placeholders without an entry
/// in `values` are left as they are. Returns `None` when the part does not
/// change.
pub fn substitute(xml: &str, values: &HashMap<String, String>) -> Result<Option<String>, String> {
    // (position, bytes removed, replacement)
    let mut edits: Vec<(usize, usize, String)> = Vec::new();

    for group in scan_text_groups(xml)? {
        let Some(outputs) = substitute_group(&group, values) else {
            continue;
        };
        for (node, new_text) in group.iter().zip(outputs) {
            if node.text == new_text {
                continue;
            }
            let open_tag = &xml[node.open_tag.clone()];
            if needs_preserve(&new_text) && !open_tag.contains("xml:space") {
                edits.push((node.open_tag.end - 1, 0, PRESERVE_SPACE_ATTR.to_string()));
            }
            edits.push((
                node.content.start,
                node.content.len(),
                partial_escape(new_text.as_str()).into_owned(),
            ));
        }
    }

    if edits.is_empty() {
        return Ok(None);
    }

    edits.sort_by_key(|(position, _, _)| *position);
    let mut out = String::with_capacity(xml.len() + 64);
    let mut cursor = 0;
    for (position, removed, replacement) in edits {
        out.push_str(&xml[cursor..position]);
        out.push_str(&replacement);
        cursor = position + removed;
    }
    out.push_str(&xml[cursor..]);

    Ok(Some(out))
}
