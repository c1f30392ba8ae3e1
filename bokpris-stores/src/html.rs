//! Minimal HTML scanning for product pages
//!
//! Retailer pages only need a handful of lookups: the text of an element
//! carrying some classes, a `<meta>` content value, and links whose `href`
//! contains a marker. These work on the raw markup with byte offsets; tag
//! names are matched ASCII case-insensitively.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static OPEN_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<([a-zA-Z][a-zA-Z0-9]*)\b([^>]*)>").expect("Invalid tag regex")
});

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("Invalid attribute regex")
});

/// One opening tag found in a document.
#[derive(Debug, Clone)]
struct OpenTag {
    name: String,
    attributes: HashMap<String, String>,
    /// Byte offset just past the closing `>` of the tag.
    content_start: usize,
}

impl OpenTag {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn has_classes(&self, classes: &[&str]) -> bool {
        let present: Vec<&str> = self
            .attr("class")
            .map(|c| c.split_ascii_whitespace().collect())
            .unwrap_or_default();
        classes.iter().all(|wanted| present.contains(wanted))
    }
}

fn open_tags(html: &str) -> impl Iterator<Item = OpenTag> + '_ {
    OPEN_TAG.captures_iter(html).filter_map(|caps| {
        let whole = caps.get(0)?;
        let name = caps.get(1)?.as_str().to_ascii_lowercase();
        let raw_attrs = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        Some(OpenTag {
            name,
            attributes: parse_attributes(raw_attrs),
            content_start: whole.end(),
        })
    })
}

fn parse_attributes(raw: &str) -> HashMap<String, String> {
    ATTRIBUTE
        .captures_iter(raw)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            Some((name, value))
        })
        .collect()
}

/// Inner markup of the element whose content starts at `start`, honouring
/// nested elements with the same tag name.
fn inner_markup<'a>(html: &'a str, tag: &str, start: usize) -> Option<&'a str> {
    let lower = html.to_ascii_lowercase();
    let open_pat = format!("<{}", tag);
    let close_pat = format!("</{}", tag);
    let mut depth = 1usize;
    let mut cursor = start;

    while depth > 0 {
        let rest = lower.get(cursor..)?;
        let next_close = rest.find(&close_pat)?;
        let next_open = rest.find(&open_pat).filter(|&o| {
            o < next_close
                && rest[o + open_pat.len()..]
                    .starts_with(|c: char| c.is_ascii_whitespace() || c == '>' || c == '/')
        });
        match next_open {
            Some(o) => {
                depth += 1;
                cursor += o + open_pat.len();
            }
            None => {
                depth -= 1;
                if depth == 0 {
                    return html.get(start..cursor + next_close);
                }
                cursor += next_close + close_pat.len();
            }
        }
    }
    None
}

/// Text of the first `tag` element carrying every class in `classes`.
///
/// Returns `None` when no such element exists or its text is empty.
pub fn find_element_text(html: &str, tag: &str, classes: &[&str]) -> Option<String> {
    let tag = tag.to_ascii_lowercase();
    open_tags(html)
        .filter(|t| t.name == tag && t.has_classes(classes))
        .find_map(|t| {
            let inner = inner_markup(html, &tag, t.content_start)?;
            let text = strip_tags(inner);
            (!text.is_empty()).then_some(text)
        })
}

/// `content` of the first `<meta>` whose `property` (or `name`) matches.
pub fn find_meta_content(html: &str, property: &str) -> Option<String> {
    open_tags(html)
        .filter(|t| t.name == "meta")
        .find(|t| t.attr("property") == Some(property) || t.attr("name") == Some(property))
        .and_then(|t| t.attr("content").map(normalize_ws))
        .filter(|content| !content.is_empty())
}

/// Every `<a href>` whose href contains `marker`, in document order.
pub fn find_links(html: &str, marker: &str) -> Vec<String> {
    open_tags(html)
        .filter(|t| t.name == "a")
        .filter_map(|t| t.attr("href").map(str::to_string))
        .filter(|href| href.contains(marker))
        .collect()
}

/// Whether the document contains a `button` whose text or attributes mention `needle`.
pub fn has_button(html: &str, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    open_tags(html).filter(|t| t.name == "button").any(|t| {
        let by_attr = t
            .attributes
            .values()
            .any(|v| v.to_lowercase().contains(&needle));
        let by_text = inner_markup(html, "button", t.content_start)
            .map(|inner| strip_tags(inner).to_lowercase().contains(&needle))
            .unwrap_or(false);
        by_attr || by_text
    })
}

/// Remove markup and normalize whitespace.
pub fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;

    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    normalize_ws(&decode_entities(&out))
}

/// Collapse runs of ASCII whitespace and trim. Non-breaking spaces survive.
pub fn normalize_ws(s: &str) -> String {
    s.split_ascii_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the named entities product pages use plus numeric references.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "nbsp" => Some('\u{a0}'),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "ndash" => Some('\u{2013}'),
        "mdash" => Some('\u{2014}'),
        "aring" => Some('å'),
        "auml" => Some('ä'),
        "ouml" => Some('ö'),
        "Aring" => Some('Å'),
        "Auml" => Some('Ä'),
        "Ouml" => Some('Ö'),
        _ => {
            let numeric = name.strip_prefix('#')?;
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
