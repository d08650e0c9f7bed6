use once_cell::sync::Lazy;
use regex::Regex;

pub static LINK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^|\]]+?)(?:\|[^\]]+)?\]\]").unwrap());

static REDIRECT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\A\s*#redirect\s*:?\s*\[\[([^\]|]+)(?:\|[^\]]*)?\]\]").unwrap());

static COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

static REF_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<ref[^>/]*/>|<ref[^>]*>.*?</ref\s*>").unwrap());

static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[A-Za-z][^>]*>").unwrap());

static PIPED_LINK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[[^|\]]*\|([^\]]*)\]\]").unwrap());

static PLAIN_LINK_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[([^\]]*)\]\]").unwrap());

static EXTERNAL_LINK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(?:https?:)?//\S+?(?:\s([^\]]*))?\]").unwrap());

static EMPHASIS_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"'{2,}").unwrap());

static HEADING_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(={1,6})\s*(.+?)\s*={1,6}\s*$").unwrap());

static BLANK_LINES_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Namespaces whose `[[...]]` links carry no readable text.
const MEDIA_PREFIXES: &[&str] = &["file:", "image:", "category:"];

/// Turns raw wikitext into plain text.
pub trait Renderer {
    fn render(&self, raw: &str) -> String;
}

impl<F> Renderer for F
where
    F: Fn(&str) -> String,
{
    fn render(&self, raw: &str) -> String {
        self(raw)
    }
}

/// Regex-based renderer: drops templates, tables, refs, comments, tags,
/// media and category links; keeps link labels and heading text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextRenderer;

impl Renderer for PlainTextRenderer {
    fn render(&self, raw: &str) -> String {
        strip_code(raw)
    }
}

/// Identity renderer, for callers that want the markup untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawRenderer;

impl Renderer for RawRenderer {
    fn render(&self, raw: &str) -> String {
        raw.to_string()
    }
}

/// Underscores become spaces, surrounding whitespace goes. Case is kept.
pub fn normalize_title(title: &str) -> String {
    title.replace('_', " ").trim().to_string()
}

/// Normalized targets of every `[[link]]`, section fragments removed.
pub fn extract_links(text: &str) -> Vec<String> {
    LINK_REGEX
        .captures_iter(text)
        .filter_map(|c| {
            let target = c[1].split('#').next().unwrap_or("");
            let target = normalize_title(target);
            (!target.is_empty()).then_some(target)
        })
        .collect()
}

/// Target of a `#REDIRECT [[Target]]` leading line, if the text is one.
pub fn redirect_target(text: &str) -> Option<String> {
    let caps = REDIRECT_REGEX.captures(text)?;
    let target = caps[1].split('#').next().unwrap_or("");
    let target = normalize_title(target);
    (!target.is_empty()).then_some(target)
}

pub fn strip_code(text: &str) -> String {
    let text = COMMENT_REGEX.replace_all(text, "");
    let text = REF_REGEX.replace_all(&text, "");
    let text = strip_balanced(&text, "{{", "}}");
    let text = strip_balanced(&text, "{|", "|}");
    let text = strip_media_links(&text);
    let text = TAG_REGEX.replace_all(&text, "");
    let text = PIPED_LINK_REGEX.replace_all(&text, "$1");
    let text = PLAIN_LINK_REGEX.replace_all(&text, "$1");
    let text = EXTERNAL_LINK_REGEX.replace_all(&text, "$1");
    let text = EMPHASIS_REGEX.replace_all(&text, "");
    let text = HEADING_REGEX.replace_all(&text, "$2");
    let text = BLANK_LINES_REGEX.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Removes every `open ... close` span, honouring nesting. An unclosed span
/// swallows the rest of the text.
fn strip_balanced(text: &str, open: &str, close: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut rest = text;

    while !rest.is_empty() {
        if rest.starts_with(open) {
            depth += 1;
            rest = &rest[open.len()..];
        } else if depth > 0 && rest.starts_with(close) {
            depth -= 1;
            rest = &rest[close.len()..];
        } else {
            let ch = rest.chars().next().unwrap_or_default();
            if depth == 0 {
                result.push(ch);
            }
            rest = &rest[ch.len_utf8()..];
        }
    }

    result
}

/// Drops `[[File:...]]`, `[[Image:...]]` and `[[Category:...]]` links,
/// including captions that contain nested links.
fn strip_media_links(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("[[") {
        let after = &rest[start + 2..];
        let is_media = MEDIA_PREFIXES.iter().any(|p| {
            after
                .get(..p.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(p))
        });
        if !is_media {
            result.push_str(&rest[..start + 2]);
            rest = after;
            continue;
        }

        result.push_str(&rest[..start]);
        let mut depth = 1usize;
        let mut tail = after;
        while depth > 0 && !tail.is_empty() {
            if tail.starts_with("[[") {
                depth += 1;
                tail = &tail[2..];
            } else if tail.starts_with("]]") {
                depth -= 1;
                tail = &tail[2..];
            } else {
                let ch = tail.chars().next().unwrap_or_default();
                tail = &tail[ch.len_utf8()..];
            }
        }
        rest = tail;
    }

    result.push_str(rest);
    result
}
