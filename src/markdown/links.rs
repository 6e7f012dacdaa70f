use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use super::parse::RawNode;
use super::sanitize::{filter_rel, is_allowed_target};
use super::token::{Token, TokenType};

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:https?://|www\.)[^\s<>]+").expect("valid url pattern")
});

static ANNOTATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{\{([^{}]*)\}\}").expect("valid annotation pattern"));

static ATTRIBUTE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z][A-Za-z0-9_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"']+))"#)
        .expect("valid attribute pattern")
});

const ANNOTATION_KEYS: &[&str] = &["target", "rel", "class", "id"];

fn is_safe_identifier_list(value: &str) -> bool {
    !value.trim().is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | ' '))
}

/// Parses a `{{key=value ...}}` annotation at the start of `text`. Returns the
/// accepted attributes and the byte length of the annotation.
pub fn parse_link_annotation(text: &str) -> Option<(Vec<(String, String)>, usize)> {
    let captures = ANNOTATION_PATTERN.captures(text)?;
    let whole = captures.get(0)?;
    let body = captures.get(1)?.as_str();

    let mut attrs = Vec::new();
    for attribute in ATTRIBUTE_PATTERN.captures_iter(body) {
        let Some(name) = attribute.get(1).map(|m| m.as_str().to_ascii_lowercase()) else {
            continue;
        };
        let value = attribute
            .get(2)
            .or_else(|| attribute.get(3))
            .or_else(|| attribute.get(4))
            .map(|m| m.as_str())
            .unwrap_or_default();

        if !ANNOTATION_KEYS.contains(&name.as_str()) {
            continue;
        }
        let accepted = match name.as_str() {
            "target" => is_allowed_target(value).then(|| value.trim().to_string()),
            "rel" => filter_rel(value),
            _ => is_safe_identifier_list(value).then(|| value.trim().to_string()),
        };
        match accepted {
            Some(value) => attrs.push((name, value)),
            None => log::debug!(target: "calmchat::links", "rejected link annotation {name}={value:?}"),
        }
    }

    Some((attrs, whole.end()))
}

/// Moves `{{...}}` annotations that directly follow a link onto the link token.
pub(crate) fn apply_link_attributes(children: &mut Vec<RawNode>) {
    let mut index = 0;
    while index + 1 < children.len() {
        let is_link = children[index].token.token_type == TokenType::Link;
        let next_is_text = children[index + 1].token.token_type == TokenType::Text;
        if !(is_link && next_is_text) {
            index += 1;
            continue;
        }

        let Some((attrs, consumed)) = parse_link_annotation(&children[index + 1].token.content)
        else {
            index += 1;
            continue;
        };

        for (name, value) in attrs {
            children[index].token.set_attr(&name, value);
        }
        let remainder = children[index + 1].token.content[consumed..].to_string();
        if remainder.is_empty() {
            children.remove(index + 1);
        } else {
            children[index + 1].token.content = remainder;
        }
        index += 1;
    }
}

fn trim_url_end(url: &str) -> &str {
    let mut end = url.len();
    loop {
        let candidate = &url[..end];
        let Some(last) = candidate.chars().last() else {
            return candidate;
        };
        let strip = match last {
            '.' | ',' | ':' | ';' | '!' | '?' | '\'' | '"' | '*' | '_' | '~' => true,
            ')' => candidate.matches(')').count() > candidate.matches('(').count(),
            ']' => candidate.matches(']').count() > candidate.matches('[').count(),
            _ => false,
        };
        if !strip {
            return candidate;
        }
        end -= last.len_utf8();
    }
}

/// Byte ranges of bare URLs in `text`, with trailing punctuation excluded.
pub fn find_urls(text: &str) -> Vec<Range<usize>> {
    URL_PATTERN
        .find_iter(text)
        .filter_map(|found| {
            let trimmed = trim_url_end(found.as_str());
            let scheme_only = trimmed.eq_ignore_ascii_case("www.")
                || trimmed.ends_with("://");
            (!trimmed.is_empty() && !scheme_only)
                .then(|| found.start()..found.start() + trimmed.len())
        })
        .collect()
}

fn link_node(url: &str, level: usize) -> RawNode {
    let href = if url.to_ascii_lowercase().starts_with("www.") {
        format!("http://{url}")
    } else {
        url.to_string()
    };
    let mut token = Token::new(TokenType::Link, "a", level);
    token.set_attr("href", href);
    token.markup = "linkify".to_string();

    let mut node = RawNode::new(token);
    node.children.push(RawNode::text(url, level + 1));
    node
}

/// `Some(true)` for a raw inline `<a ...>`, `Some(false)` for `</a>`.
pub(crate) fn html_anchor_edge(node: &RawNode) -> Option<bool> {
    if node.token.token_type != TokenType::HtmlInline {
        return None;
    }
    let html = node.token.content.trim_start().to_ascii_lowercase();
    let tag_end = |rest: &str| {
        rest.chars()
            .next()
            .is_none_or(|ch| ch == '>' || ch == '/' || ch.is_ascii_whitespace())
    };
    if let Some(rest) = html.strip_prefix("</a") {
        return tag_end(rest).then_some(false);
    }
    if let Some(rest) = html.strip_prefix("<a") {
        return tag_end(rest).then_some(true);
    }
    None
}

/// Splits text nodes around bare URLs, wrapping each URL in a link node.
pub(crate) fn linkify(children: &mut Vec<RawNode>) {
    if !children
        .iter()
        .any(|child| child.token.token_type == TokenType::Text && !find_urls(&child.token.content).is_empty())
    {
        return;
    }

    let mut in_html_anchor = false;
    let mut rewritten = Vec::with_capacity(children.len() + 2);
    for child in children.drain(..) {
        if let Some(opens) = html_anchor_edge(&child) {
            in_html_anchor = opens;
        }
        if in_html_anchor || child.token.token_type != TokenType::Text {
            rewritten.push(child);
            continue;
        }
        let urls = find_urls(&child.token.content);
        if urls.is_empty() {
            rewritten.push(child);
            continue;
        }

        let level = child.token.level;
        let content = child.token.content.as_str();
        let mut cursor = 0;
        for range in urls {
            if range.start > cursor {
                rewritten.push(RawNode::text(&content[cursor..range.start], level));
            }
            rewritten.push(link_node(&content[range.clone()], level));
            cursor = range.end;
        }
        if cursor < content.len() {
            rewritten.push(RawNode::text(&content[cursor..], level));
        }
    }
    *children = rewritten;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::Tokenizer;

    #[test]
    fn finds_urls_without_trailing_punctuation() {
        let text = "see https://example.com/a_(b). and www.rust-lang.org, then (http://x.io)";
        let urls = find_urls(text)
            .into_iter()
            .map(|range| &text[range])
            .collect::<Vec<_>>();
        assert_eq!(
            urls,
            vec!["https://example.com/a_(b)", "www.rust-lang.org", "http://x.io"]
        );
    }

    #[test]
    fn bare_scheme_is_not_a_url() {
        assert!(find_urls("typing https:// now").is_empty());
    }

    #[test]
    fn annotation_accepts_only_known_keys() {
        let (attrs, consumed) =
            parse_link_annotation(r#"{{target="_blank" rel='nofollow' onclick=x class=btn}} tail"#)
                .expect("annotation");
        assert_eq!(
            attrs,
            vec![
                ("target".to_string(), "_blank".to_string()),
                ("rel".to_string(), "nofollow".to_string()),
                ("class".to_string(), "btn".to_string()),
            ]
        );
        assert_eq!(consumed, 54);
    }

    #[test]
    fn annotation_rejects_invalid_target() {
        let (attrs, _) = parse_link_annotation("{{target=evil}}").expect("annotation");
        assert!(attrs.is_empty());
        assert!(parse_link_annotation("{{target=_blank").is_none());
    }

    #[test]
    fn tokenizer_applies_annotation_to_link() {
        let tree = Tokenizer::new()
            .parse("[docs](https://docs.rs){{target=_self id=ref}} after", None, true)
            .expect("parses");
        let paragraph = &tree.children[0];
        let link = &paragraph.children[0];
        assert_eq!(link.token.token_type, TokenType::Link);
        assert_eq!(link.token.attr("target"), Some("_self"));
        assert_eq!(link.token.attr("id"), Some("ref"));
        assert_eq!(paragraph.children[1].token.content, " after");
    }

    #[test]
    fn tokenizer_linkifies_bare_urls_outside_code() {
        let tree = Tokenizer::new()
            .parse("visit https://example.com now `https://code.example`", None, true)
            .expect("parses");
        let paragraph = &tree.children[0];
        let kinds = paragraph
            .children
            .iter()
            .map(|child| child.token.token_type)
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                TokenType::Text,
                TokenType::Link,
                TokenType::Text,
                TokenType::CodeInline
            ]
        );
        assert_eq!(paragraph.children[1].token.attr("href"), Some("https://example.com"));
        assert_eq!(paragraph.children[1].token.markup, "linkify");
    }

    #[test]
    fn existing_links_are_not_linkified_again() {
        let tree = Tokenizer::new()
            .parse("[https://example.com](https://example.com)", None, true)
            .expect("parses");
        let link = &tree.children[0].children[0];
        assert_eq!(link.children.len(), 1);
        assert_eq!(link.children[0].token.token_type, TokenType::Text);
    }

    #[test]
    fn text_inside_raw_html_anchor_is_not_linkified() {
        let tree = Tokenizer::new()
            .parse("<a href=\"https://x.io\">https://x.io</a> then https://y.io", None, true)
            .expect("parses");
        let paragraph = &tree.children[0];
        let links = paragraph
            .children
            .iter()
            .filter(|child| child.token.token_type == TokenType::Link)
            .collect::<Vec<_>>();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].token.attr("href"), Some("https://y.io"));
        assert_eq!(paragraph.children[1].token.token_type, TokenType::Text);
        assert_eq!(paragraph.children[1].token.content, "https://x.io");
    }

    #[test]
    fn anchor_edges_ignore_other_tags() {
        let mut open = RawNode::new(Token::new(TokenType::HtmlInline, "", 1));
        open.token.content = "<A href=\"#x\">".to_string();
        let mut close = RawNode::new(Token::new(TokenType::HtmlInline, "", 1));
        close.token.content = "</a>".to_string();
        let mut abbr = RawNode::new(Token::new(TokenType::HtmlInline, "", 1));
        abbr.token.content = "<abbr>".to_string();

        assert_eq!(html_anchor_edge(&open), Some(true));
        assert_eq!(html_anchor_edge(&close), Some(false));
        assert_eq!(html_anchor_edge(&abbr), None);
    }
}
