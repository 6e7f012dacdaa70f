use crate::error::SanitizeError;

const ALLOWED_TAGS: &[&str] = &[
    "a",
    "abbr",
    "b",
    "blockquote",
    "br",
    "caption",
    "code",
    "dd",
    "del",
    "details",
    "div",
    "dl",
    "dt",
    "em",
    "figcaption",
    "figure",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "hr",
    "i",
    "img",
    "ins",
    "kbd",
    "li",
    "mark",
    "ol",
    "p",
    "pre",
    "s",
    "small",
    "span",
    "strong",
    "sub",
    "summary",
    "sup",
    "table",
    "tbody",
    "td",
    "tfoot",
    "th",
    "thead",
    "tr",
    "u",
    "ul",
];

const VOID_TAGS: &[&str] = &["br", "hr", "img"];

/// Elements removed together with everything between their open and close tags.
const DROPPED_WITH_CONTENT: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template",
];

const ALLOWED_ATTRIBUTES: &[&str] = &[
    "style", "class", "id", "href", "target", "rel", "title", "alt", "src", "colspan", "rowspan",
    "start", "open",
];

const ALLOWED_TARGETS: &[&str] = &["_blank", "_self", "_parent", "_top"];

const ALLOWED_REL: &[&str] = &[
    "noopener",
    "noreferrer",
    "nofollow",
    "external",
    "ugc",
    "sponsored",
    "author",
    "help",
    "license",
    "next",
    "prev",
    "tag",
];

const BLOCKED_SCHEMES: &[&str] = &["javascript:", "vbscript:", "data:"];

pub fn is_allowed_target(value: &str) -> bool {
    ALLOWED_TARGETS.contains(&value.trim())
}

/// Keeps the allow-listed `rel` tokens; `None` when nothing survives.
pub fn filter_rel(value: &str) -> Option<String> {
    let tokens = value
        .split_whitespace()
        .map(str::to_ascii_lowercase)
        .filter(|token| ALLOWED_REL.contains(&token.as_str()))
        .collect::<Vec<_>>();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

pub fn is_safe_url(value: &str) -> bool {
    let normalized = value
        .chars()
        .filter(|ch| !ch.is_whitespace() && !ch.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    !BLOCKED_SCHEMES
        .iter()
        .any(|scheme| normalized.starts_with(scheme))
}

fn is_safe_style(value: &str) -> bool {
    let normalized = value.to_ascii_lowercase();
    !(normalized.contains("expression(")
        || normalized.contains("javascript:")
        || normalized.contains("url("))
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

struct ParsedTag {
    name: String,
    closing: bool,
    self_closing: bool,
    attrs: Vec<(String, Option<String>)>,
    len: usize,
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-' || byte == b':' || byte == b'_'
}

/// Parses the tag at the start of `rest` (which begins with `<`). `Ok(None)`
/// means the `<` does not open a tag and is literal text.
fn parse_tag(rest: &str, offset: usize) -> Result<Option<ParsedTag>, SanitizeError> {
    let bytes = rest.as_bytes();
    let mut i = 1;
    let closing = bytes.get(i) == Some(&b'/');
    if closing {
        i += 1;
    }
    if !bytes.get(i).is_some_and(u8::is_ascii_alphabetic) {
        return Ok(None);
    }

    let name_start = i;
    while i < bytes.len() && is_name_byte(bytes[i]) {
        i += 1;
    }
    let name = rest[name_start..i].to_ascii_lowercase();

    let mut attrs = Vec::new();
    let mut self_closing = false;
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i) {
            None => return Err(SanitizeError::UnterminatedTag { offset }),
            Some(b'>') => {
                i += 1;
                break;
            }
            Some(b'/') => {
                if bytes.get(i + 1) == Some(&b'>') {
                    self_closing = true;
                    i += 2;
                    break;
                }
                i += 1;
                continue;
            }
            Some(_) => {}
        }

        let attr_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'>' | b'/')
        {
            i += 1;
        }
        let attr_name = rest[attr_start..i].to_ascii_lowercase();
        if attr_name.is_empty() {
            i += 1;
            continue;
        }

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            attrs.push((attr_name, None));
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let value = match bytes.get(i) {
            Some(quote @ (b'"' | b'\'')) => {
                let quote = *quote;
                let value_start = i + 1;
                let Some(len) = bytes[value_start..].iter().position(|byte| *byte == quote) else {
                    return Err(SanitizeError::UnterminatedTag { offset });
                };
                i = value_start + len + 1;
                rest[value_start..value_start + len].to_string()
            }
            Some(_) => {
                let value_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                rest[value_start..i].to_string()
            }
            None => return Err(SanitizeError::UnterminatedTag { offset }),
        };
        attrs.push((attr_name, Some(value)));
    }

    Ok(Some(ParsedTag {
        name,
        closing,
        self_closing,
        attrs,
        len: i,
    }))
}

fn clean_attribute(name: &str, value: Option<&str>) -> Option<String> {
    if name.starts_with("on") || !ALLOWED_ATTRIBUTES.contains(&name) {
        return None;
    }
    let value = value.unwrap_or_default();
    let value = match name {
        "href" | "src" => is_safe_url(value).then(|| value.trim().to_string())?,
        "target" => is_allowed_target(value).then(|| value.trim().to_string())?,
        "rel" => filter_rel(value)?,
        "style" => is_safe_style(value).then(|| value.to_string())?,
        _ => value.to_string(),
    };
    Some(value)
}

fn write_tag(out: &mut String, tag: &ParsedTag) {
    if tag.closing {
        if !VOID_TAGS.contains(&tag.name.as_str()) {
            out.push_str("</");
            out.push_str(&tag.name);
            out.push('>');
        }
        return;
    }

    out.push('<');
    out.push_str(&tag.name);
    for (name, value) in &tag.attrs {
        match clean_attribute(name, value.as_deref()) {
            Some(value) => {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&escape_html(&value));
                out.push('"');
            }
            None => log::debug!(target: "calmchat::sanitize", "dropped attribute {name} on <{}>", tag.name),
        }
    }
    out.push('>');
}

/// Allow-list sanitizer for raw HTML embedded in markdown. Scripting elements are
/// removed with their content, unknown elements are unwrapped, and attributes are
/// filtered down to a benign set.
pub fn sanitize_html(input: &str) -> Result<String, SanitizeError> {
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;

    while let Some(found) = input[cursor..].find('<') {
        let start = cursor + found;
        out.push_str(&input[cursor..start]);
        let rest = &input[start..];

        if rest.starts_with("<!--") {
            let Some(end) = rest[4..].find("-->") else {
                return Err(SanitizeError::UnterminatedComment { offset: start });
            };
            cursor = start + 4 + end + 3;
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            let Some(end) = rest.find('>') else {
                return Err(SanitizeError::UnterminatedTag { offset: start });
            };
            cursor = start + end + 1;
            continue;
        }

        let Some(tag) = parse_tag(rest, start)? else {
            out.push_str("&lt;");
            cursor = start + 1;
            continue;
        };
        cursor = start + tag.len;

        if DROPPED_WITH_CONTENT.contains(&tag.name.as_str()) {
            log::debug!(target: "calmchat::sanitize", "dropped <{}> element", tag.name);
            if !tag.closing && !tag.self_closing {
                let lowered = input[cursor..].to_ascii_lowercase();
                let closing = format!("</{}", tag.name);
                cursor = match lowered.find(&closing) {
                    Some(close_start) => {
                        let after = cursor + close_start;
                        input[after..]
                            .find('>')
                            .map_or(input.len(), |end| after + end + 1)
                    }
                    None => input.len(),
                };
            }
            continue;
        }

        if ALLOWED_TAGS.contains(&tag.name.as_str()) {
            write_tag(&mut out, &tag);
        }
    }

    out.push_str(&input[cursor..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_and_handlers_are_removed_but_links_survive() {
        let html = r#"<p onclick="steal()">hi <a href="https://example.com" target="_blank">x</a></p><script>alert(1)</script>"#;
        let clean = sanitize_html(html).expect("sanitizes");
        assert_eq!(
            clean,
            r#"<p>hi <a href="https://example.com" target="_blank">x</a></p>"#
        );
    }

    #[test]
    fn dropped_elements_lose_their_content() {
        let clean = sanitize_html("a<style>p{}</style>b<iframe src=x></iframe>c<object>o</object>d")
            .expect("sanitizes");
        assert_eq!(clean, "abcd");
    }

    #[test]
    fn script_without_closing_tag_drops_the_rest() {
        let clean = sanitize_html("keep<script>if (a<b) {").expect("sanitizes");
        assert_eq!(clean, "keep");
    }

    #[test]
    fn unsafe_urls_are_dropped() {
        let clean = sanitize_html(r#"<a href=" JavaScript:alert(1)">x</a><img src="data:image/png;base64,AA">"#)
            .expect("sanitizes");
        assert_eq!(clean, "<a>x</a><img>");
    }

    #[test]
    fn target_and_rel_are_validated() {
        let clean = sanitize_html(r#"<a href="/x" target="evil" rel="noopener bogus">x</a>"#)
            .expect("sanitizes");
        assert_eq!(clean, r#"<a href="/x" rel="noopener">x</a>"#);
    }

    #[test]
    fn style_class_and_id_are_kept() {
        let clean = sanitize_html(r#"<span style="color:red" class="hint" id="n1" data-x="1">t</span>"#)
            .expect("sanitizes");
        assert_eq!(clean, r#"<span style="color:red" class="hint" id="n1">t</span>"#);
    }

    #[test]
    fn unknown_tags_are_unwrapped() {
        let clean = sanitize_html("<custom-box><b>bold</b></custom-box>").expect("sanitizes");
        assert_eq!(clean, "<b>bold</b>");
    }

    #[test]
    fn comments_are_removed_and_stray_brackets_escaped() {
        let clean = sanitize_html("1 < 2<!-- hidden -->!").expect("sanitizes");
        assert_eq!(clean, "1 &lt; 2!");
    }

    #[test]
    fn unterminated_markup_is_an_error() {
        assert_eq!(
            sanitize_html("ok <div class=\"x"),
            Err(SanitizeError::UnterminatedTag { offset: 3 })
        );
        assert_eq!(
            sanitize_html("<!-- open"),
            Err(SanitizeError::UnterminatedComment { offset: 0 })
        );
    }

    #[test]
    fn rel_filter_drops_unknown_tokens() {
        assert_eq!(filter_rel("NoOpener  nofollow"), Some("noopener nofollow".to_string()));
        assert_eq!(filter_rel("evil"), None);
        assert!(is_allowed_target("_self"));
        assert!(!is_allowed_target("frame1"));
    }
}
