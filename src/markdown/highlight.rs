use std::sync::LazyLock;

use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Style, Theme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

pub const DEFAULT_THEME: &str = "InspiredGitHub";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct HighlightedSpan {
    pub text: String,
    pub color: Option<Rgb>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

impl HighlightedSpan {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: None,
            bold: false,
            italic: false,
            underline: false,
        }
    }

    fn styled(text: &str, style: Style) -> Self {
        Self {
            text: text.to_string(),
            color: Some(Rgb {
                r: style.foreground.r,
                g: style.foreground.g,
                b: style.foreground.b,
            }),
            bold: style.font_style.contains(FontStyle::BOLD),
            italic: style.font_style.contains(FontStyle::ITALIC),
            underline: style.font_style.contains(FontStyle::UNDERLINE),
        }
    }

    /// Inline CSS for the span, empty for plain spans.
    pub fn css(&self) -> String {
        let mut css = Vec::new();
        if let Some(color) = self.color {
            css.push(format!("color:{}", color.to_hex()));
        }
        if self.bold {
            css.push("font-weight:bold".to_string());
        }
        if self.italic {
            css.push("font-style:italic".to_string());
        }
        if self.underline {
            css.push("text-decoration:underline".to_string());
        }
        css.join(";")
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct CodeLine {
    pub spans: Vec<HighlightedSpan>,
}

impl CodeLine {
    pub fn text(&self) -> String {
        self.spans.iter().map(|span| span.text.as_str()).collect()
    }
}

fn find_syntax(language: &str) -> Option<&'static SyntaxReference> {
    let language = language.trim();
    if language.is_empty() {
        return None;
    }
    SYNTAX_SET
        .find_syntax_by_token(language)
        .or_else(|| SYNTAX_SET.find_syntax_by_name(language))
}

fn find_theme(name: &str) -> Option<&'static Theme> {
    THEME_SET
        .themes
        .get(name)
        .or_else(|| THEME_SET.themes.get(DEFAULT_THEME))
}

pub fn is_known_language(language: &str) -> bool {
    find_syntax(language).is_some()
}

pub fn plain_lines(code: &str) -> Vec<CodeLine> {
    code.lines()
        .map(|line| CodeLine {
            spans: vec![HighlightedSpan::plain(line)],
        })
        .collect()
}

/// Highlights `code` with the grammar for `language`. Returns `None` when the
/// language or theme is unknown or highlighting fails, so callers can fall back
/// to [`plain_lines`].
pub fn highlight_code(code: &str, language: &str, theme_name: &str) -> Option<Vec<CodeLine>> {
    let syntax = find_syntax(language)?;
    let theme = find_theme(theme_name)?;
    let mut highlighter = HighlightLines::new(syntax, theme);

    let mut lines = Vec::new();
    for line in LinesWithEndings::from(code) {
        let ranges = match highlighter.highlight_line(line, &SYNTAX_SET) {
            Ok(ranges) => ranges,
            Err(error) => {
                log::warn!(target: "calmchat::highlight", "highlighting {language} failed: {error}");
                return None;
            }
        };
        let spans = ranges
            .into_iter()
            .filter_map(|(style, text)| {
                let text = text.trim_end_matches(['\n', '\r']);
                (!text.is_empty()).then(|| HighlightedSpan::styled(text, style))
            })
            .collect();
        lines.push(CodeLine { spans });
    }
    Some(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_language_produces_colored_spans() {
        let lines = highlight_code("fn main() {}\nlet x = 1;\n", "rust", DEFAULT_THEME)
            .expect("rust is bundled");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text(), "fn main() {}");
        assert!(lines[0].spans.iter().any(|span| span.color.is_some()));
    }

    #[test]
    fn unknown_language_falls_back() {
        assert!(highlight_code("x", "definitely-not-a-language", DEFAULT_THEME).is_none());
        assert!(highlight_code("x", "", DEFAULT_THEME).is_none());
        assert!(!is_known_language("definitely-not-a-language"));
    }

    #[test]
    fn unknown_theme_uses_default() {
        assert!(highlight_code("a = 1", "python", "no-such-theme").is_some());
    }

    #[test]
    fn plain_lines_split_on_newlines() {
        let lines = plain_lines("one\ntwo\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].text(), "two");
        assert!(lines[1].spans[0].css().is_empty());
    }
}
