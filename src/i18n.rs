use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

mod generated {
    include!(concat!(env!("OUT_DIR"), "/calmchat_i18n_generated.rs"));
}

#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub enum Locale {
    #[default]
    System,
    Tag(String),
}

impl From<String> for Locale {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("system") {
            return Self::System;
        }
        Self::Tag(value.trim().to_string())
    }
}

impl From<&str> for Locale {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

/// Label lookup bound to one resolved locale.
#[derive(Clone, Copy, Debug)]
pub struct I18n {
    catalog: &'static I18nCatalog,
    locale: &'static str,
}

impl Default for I18n {
    fn default() -> Self {
        Self::new(Locale::System)
    }
}

impl I18n {
    pub fn new(locale: impl Into<Locale>) -> Self {
        let catalog = I18nCatalog::shared();
        let requested = requested_locale(&locale.into());
        Self {
            catalog,
            locale: catalog.resolve_locale(requested.as_deref()),
        }
    }

    pub fn default_locale() -> &'static str {
        I18nCatalog::shared().default_locale
    }

    pub fn available_locales() -> Vec<&'static str> {
        let mut locales = I18nCatalog::shared()
            .locales
            .keys()
            .copied()
            .collect::<Vec<_>>();
        locales.sort_unstable();
        locales
    }

    pub fn resolved_locale(&self) -> &'static str {
        self.locale
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    pub fn t(&self, key: &str) -> String {
        self.lookup(key).unwrap_or(key).to_string()
    }

    pub fn t_with(&self, key: &str, params: &[(&str, &str)]) -> String {
        let raw = self.lookup(key).unwrap_or(key);
        if params.is_empty() {
            return raw.to_string();
        }
        format_template(raw, params)
    }

    fn lookup(&self, key: &str) -> Option<&'static str> {
        self.catalog
            .lookup(self.locale, key)
            .or_else(|| self.catalog.lookup(self.catalog.default_locale, key))
    }
}

fn requested_locale(locale: &Locale) -> Option<String> {
    match locale {
        #[cfg(feature = "i18n")]
        Locale::System => sys_locale::get_locale(),
        #[cfg(not(feature = "i18n"))]
        Locale::System => None,
        Locale::Tag(tag) => Some(tag.clone()),
    }
}

#[derive(Debug)]
struct I18nCatalog {
    default_locale: &'static str,
    locales: HashMap<&'static str, HashMap<&'static str, &'static str>>,
    normalized_locale_lookup: HashMap<String, &'static str>,
    language_lookup: HashMap<String, &'static str>,
}

impl I18nCatalog {
    fn shared() -> &'static Self {
        static CATALOG: OnceLock<I18nCatalog> = OnceLock::new();
        CATALOG.get_or_init(Self::load)
    }

    fn load() -> Self {
        let mut locales = HashMap::new();
        let mut normalized_locale_lookup = HashMap::new();
        let mut language_lookup = HashMap::new();
        let mut ambiguous_languages = HashSet::new();

        for (locale, entries) in generated::LOCALES.iter().copied() {
            let normalized = normalize_locale_tag(locale);
            normalized_locale_lookup.insert(normalized.clone(), locale);

            let language = normalized.split('-').next().unwrap_or_default().to_string();
            if let Some(existing) = language_lookup.get(&language) {
                if *existing != locale {
                    ambiguous_languages.insert(language.clone());
                }
            } else {
                language_lookup.insert(language, locale);
            }

            locales.insert(locale, entries.iter().copied().collect::<HashMap<_, _>>());
        }

        for language in ambiguous_languages {
            language_lookup.remove(&language);
        }

        if !locales.contains_key(generated::DEFAULT_LOCALE) {
            locales.insert(generated::DEFAULT_LOCALE, HashMap::new());
            normalized_locale_lookup.insert(
                normalize_locale_tag(generated::DEFAULT_LOCALE),
                generated::DEFAULT_LOCALE,
            );
        }

        Self {
            default_locale: generated::DEFAULT_LOCALE,
            locales,
            normalized_locale_lookup,
            language_lookup,
        }
    }

    fn resolve_locale(&self, requested: Option<&str>) -> &'static str {
        let Some(requested) = requested else {
            return self.default_locale;
        };

        let normalized = normalize_locale_tag(requested);
        if let Some(locale) = self.normalized_locale_lookup.get(&normalized) {
            return locale;
        }

        let language = normalized.split('-').next().unwrap_or_default();
        if let Some(locale) = self.language_lookup.get(language) {
            return locale;
        }

        self.default_locale
    }

    fn lookup(&self, locale: &'static str, key: &str) -> Option<&'static str> {
        self.locales
            .get(locale)
            .and_then(|entries| entries.get(key).copied())
    }
}

fn normalize_locale_tag(tag: &str) -> String {
    let trimmed = tag.trim();
    let without_encoding = trimmed.split('.').next().unwrap_or(trimmed);
    let without_variant = without_encoding
        .split('@')
        .next()
        .unwrap_or(without_encoding);
    without_variant
        .replace('_', "-")
        .split('-')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

pub(crate) fn format_template(template: &str, params: &[(&str, &str)]) -> String {
    let values = params.iter().copied().collect::<HashMap<&str, &str>>();
    let mut output = String::with_capacity(template.len());
    let mut cursor = 0;

    while cursor < template.len() {
        let tail = &template[cursor..];
        let Some(open_rel) = tail.find('{') else {
            output.push_str(tail);
            break;
        };

        let open = cursor + open_rel;
        output.push_str(&template[cursor..open]);

        let token_start = open + 1;
        let Some(close_rel) = template[token_start..].find('}') else {
            output.push_str(&template[open..]);
            break;
        };
        let close = token_start + close_rel;
        let token = &template[token_start..close];

        if let Some(value) = values.get(token) {
            output.push_str(value);
        } else {
            output.push_str(&template[open..=close]);
        }

        cursor = close + 1;
    }

    output
}

#[cfg(test)]
mod tests {
    use super::{I18n, format_template};

    #[test]
    fn missing_translation_shows_key() {
        let i18n = I18n::new("de");
        assert_eq!(i18n.t("markdown.not_a_label"), "markdown.not_a_label");
    }

    #[test]
    fn supports_locale_tag_normalization() {
        let i18n = I18n::new("de_DE.UTF-8");
        assert_eq!(i18n.resolved_locale(), "de");
        assert_eq!(i18n.t("markdown.copy_tooltip"), "Code kopieren");
    }

    #[test]
    fn unknown_locale_falls_back_to_default() {
        let i18n = I18n::new("xx-YY");
        assert_eq!(i18n.resolved_locale(), I18n::default_locale());
        assert_eq!(i18n.t("markdown.show_more"), "Show more");
    }

    #[test]
    fn supports_placeholder_interpolation() {
        let i18n = I18n::new("en-US");
        assert_eq!(
            i18n.t_with("markdown.line_count", &[("count", "12")]),
            "12 lines"
        );
    }

    #[test]
    fn template_keeps_unknown_and_unclosed_tokens() {
        assert_eq!(
            format_template("{a} {b} {c", &[("a", "1")]),
            "1 {b} {c"
        );
    }

    #[test]
    fn bundled_locales_are_listed() {
        let locales = I18n::available_locales();
        assert!(locales.contains(&"en"));
        assert!(locales.contains(&"de"));
        assert!(locales.contains(&"fr"));
    }
}
