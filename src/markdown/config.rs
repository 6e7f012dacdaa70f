use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use super::highlight::DEFAULT_THEME;
use crate::i18n::{I18n, Locale};

/// `(page, page_count)` to supplemental pagination text, e.g. "of 4 pages".
pub type PaginationSupplementalText = Arc<dyn Fn(usize, usize) -> String + Send + Sync>;
/// `(first_item, last_item, item_count)` to status text, e.g. "1–5 of 12 items".
pub type PaginationStatusText = Arc<dyn Fn(usize, usize, usize) -> String + Send + Sync>;
/// Line count to text, e.g. "24 lines".
pub type LineCountText = Arc<dyn Fn(usize) -> String + Send + Sync>;

/// Presentation settings for rendered markdown. None of these affect parsing.
#[derive(Clone)]
pub struct RenderConfig {
    pub sanitize: bool,
    pub streaming: bool,
    pub highlight: bool,
    pub filter_placeholder_text: String,
    pub previous_page_text: String,
    pub next_page_text: String,
    pub items_per_page_text: String,
    pub download_label_text: String,
    pub locale: String,
    pub get_pagination_supplemental_text: Option<PaginationSupplementalText>,
    pub get_pagination_status_text: Option<PaginationStatusText>,
    pub feedback: String,
    pub show_less_text: String,
    pub show_more_text: String,
    pub tooltip_content: String,
    pub get_line_count_text: Option<LineCountText>,
    pub code_snippet_aria_label_read_only: Option<String>,
    pub code_snippet_aria_label_editable: Option<String>,
    pub table_loading_text: String,
    pub table_page_size: usize,
    pub table_page_size_options: Vec<usize>,
    pub code_collapse_threshold: usize,
    pub highlight_theme: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::from_i18n(I18n::default())
    }
}

impl RenderConfig {
    pub fn for_locale(locale: impl Into<Locale>) -> Self {
        Self::from_i18n(I18n::new(locale))
    }

    fn from_i18n(i18n: I18n) -> Self {
        Self {
            sanitize: false,
            streaming: false,
            highlight: true,
            filter_placeholder_text: i18n.t("markdown.filter_placeholder"),
            previous_page_text: i18n.t("markdown.previous_page"),
            next_page_text: i18n.t("markdown.next_page"),
            items_per_page_text: i18n.t("markdown.items_per_page"),
            download_label_text: i18n.t("markdown.download_label"),
            locale: i18n.resolved_locale().to_string(),
            get_pagination_supplemental_text: None,
            get_pagination_status_text: None,
            feedback: i18n.t("markdown.copy_feedback"),
            show_less_text: i18n.t("markdown.show_less"),
            show_more_text: i18n.t("markdown.show_more"),
            tooltip_content: i18n.t("markdown.copy_tooltip"),
            get_line_count_text: None,
            code_snippet_aria_label_read_only: None,
            code_snippet_aria_label_editable: None,
            table_loading_text: i18n.t("markdown.table_loading"),
            table_page_size: 5,
            table_page_size_options: vec![5, 10, 20, 50],
            code_collapse_threshold: 15,
            highlight_theme: DEFAULT_THEME.to_string(),
        }
    }

    pub fn sanitize(mut self, value: bool) -> Self {
        self.sanitize = value;
        self
    }

    pub fn streaming(mut self, value: bool) -> Self {
        self.streaming = value;
        self
    }

    pub fn highlight(mut self, value: bool) -> Self {
        self.highlight = value;
        self
    }

    pub fn filter_placeholder_text(mut self, value: impl Into<String>) -> Self {
        self.filter_placeholder_text = value.into();
        self
    }

    pub fn previous_page_text(mut self, value: impl Into<String>) -> Self {
        self.previous_page_text = value.into();
        self
    }

    pub fn next_page_text(mut self, value: impl Into<String>) -> Self {
        self.next_page_text = value.into();
        self
    }

    pub fn items_per_page_text(mut self, value: impl Into<String>) -> Self {
        self.items_per_page_text = value.into();
        self
    }

    pub fn download_label_text(mut self, value: impl Into<String>) -> Self {
        self.download_label_text = value.into();
        self
    }

    pub fn feedback(mut self, value: impl Into<String>) -> Self {
        self.feedback = value.into();
        self
    }

    pub fn show_less_text(mut self, value: impl Into<String>) -> Self {
        self.show_less_text = value.into();
        self
    }

    pub fn show_more_text(mut self, value: impl Into<String>) -> Self {
        self.show_more_text = value.into();
        self
    }

    pub fn tooltip_content(mut self, value: impl Into<String>) -> Self {
        self.tooltip_content = value.into();
        self
    }

    pub fn pagination_supplemental_text(
        mut self,
        value: impl Fn(usize, usize) -> String + Send + Sync + 'static,
    ) -> Self {
        self.get_pagination_supplemental_text = Some(Arc::new(value));
        self
    }

    pub fn pagination_status_text(
        mut self,
        value: impl Fn(usize, usize, usize) -> String + Send + Sync + 'static,
    ) -> Self {
        self.get_pagination_status_text = Some(Arc::new(value));
        self
    }

    pub fn line_count_text(mut self, value: impl Fn(usize) -> String + Send + Sync + 'static) -> Self {
        self.get_line_count_text = Some(Arc::new(value));
        self
    }

    pub fn code_snippet_aria_label_read_only(mut self, value: impl Into<String>) -> Self {
        self.code_snippet_aria_label_read_only = Some(value.into());
        self
    }

    pub fn code_snippet_aria_label_editable(mut self, value: impl Into<String>) -> Self {
        self.code_snippet_aria_label_editable = Some(value.into());
        self
    }

    pub fn table_page_size(mut self, value: usize) -> Self {
        self.table_page_size = value.max(1);
        self
    }

    pub fn table_page_size_options(mut self, value: impl Into<Vec<usize>>) -> Self {
        self.table_page_size_options = value.into();
        self
    }

    pub fn code_collapse_threshold(mut self, value: usize) -> Self {
        self.code_collapse_threshold = value;
        self
    }

    pub fn highlight_theme(mut self, value: impl Into<String>) -> Self {
        self.highlight_theme = value.into();
        self
    }

    fn i18n(&self) -> I18n {
        I18n::new(self.locale.as_str())
    }

    pub fn pagination_supplemental(&self, page: usize, page_count: usize) -> String {
        match &self.get_pagination_supplemental_text {
            Some(format) => format(page, page_count),
            None => self.i18n().t_with(
                "markdown.pagination_supplemental",
                &[("page", &page.to_string()), ("count", &page_count.to_string())],
            ),
        }
    }

    pub fn pagination_status(&self, first: usize, last: usize, count: usize) -> String {
        match &self.get_pagination_status_text {
            Some(format) => format(first, last, count),
            None => self.i18n().t_with(
                "markdown.pagination_status",
                &[
                    ("start", &first.to_string()),
                    ("end", &last.to_string()),
                    ("count", &count.to_string()),
                ],
            ),
        }
    }

    pub fn line_count(&self, lines: usize) -> String {
        match &self.get_line_count_text {
            Some(format) => format(lines),
            None => self
                .i18n()
                .t_with("markdown.line_count", &[("count", &lines.to_string())]),
        }
    }

    pub fn code_snippet_label(&self, editable: bool) -> String {
        let configured = if editable {
            self.code_snippet_aria_label_editable.as_ref()
        } else {
            self.code_snippet_aria_label_read_only.as_ref()
        };
        match configured {
            Some(label) => label.clone(),
            None if editable => self.i18n().t("markdown.code_snippet_editable"),
            None => self.i18n().t("markdown.code_snippet_read_only"),
        }
    }

    /// Compares every field, with callbacks compared by reference.
    pub fn same_as(&self, other: &Self) -> bool {
        fn same_callback<T: ?Sized>(left: &Option<Arc<T>>, right: &Option<Arc<T>>) -> bool {
            match (left, right) {
                (Some(left), Some(right)) => Arc::ptr_eq(left, right),
                (None, None) => true,
                _ => false,
            }
        }

        self.sanitize == other.sanitize
            && self.streaming == other.streaming
            && self.highlight == other.highlight
            && self.filter_placeholder_text == other.filter_placeholder_text
            && self.previous_page_text == other.previous_page_text
            && self.next_page_text == other.next_page_text
            && self.items_per_page_text == other.items_per_page_text
            && self.download_label_text == other.download_label_text
            && self.locale == other.locale
            && same_callback(
                &self.get_pagination_supplemental_text,
                &other.get_pagination_supplemental_text,
            )
            && same_callback(&self.get_pagination_status_text, &other.get_pagination_status_text)
            && self.feedback == other.feedback
            && self.show_less_text == other.show_less_text
            && self.show_more_text == other.show_more_text
            && self.tooltip_content == other.tooltip_content
            && same_callback(&self.get_line_count_text, &other.get_line_count_text)
            && self.code_snippet_aria_label_read_only == other.code_snippet_aria_label_read_only
            && self.code_snippet_aria_label_editable == other.code_snippet_aria_label_editable
            && self.table_loading_text == other.table_loading_text
            && self.table_page_size == other.table_page_size
            && self.table_page_size_options == other.table_page_size_options
            && self.code_collapse_threshold == other.code_collapse_threshold
            && self.highlight_theme == other.highlight_theme
    }
}

impl Debug for RenderConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderConfig")
            .field("sanitize", &self.sanitize)
            .field("streaming", &self.streaming)
            .field("highlight", &self.highlight)
            .field("locale", &self.locale)
            .field("table_page_size", &self.table_page_size)
            .field("code_collapse_threshold", &self.code_collapse_threshold)
            .field("highlight_theme", &self.highlight_theme)
            .field(
                "get_pagination_supplemental_text",
                &self.get_pagination_supplemental_text.is_some(),
            )
            .field(
                "get_pagination_status_text",
                &self.get_pagination_status_text.is_some(),
            )
            .field("get_line_count_text", &self.get_line_count_text.is_some())
            .finish_non_exhaustive()
    }
}
