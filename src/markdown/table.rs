use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;

use super::config::RenderConfig;
use super::display::DisplayNode;
use crate::icon::IconName;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TableSortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TableSort {
    pub column: usize,
    pub direction: TableSortDirection,
}

impl TableSortDirection {
    pub fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    pub fn icon(self) -> IconName {
        match self {
            Self::Asc => IconName::ChevronUp,
            Self::Desc => IconName::ChevronDown,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TableAlign {
    Left,
    Center,
    Right,
}

impl TableAlign {
    pub(crate) fn from_style(style: &str) -> Option<Self> {
        match style.trim().strip_prefix("text-align:")?.trim() {
            "left" => Some(Self::Left),
            "center" => Some(Self::Center),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableCell {
    /// Plain text used for filtering, sorting and export.
    pub text: String,
    pub content: Vec<Arc<DisplayNode>>,
    pub align: Option<TableAlign>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableLabels {
    pub filter_placeholder: String,
    pub previous_page: String,
    pub next_page: String,
    pub items_per_page: String,
    pub download_label: String,
    pub filter_icon: IconName,
    pub download_icon: IconName,
}

impl TableLabels {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            filter_placeholder: config.filter_placeholder_text.clone(),
            previous_page: config.previous_page_text.clone(),
            next_page: config.next_page_text.clone(),
            items_per_page: config.items_per_page_text.clone(),
            download_label: config.download_label_text.clone(),
            filter_icon: IconName::Search,
            download_icon: IconName::Download,
        }
    }
}

/// Host-owned interaction state for one rendered table.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TableInteraction {
    pub filter_query: Option<String>,
    pub filter_column: Option<usize>,
    pub sort: Option<TableSort>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl TableInteraction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, query: impl Into<String>) -> Self {
        self.filter_query = Some(query.into());
        self.page = None;
        self
    }

    pub fn filter_column(mut self, column: usize) -> Self {
        self.filter_column = Some(column);
        self
    }

    pub fn clear_filter(mut self) -> Self {
        self.filter_query = None;
        self.filter_column = None;
        self
    }

    pub fn sort(mut self, column: usize, direction: TableSortDirection) -> Self {
        self.sort = Some(TableSort { column, direction });
        self
    }

    pub fn clear_sort(mut self) -> Self {
        self.sort = None;
        self
    }

    pub fn page(mut self, value: usize) -> Self {
        self.page = Some(value.max(1));
        self
    }

    /// Changing the page size returns to the first page.
    pub fn page_size(mut self, value: usize) -> Self {
        self.page_size = Some(value.max(1));
        self.page = Some(1);
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TablePage {
    /// Indices into [`TableView::rows`] shown on this page, in display order.
    pub rows: Vec<usize>,
    pub page: usize,
    pub page_count: usize,
    pub page_size: usize,
    pub page_size_options: Vec<usize>,
    pub total_rows: usize,
    pub status_text: String,
    pub supplemental_text: String,
    pub has_previous: bool,
    pub has_next: bool,
}

#[derive(Clone, Debug)]
pub struct TableView {
    pub header: Vec<TableCell>,
    pub rows: Vec<Vec<TableCell>>,
    pub labels: TableLabels,
    config: Arc<RenderConfig>,
}

impl PartialEq for TableView {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
            && self.rows == other.rows
            && self.labels == other.labels
            && self.config.same_as(&other.config)
    }
}

fn parse_number(text: &str) -> Option<Decimal> {
    let cleaned = text.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

fn compare_cells(left: &str, right: &str) -> Ordering {
    match (parse_number(left), parse_number(right)) {
        (Some(left), Some(right)) => left.cmp(&right),
        _ => left
            .to_lowercase()
            .cmp(&right.to_lowercase())
            .then_with(|| left.cmp(right)),
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl TableView {
    pub fn new(header: Vec<TableCell>, rows: Vec<Vec<TableCell>>, config: Arc<RenderConfig>) -> Self {
        Self {
            header,
            rows,
            labels: TableLabels::from_config(&config),
            config,
        }
    }

    pub fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.header.len()))
            .max()
            .unwrap_or_default()
    }

    fn cell_text(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(|cell| cell.text.as_str())
            .unwrap_or_default()
    }

    /// Row indices after filtering and sorting. Sorting is stable.
    pub fn visible_rows(&self, interaction: &TableInteraction) -> Vec<usize> {
        let mut rows = (0..self.rows.len()).collect::<Vec<_>>();

        let query = interaction
            .filter_query
            .as_deref()
            .map(str::trim)
            .filter(|query| !query.is_empty())
            .map(str::to_lowercase);
        if let Some(query) = query {
            rows.retain(|row| match interaction.filter_column {
                Some(column) => self.cell_text(*row, column).to_lowercase().contains(&query),
                None => self.rows[*row]
                    .iter()
                    .any(|cell| cell.text.to_lowercase().contains(&query)),
            });
        }

        if let Some(sort) = interaction.sort {
            rows.sort_by(|left, right| {
                let ordering = compare_cells(
                    self.cell_text(*left, sort.column),
                    self.cell_text(*right, sort.column),
                );
                match sort.direction {
                    TableSortDirection::Asc => ordering,
                    TableSortDirection::Desc => ordering.reverse(),
                }
            });
        }

        rows
    }

    pub fn page(&self, interaction: &TableInteraction) -> TablePage {
        let rows = self.visible_rows(interaction);
        let total_rows = rows.len();

        let mut page_size_options = self
            .config
            .table_page_size_options
            .iter()
            .map(|value| (*value).max(1))
            .collect::<Vec<_>>();
        let page_size = interaction
            .page_size
            .unwrap_or(self.config.table_page_size)
            .max(1);
        if !page_size_options.contains(&page_size) {
            page_size_options.push(page_size);
        }
        page_size_options.sort_unstable();
        page_size_options.dedup();

        let page_count = total_rows.div_ceil(page_size).max(1);
        let page = interaction.page.unwrap_or(1).clamp(1, page_count);
        let window_start = (page - 1) * page_size;
        let window_end = (window_start + page_size).min(total_rows);

        let (first, last) = if total_rows == 0 {
            (0, 0)
        } else {
            (window_start + 1, window_end)
        };

        TablePage {
            rows: rows[window_start.min(total_rows)..window_end].to_vec(),
            page,
            page_count,
            page_size,
            page_size_options,
            total_rows,
            status_text: self.config.pagination_status(first, last, total_rows),
            supplemental_text: self.config.pagination_supplemental(page, page_count),
            has_previous: page > 1,
            has_next: page < page_count,
        }
    }

    /// CSV export of the header and every filtered, sorted row across all pages.
    pub fn to_csv(&self, interaction: &TableInteraction) -> String {
        let columns = self.column_count();
        let mut lines = Vec::with_capacity(self.rows.len() + 1);

        let header = (0..columns)
            .map(|column| {
                self.header
                    .get(column)
                    .map(|cell| csv_field(&cell.text))
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>();
        lines.push(header.join(","));

        for row in self.visible_rows(interaction) {
            let fields = (0..columns)
                .map(|column| csv_field(self.cell_text(row, column)))
                .collect::<Vec<_>>();
            lines.push(fields.join(","));
        }

        let mut csv = lines.join("\r\n");
        csv.push_str("\r\n");
        csv
    }
}
