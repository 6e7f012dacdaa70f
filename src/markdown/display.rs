use std::sync::Arc;

use super::highlight::CodeLine;
use super::sanitize::escape_html;
use super::table::{TableInteraction, TableView};
use crate::icon::IconName;

#[derive(Clone, Debug, PartialEq)]
pub struct CodeBlockView {
    pub language: Option<String>,
    pub code: String,
    pub lines: Vec<CodeLine>,
    pub highlighted: bool,
    pub line_count_text: String,
    /// Lines shown while collapsed; `None` when the block is short enough to
    /// always show in full.
    pub collapsed_lines: Option<usize>,
    pub show_more_text: String,
    pub show_less_text: String,
    pub copy_tooltip: String,
    pub copy_feedback: String,
    pub copy_icon: IconName,
    pub copied_icon: IconName,
    pub aria_label: String,
}

impl CodeBlockView {
    pub fn is_collapsible(&self) -> bool {
        self.collapsed_lines.is_some()
    }

    pub fn visible_lines(&self, expanded: bool) -> &[CodeLine] {
        match self.collapsed_lines {
            Some(limit) if !expanded => &self.lines[..limit.min(self.lines.len())],
            _ => &self.lines,
        }
    }

    pub fn toggle_text(&self, expanded: bool) -> Option<&str> {
        self.is_collapsible().then(|| {
            if expanded {
                self.show_less_text.as_str()
            } else {
                self.show_more_text.as_str()
            }
        })
    }
}

/// Output of the renderer: a plain tree a host UI can draw or serialize.
#[derive(Clone, Debug, PartialEq)]
pub enum DisplayNode {
    Element {
        tag: &'static str,
        attrs: Vec<(String, String)>,
        children: Vec<Arc<DisplayNode>>,
    },
    Text(String),
    /// Raw HTML that was allowed through, already sanitized when requested.
    Html(String),
    CodeBlock(Box<CodeBlockView>),
    Table(Box<TableView>),
    TableSkeleton {
        columns: usize,
        rows: usize,
        label: String,
    },
}

const VOID_ELEMENTS: &[&str] = &["br", "hr", "img", "input"];

impl DisplayNode {
    pub fn element(tag: &'static str, children: Vec<Arc<DisplayNode>>) -> Self {
        Self::Element {
            tag,
            attrs: Vec::new(),
            children,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn tag(&self) -> Option<&'static str> {
        match self {
            Self::Element { tag, .. } => Some(*tag),
            _ => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            Self::Element { attrs, .. } => attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    pub fn children(&self) -> &[Arc<DisplayNode>] {
        match self {
            Self::Element { children, .. } => children,
            _ => &[],
        }
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Self::Element { children, .. } => {
                for child in children {
                    child.collect_text(out);
                }
            }
            Self::Text(text) => out.push_str(text),
            Self::Html(_) | Self::TableSkeleton { .. } => {}
            Self::CodeBlock(block) => out.push_str(&block.code),
            Self::Table(table) => {
                let cells = table
                    .header
                    .iter()
                    .chain(table.rows.iter().flatten())
                    .map(|cell| cell.text.as_str())
                    .collect::<Vec<_>>();
                out.push_str(&cells.join(" "));
            }
        }
    }

    /// Finds every element with `tag`, depth first.
    pub fn find_all(&self, tag: &str) -> Vec<&DisplayNode> {
        fn walk<'a>(node: &'a DisplayNode, tag: &str, found: &mut Vec<&'a DisplayNode>) {
            if node.tag() == Some(tag) {
                found.push(node);
            }
            for child in node.children() {
                walk(child, tag, found);
            }
            if let DisplayNode::Table(table) = node {
                for cell in table.header.iter().chain(table.rows.iter().flatten()) {
                    for content in &cell.content {
                        walk(content, tag, found);
                    }
                }
            }
        }

        let mut found = Vec::new();
        walk(self, tag, &mut found);
        found
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Self::Element {
                tag,
                attrs,
                children,
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_html(value));
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(tag) {
                    return;
                }
                for child in children {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            Self::Text(text) => out.push_str(&escape_html(text)),
            Self::Html(html) => out.push_str(html),
            Self::CodeBlock(block) => write_code_block(block, out),
            Self::Table(table) => write_table(table, out),
            Self::TableSkeleton {
                columns,
                rows,
                label,
            } => {
                out.push_str("<div class=\"table-skeleton\" aria-busy=\"true\" aria-label=\"");
                out.push_str(&escape_html(label));
                out.push_str("\">");
                for _ in 0..*rows {
                    out.push_str("<div class=\"table-skeleton-row\">");
                    for _ in 0..*columns {
                        out.push_str("<span class=\"table-skeleton-cell\"></span>");
                    }
                    out.push_str("</div>");
                }
                out.push_str("</div>");
            }
        }
    }
}

fn write_code_block(block: &CodeBlockView, out: &mut String) {
    out.push_str("<pre aria-label=\"");
    out.push_str(&escape_html(&block.aria_label));
    out.push_str("\"><code");
    if let Some(language) = &block.language {
        out.push_str(" class=\"language-");
        out.push_str(&escape_html(language));
        out.push('"');
    }
    out.push('>');
    for (index, line) in block.lines.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        for span in &line.spans {
            let css = span.css();
            if css.is_empty() {
                out.push_str(&escape_html(&span.text));
            } else {
                out.push_str("<span style=\"");
                out.push_str(&css);
                out.push_str("\">");
                out.push_str(&escape_html(&span.text));
                out.push_str("</span>");
            }
        }
    }
    out.push_str("</code></pre>");
}

fn write_table(table: &TableView, out: &mut String) {
    fn write_cell(tag: &str, cell: &super::table::TableCell, out: &mut String) {
        out.push('<');
        out.push_str(tag);
        if let Some(align) = cell.align {
            out.push_str(" style=\"text-align:");
            out.push_str(align.as_str());
            out.push('"');
        }
        out.push('>');
        for content in &cell.content {
            content.write_html(out);
        }
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }

    out.push_str("<table><thead><tr>");
    for cell in &table.header {
        write_cell("th", cell, out);
    }
    out.push_str("</tr></thead>");

    let page = table.page(&TableInteraction::new());
    if !page.rows.is_empty() {
        out.push_str("<tbody>");
        for row in page.rows {
            out.push_str("<tr>");
            for cell in &table.rows[row] {
                write_cell("td", cell, out);
            }
            out.push_str("</tr>");
        }
        out.push_str("</tbody>");
    }
    out.push_str("</table>");
}
