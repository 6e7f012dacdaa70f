use std::collections::HashMap;
use std::sync::Arc;

use super::config::RenderConfig;
use super::display::{CodeBlockView, DisplayNode};
use super::highlight::{highlight_code, plain_lines};
use super::sanitize::{is_safe_url, sanitize_html};
use super::table::{TableAlign, TableCell, TableView};
use super::token::{TokenMeta, TokenType, TreeNode};
use crate::icon::IconName;
use crate::id::NodeKey;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RenderMode {
    #[default]
    Normal,
    /// The table at the end of the document is still streaming and is drawn as
    /// a skeleton.
    TableLoading,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderedMarkdown {
    pub blocks: Vec<Arc<DisplayNode>>,
    pub mode: RenderMode,
}

impl RenderedMarkdown {
    pub fn is_loading(&self) -> bool {
        self.mode == RenderMode::TableLoading
    }

    pub fn to_html(&self) -> String {
        self.blocks.iter().map(|block| block.to_html()).collect()
    }

    pub fn text_content(&self) -> String {
        self.blocks
            .iter()
            .map(|block| block.text_content())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn find_all(&self, tag: &str) -> Vec<&DisplayNode> {
        self.blocks
            .iter()
            .flat_map(|block| block.find_all(tag))
            .collect()
    }

    pub fn tables(&self) -> Vec<&TableView> {
        fn walk<'a>(node: &'a DisplayNode, found: &mut Vec<&'a TableView>) {
            if let DisplayNode::Table(table) = node {
                found.push(table);
            }
            for child in node.children() {
                walk(child, found);
            }
        }

        let mut found = Vec::new();
        for block in &self.blocks {
            walk(block, &mut found);
        }
        found
    }
}

struct CachedBlock {
    source: Arc<TreeNode>,
    output: Option<Arc<DisplayNode>>,
}

/// Turns keyed token trees into display trees. Top-level blocks are cached by
/// key and reused while the tree keeps handing back the same `Arc`.
#[derive(Default)]
pub struct Renderer {
    cache: HashMap<NodeKey, CachedBlock>,
    config: Option<Arc<RenderConfig>>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cached_blocks(&self) -> usize {
        self.cache.len()
    }

    pub fn render(
        &mut self,
        tree: &Arc<TreeNode>,
        config: &Arc<RenderConfig>,
        mode: RenderMode,
    ) -> RenderedMarkdown {
        let config_changed = match &self.config {
            Some(current) => !Arc::ptr_eq(current, config) && !current.same_as(config),
            None => true,
        };
        if config_changed {
            self.cache.clear();
        }
        self.config = Some(Arc::clone(config));

        let last = tree.children.len().saturating_sub(1);
        let mut blocks = Vec::with_capacity(tree.children.len());
        let mut next_cache = HashMap::with_capacity(tree.children.len());

        for (index, child) in tree.children.iter().enumerate() {
            let skeleton = mode == RenderMode::TableLoading && index == last;
            let output = if skeleton {
                render_node(child, config, true)
            } else {
                match self.cache.remove(&child.key) {
                    Some(cached) if Arc::ptr_eq(&cached.source, child) => cached.output,
                    _ => render_node(child, config, false),
                }
            };

            if !skeleton {
                next_cache.insert(
                    child.key.clone(),
                    CachedBlock {
                        source: Arc::clone(child),
                        output: output.clone(),
                    },
                );
            }
            blocks.extend(output);
        }

        self.cache = next_cache;
        RenderedMarkdown { blocks, mode }
    }
}

fn render_children(node: &TreeNode, config: &Arc<RenderConfig>, skeleton: bool) -> Vec<Arc<DisplayNode>> {
    let last = node.children.len().saturating_sub(1);
    node.children
        .iter()
        .enumerate()
        .filter_map(|(index, child)| render_node(child, config, skeleton && index == last))
        .collect()
}

fn element(
    tag: &'static str,
    attrs: Vec<(String, String)>,
    children: Vec<Arc<DisplayNode>>,
) -> Option<Arc<DisplayNode>> {
    Some(Arc::new(DisplayNode::Element {
        tag,
        attrs,
        children,
    }))
}

fn render_node(node: &TreeNode, config: &Arc<RenderConfig>, skeleton: bool) -> Option<Arc<DisplayNode>> {
    let token = &node.token;
    match token.token_type {
        TokenType::Text => Some(Arc::new(DisplayNode::Text(token.content.clone()))),
        TokenType::SoftBreak => Some(Arc::new(DisplayNode::text("\n"))),
        TokenType::HardBreak => element("br", Vec::new(), Vec::new()),
        TokenType::Rule => element("hr", Vec::new(), Vec::new()),
        TokenType::CodeInline => element(
            "code",
            Vec::new(),
            vec![Arc::new(DisplayNode::Text(token.content.clone()))],
        ),
        TokenType::HtmlBlock | TokenType::HtmlInline => Some(Arc::new(render_html(&token.content, config))),
        TokenType::Fence | TokenType::CodeBlock => {
            Some(Arc::new(DisplayNode::CodeBlock(Box::new(code_block(node, config)))))
        }
        TokenType::Table if skeleton => Some(Arc::new(table_skeleton(node, config))),
        TokenType::Table => Some(Arc::new(DisplayNode::Table(Box::new(table_view(node, config))))),
        TokenType::Link => element(
            "a",
            link_attributes(node),
            render_children(node, config, false),
        ),
        TokenType::Image => {
            let mut attrs = Vec::new();
            if let Some(src) = token.attr("src").filter(|src| is_safe_url(src)) {
                attrs.push(("src".to_string(), src.to_string()));
            }
            attrs.push((
                "alt".to_string(),
                token.attr("alt").unwrap_or_default().to_string(),
            ));
            if let Some(title) = token.attr("title") {
                attrs.push(("title".to_string(), title.to_string()));
            }
            element("img", attrs, Vec::new())
        }
        TokenType::ListItem => {
            let mut children = render_children(node, config, skeleton);
            let mut attrs = Vec::new();
            if let Some(TokenMeta::Task { checked }) = &token.meta {
                attrs.push(("class".to_string(), "task-list-item".to_string()));
                let mut checkbox = vec![
                    ("type".to_string(), "checkbox".to_string()),
                    ("disabled".to_string(), String::new()),
                ];
                if *checked {
                    checkbox.push(("checked".to_string(), String::new()));
                }
                children.insert(
                    0,
                    Arc::new(DisplayNode::Element {
                        tag: "input",
                        attrs: checkbox,
                        children: Vec::new(),
                    }),
                );
            }
            element("li", attrs, children)
        }
        TokenType::FootnoteReference => {
            let label = token.content.clone();
            let link = Arc::new(DisplayNode::Element {
                tag: "a",
                attrs: vec![("href".to_string(), format!("#fn-{label}"))],
                children: vec![Arc::new(DisplayNode::Text(label))],
            });
            element(
                "sup",
                vec![("class".to_string(), "footnote-ref".to_string())],
                vec![link],
            )
        }
        TokenType::FootnoteDefinition => {
            let mut attrs = vec![("class".to_string(), "footnote".to_string())];
            if let Some(id) = token.attr("id") {
                attrs.push(("id".to_string(), id.to_string()));
            }
            element("div", attrs, render_children(node, config, skeleton))
        }
        TokenType::OrderedList => {
            let attrs = token
                .attr("start")
                .map(|start| vec![("start".to_string(), start.to_string())])
                .unwrap_or_default();
            element("ol", attrs, render_children(node, config, skeleton))
        }
        TokenType::Document
        | TokenType::Paragraph
        | TokenType::Heading
        | TokenType::Blockquote
        | TokenType::BulletList
        | TokenType::TableHead
        | TokenType::TableBody
        | TokenType::TableRow
        | TokenType::TableHeaderCell
        | TokenType::TableDataCell
        | TokenType::Strong
        | TokenType::Emphasis
        | TokenType::Strikethrough => {
            let tag = if token.tag.is_empty() { "div" } else { token.tag };
            element(tag, Vec::new(), render_children(node, config, skeleton))
        }
    }
}

fn render_html(content: &str, config: &RenderConfig) -> DisplayNode {
    if !config.sanitize {
        return DisplayNode::Html(content.to_string());
    }
    match sanitize_html(content) {
        Ok(clean) => DisplayNode::Html(clean),
        Err(error) => {
            log::warn!(target: "calmchat::render", "html fell back to text: {error}");
            DisplayNode::Text(content.to_string())
        }
    }
}

fn is_external(href: &str) -> bool {
    let lowered = href.trim().to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

fn link_attributes(node: &TreeNode) -> Vec<(String, String)> {
    let mut attrs = node
        .token
        .attrs
        .iter()
        .flatten()
        .filter(|(name, value)| !matches!(name.as_str(), "href") || is_safe_url(value))
        .cloned()
        .collect::<Vec<_>>();

    let href = node.token.attr("href").filter(|href| is_safe_url(href));
    if href.is_some_and(is_external) {
        if node.token.attr("target").is_none() {
            attrs.push(("target".to_string(), "_blank".to_string()));
        }
        if node.token.attr("rel").is_none() {
            attrs.push(("rel".to_string(), "noopener noreferrer".to_string()));
        }
    }
    attrs
}

fn code_block(node: &TreeNode, config: &RenderConfig) -> CodeBlockView {
    let token = &node.token;
    let language = token
        .info
        .split_whitespace()
        .next()
        .filter(|language| !language.is_empty())
        .map(str::to_string);

    let highlighted = if config.highlight {
        language
            .as_deref()
            .and_then(|language| highlight_code(&token.content, language, &config.highlight_theme))
    } else {
        None
    };
    let is_highlighted = highlighted.is_some();
    let lines = highlighted.unwrap_or_else(|| plain_lines(&token.content));

    let threshold = config.code_collapse_threshold;
    let collapsed_lines = (threshold > 0 && lines.len() > threshold).then_some(threshold);

    CodeBlockView {
        language,
        code: token.content.clone(),
        line_count_text: config.line_count(lines.len()),
        lines,
        highlighted: is_highlighted,
        collapsed_lines,
        show_more_text: config.show_more_text.clone(),
        show_less_text: config.show_less_text.clone(),
        copy_tooltip: config.tooltip_content.clone(),
        copy_feedback: config.feedback.clone(),
        copy_icon: IconName::Copy,
        copied_icon: IconName::Check,
        aria_label: config.code_snippet_label(false),
    }
}

fn table_section<'a>(table: &'a TreeNode, section: TokenType) -> impl Iterator<Item = &'a Arc<TreeNode>> {
    table
        .children
        .iter()
        .filter(move |child| child.token.token_type == section)
        .flat_map(|section| section.children.iter())
}

fn table_cells(row: &TreeNode, config: &Arc<RenderConfig>) -> Vec<TableCell> {
    row.children
        .iter()
        .map(|cell| TableCell {
            text: cell.text_content().trim().to_string(),
            content: render_children(cell, config, false),
            align: cell.token.attr("style").and_then(TableAlign::from_style),
        })
        .collect()
}

fn table_view(node: &TreeNode, config: &Arc<RenderConfig>) -> TableView {
    let header = table_section(node, TokenType::TableHead)
        .next()
        .map(|row| table_cells(row, config))
        .unwrap_or_default();
    let rows = table_section(node, TokenType::TableBody)
        .map(|row| table_cells(row, config))
        .collect();
    TableView::new(header, rows, Arc::clone(config))
}

fn table_skeleton(node: &TreeNode, config: &RenderConfig) -> DisplayNode {
    let columns = table_section(node, TokenType::TableHead)
        .next()
        .map(|row| row.children.len())
        .unwrap_or(1)
        .max(1);
    let rows = table_section(node, TokenType::TableBody)
        .count()
        .clamp(1, config.table_page_size.max(1));
    DisplayNode::TableSkeleton {
        columns,
        rows,
        label: config.table_loading_text.clone(),
    }
}
