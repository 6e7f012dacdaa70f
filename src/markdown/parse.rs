use std::any::Any;
use std::ops::Range;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use pulldown_cmark::{
    Alignment, CodeBlockKind, Event, HeadingLevel, LinkType, Options, Parser, Tag, TagEnd,
};

use super::diff::merge_trees;
use super::links;
use super::token::{Token, TokenMeta, TokenType, TreeNode};
use crate::error::{MarkdownError, MarkdownResult};
use crate::id::{KeyHasher, NodeKey};

pub const MAX_NESTING_DEPTH: usize = 256;

/// Mutable node used while the event stream is folded into a tree. Frozen into
/// keyed [`TreeNode`]s once every post-pass has run.
#[derive(Clone, Debug)]
pub(crate) struct RawNode {
    pub(crate) token: Token,
    pub(crate) children: Vec<RawNode>,
    transparent: bool,
}

impl RawNode {
    pub(crate) fn new(token: Token) -> Self {
        Self {
            token,
            children: Vec::new(),
            transparent: false,
        }
    }

    pub(crate) fn text(content: impl Into<String>, level: usize) -> Self {
        let mut token = Token::new(TokenType::Text, "", level);
        token.content = content.into();
        Self::new(token)
    }

    fn transparent(level: usize) -> Self {
        Self {
            token: Token::new(TokenType::Document, "", level),
            children: Vec::new(),
            transparent: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Tokenizer {
    options: Options,
    keys: KeyHasher,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_FOOTNOTES);

        Self {
            options,
            keys: KeyHasher::new(),
        }
    }

    pub fn with_key_hasher(mut self, keys: KeyHasher) -> Self {
        self.keys = keys;
        self
    }

    pub fn key_hasher(&self) -> &KeyHasher {
        &self.keys
    }

    /// Parses `source` into a keyed tree and merges it with `previous`, so every
    /// subtree that did not change is the previous tree's `Arc`.
    pub fn parse(
        &self,
        source: &str,
        previous: Option<&Arc<TreeNode>>,
        allow_html: bool,
    ) -> MarkdownResult<Arc<TreeNode>> {
        let options = self.options;
        let mut raw = catch_unwind(AssertUnwindSafe(|| {
            build_raw_tree(source, options, allow_html)
        }))
        .map_err(|payload| MarkdownError::ParserPanicked(panic_message(payload.as_ref())))?;

        postprocess(&mut raw.children, false);

        let fresh = freeze(raw, self.keys.root_key(), &self.keys);
        Ok(merge_trees(previous, fresh))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic payload".to_string()
}

struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, byte)| *byte == b'\n')
                .map(|(index, _)| index + 1),
        );
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        }
    }

    fn span(&self, range: &Range<usize>) -> (usize, usize) {
        let start = self.line_of(range.start);
        let end = if range.end > range.start {
            self.line_of(range.end - 1) + 1
        } else {
            start
        };
        (start, end.max(start))
    }

    fn line_count(&self) -> usize {
        self.starts.len()
    }
}

fn heading_tag(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "h1",
        HeadingLevel::H2 => "h2",
        HeadingLevel::H3 => "h3",
        HeadingLevel::H4 => "h4",
        HeadingLevel::H5 => "h5",
        HeadingLevel::H6 => "h6",
    }
}

fn alignment_style(alignment: Alignment) -> Option<&'static str> {
    match alignment {
        Alignment::None => None,
        Alignment::Left => Some("text-align:left"),
        Alignment::Center => Some("text-align:center"),
        Alignment::Right => Some("text-align:right"),
    }
}

fn leading_run(slice: &str, accept: impl Fn(char) -> bool) -> String {
    slice.chars().take_while(|ch| accept(*ch)).collect()
}

fn heading_markup(slice: &str, level: HeadingLevel) -> String {
    let trimmed = slice.trim_start();
    if trimmed.starts_with('#') {
        return "#".repeat(level as usize);
    }
    trimmed
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.chars().next())
        .map(String::from)
        .unwrap_or_default()
}

fn list_marker(slice: &str) -> String {
    let trimmed = slice.trim_start();
    let digits = leading_run(trimmed, |ch| ch.is_ascii_digit());
    if digits.is_empty() {
        return trimmed.chars().next().map(String::from).unwrap_or_default();
    }
    trimmed[digits.len()..]
        .chars()
        .next()
        .map(String::from)
        .unwrap_or_default()
}

struct TreeBuilder<'a> {
    source: &'a str,
    lines: LineIndex,
    allow_html: bool,
    stack: Vec<RawNode>,
    alignments: Vec<Vec<Alignment>>,
}

impl<'a> TreeBuilder<'a> {
    fn new(source: &'a str, allow_html: bool) -> Self {
        let lines = LineIndex::new(source);
        let mut root = Token::new(TokenType::Document, "", 0);
        root.map = Some((0, lines.line_count()));

        Self {
            source,
            lines,
            allow_html,
            stack: vec![RawNode::new(root)],
            alignments: Vec::new(),
        }
    }

    fn level(&self) -> usize {
        self.stack.len()
    }

    fn slice(&self, range: &Range<usize>) -> &'a str {
        self.source.get(range.clone()).unwrap_or_default()
    }

    fn token(&self, token_type: TokenType, tag: &'static str, range: &Range<usize>) -> Token {
        let mut token = Token::new(token_type, tag, self.level());
        if token.block {
            token.map = Some(self.lines.span(range));
        }
        token
    }

    fn top_type(&self) -> Option<TokenType> {
        self.stack.last().map(|node| node.token.token_type)
    }

    /// Past `MAX_NESTING_DEPTH` frames still track their construct but fold
    /// into the enclosing node, so the frozen tree stays bounded.
    fn open(&mut self, mut node: RawNode) {
        if self.stack.len() >= MAX_NESTING_DEPTH {
            node.transparent = true;
        }
        self.stack.push(node);
    }

    fn close(&mut self) {
        if self.stack.len() <= 1 {
            return;
        }
        let Some(mut node) = self.stack.pop() else {
            return;
        };

        if node.token.token_type == TokenType::Image {
            let alt = flatten_text(&node.children);
            node.token.set_attr("alt", alt.clone());
            node.token.content = alt;
        }

        if node.transparent && !node.token.content.is_empty() {
            let content = std::mem::take(&mut node.token.content);
            node.children.push(RawNode::text(content, node.token.level));
        }

        if let Some(parent) = self.stack.last_mut() {
            if node.transparent {
                parent.children.append(&mut node.children);
            } else {
                parent.children.push(node);
            }
        }
    }

    fn leaf(&mut self, node: RawNode) {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(node);
        }
    }

    fn start(&mut self, tag: Tag<'a>, range: Range<usize>) {
        let slice = self.slice(&range);
        let node = match tag {
            Tag::Paragraph => RawNode::new(self.token(TokenType::Paragraph, "p", &range)),
            Tag::Heading { level, .. } => {
                let mut token = self.token(TokenType::Heading, heading_tag(level), &range);
                token.markup = heading_markup(slice, level);
                RawNode::new(token)
            }
            Tag::BlockQuote(_) => {
                let mut token = self.token(TokenType::Blockquote, "blockquote", &range);
                token.markup = ">".to_string();
                RawNode::new(token)
            }
            Tag::CodeBlock(kind) => match kind {
                CodeBlockKind::Fenced(info) => {
                    let mut token = self.token(TokenType::Fence, "code", &range);
                    token.info = info.trim().to_string();
                    token.markup = leading_run(slice.trim_start(), |ch| ch == '`' || ch == '~');
                    RawNode::new(token)
                }
                CodeBlockKind::Indented => {
                    RawNode::new(self.token(TokenType::CodeBlock, "code", &range))
                }
            },
            Tag::HtmlBlock => {
                if self.allow_html {
                    RawNode::new(self.token(TokenType::HtmlBlock, "", &range))
                } else {
                    RawNode::new(self.token(TokenType::Paragraph, "p", &range))
                }
            }
            Tag::List(start) => {
                let mut token = match start {
                    Some(first) => {
                        let mut token = self.token(TokenType::OrderedList, "ol", &range);
                        if first != 1 {
                            token.set_attr("start", first.to_string());
                        }
                        token
                    }
                    None => self.token(TokenType::BulletList, "ul", &range),
                };
                token.markup = list_marker(slice);
                RawNode::new(token)
            }
            Tag::Item => {
                let mut token = self.token(TokenType::ListItem, "li", &range);
                token.markup = list_marker(slice);
                RawNode::new(token)
            }
            Tag::FootnoteDefinition(label) => {
                let mut token = self.token(TokenType::FootnoteDefinition, "div", &range);
                token.set_attr("id", format!("fn-{label}"));
                token.meta = Some(TokenMeta::Footnote {
                    label: label.to_string(),
                });
                RawNode::new(token)
            }
            Tag::Table(alignments) => {
                self.alignments.push(alignments);
                RawNode::new(self.token(TokenType::Table, "table", &range))
            }
            Tag::TableHead => {
                self.open(RawNode::new(self.token(TokenType::TableHead, "thead", &range)));
                RawNode::new(self.token(TokenType::TableRow, "tr", &range))
            }
            Tag::TableRow => {
                if self.top_type() == Some(TokenType::Table) {
                    self.open(RawNode::new(self.token(TokenType::TableBody, "tbody", &range)));
                }
                RawNode::new(self.token(TokenType::TableRow, "tr", &range))
            }
            Tag::TableCell => {
                let in_head = self
                    .stack
                    .iter()
                    .rev()
                    .take(2)
                    .any(|node| node.token.token_type == TokenType::TableHead);
                let mut token = if in_head {
                    self.token(TokenType::TableHeaderCell, "th", &range)
                } else {
                    self.token(TokenType::TableDataCell, "td", &range)
                };
                let column = self
                    .stack
                    .last()
                    .map(|row| row.children.len())
                    .unwrap_or_default();
                if let Some(style) = self
                    .alignments
                    .last()
                    .and_then(|alignments| alignments.get(column).copied())
                    .and_then(alignment_style)
                {
                    token.set_attr("style", style);
                }
                RawNode::new(token)
            }
            Tag::Emphasis => {
                let mut token = self.token(TokenType::Emphasis, "em", &range);
                token.markup = slice.chars().take(1).collect();
                RawNode::new(token)
            }
            Tag::Strong => {
                let mut token = self.token(TokenType::Strong, "strong", &range);
                token.markup = slice.chars().take(2).collect();
                RawNode::new(token)
            }
            Tag::Strikethrough => {
                let mut token = self.token(TokenType::Strikethrough, "s", &range);
                token.markup = leading_run(slice, |ch| ch == '~');
                RawNode::new(token)
            }
            Tag::Link {
                link_type,
                dest_url,
                title,
                ..
            } => {
                let mut token = self.token(TokenType::Link, "a", &range);
                let href = match link_type {
                    LinkType::Email => format!("mailto:{dest_url}"),
                    _ => dest_url.to_string(),
                };
                token.set_attr("href", href);
                if !title.trim().is_empty() {
                    token.set_attr("title", title.to_string());
                }
                if matches!(link_type, LinkType::Autolink | LinkType::Email) {
                    token.markup = "autolink".to_string();
                }
                RawNode::new(token)
            }
            Tag::Image {
                dest_url, title, ..
            } => {
                let mut token = self.token(TokenType::Image, "img", &range);
                token.set_attr("src", dest_url.to_string());
                if !title.trim().is_empty() {
                    token.set_attr("title", title.to_string());
                }
                RawNode::new(token)
            }
            _ => RawNode::transparent(self.level()),
        };
        self.open(node)
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::TableHead => {
                self.close();
                self.close();
            }
            TagEnd::Table => {
                if self.top_type() == Some(TokenType::TableBody) {
                    self.close();
                }
                self.close();
                self.alignments.pop();
            }
            _ => self.close(),
        }
    }

    fn event(&mut self, event: Event<'a>, range: Range<usize>) {
        match event {
            Event::Start(tag) => self.start(tag, range),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => match self.top_type() {
                Some(TokenType::Fence | TokenType::CodeBlock | TokenType::HtmlBlock) => {
                    if let Some(node) = self.stack.last_mut() {
                        node.token.content.push_str(&text);
                    }
                }
                _ => self.leaf(RawNode::text(text.to_string(), self.level())),
            },
            Event::Code(code) => {
                let mut token = self.token(TokenType::CodeInline, "code", &range);
                token.content = code.to_string();
                token.markup = leading_run(self.slice(&range), |ch| ch == '`');
                self.leaf(RawNode::new(token));
            }
            Event::InlineMath(math) | Event::DisplayMath(math) => {
                let mut token = self.token(TokenType::CodeInline, "code", &range);
                token.content = math.to_string();
                token.markup = leading_run(self.slice(&range), |ch| ch == '$');
                self.leaf(RawNode::new(token));
            }
            Event::Html(html) => {
                if self.top_type() == Some(TokenType::HtmlBlock) {
                    if let Some(node) = self.stack.last_mut() {
                        node.token.content.push_str(&html);
                    }
                } else {
                    self.leaf(RawNode::text(html.to_string(), self.level()));
                }
            }
            Event::InlineHtml(html) => {
                if self.allow_html {
                    let mut token = self.token(TokenType::HtmlInline, "", &range);
                    token.content = html.to_string();
                    self.leaf(RawNode::new(token));
                } else {
                    self.leaf(RawNode::text(html.to_string(), self.level()));
                }
            }
            Event::FootnoteReference(label) => {
                let mut token = self.token(TokenType::FootnoteReference, "sup", &range);
                token.content = label.to_string();
                token.meta = Some(TokenMeta::Footnote {
                    label: label.to_string(),
                });
                self.leaf(RawNode::new(token));
            }
            Event::SoftBreak => {
                let token = self.token(TokenType::SoftBreak, "", &range);
                self.leaf(RawNode::new(token));
            }
            Event::HardBreak => {
                let token = self.token(TokenType::HardBreak, "br", &range);
                self.leaf(RawNode::new(token));
            }
            Event::Rule => {
                let mut token = self.token(TokenType::Rule, "hr", &range);
                token.markup = self.slice(&range).trim().to_string();
                self.leaf(RawNode::new(token));
            }
            Event::TaskListMarker(checked) => {
                if let Some(item) = self
                    .stack
                    .iter_mut()
                    .rev()
                    .find(|node| node.token.token_type == TokenType::ListItem)
                {
                    item.token.meta = Some(TokenMeta::Task { checked });
                    item.token.set_attr("class", "task-list-item");
                }
            }
        }
    }

    fn finish(mut self) -> RawNode {
        while self.stack.len() > 1 {
            self.close();
        }
        self.stack
            .pop()
            .unwrap_or_else(|| RawNode::new(Token::new(TokenType::Document, "", 0)))
    }
}

fn build_raw_tree(source: &str, options: Options, allow_html: bool) -> RawNode {
    let mut builder = TreeBuilder::new(source, allow_html);
    for (event, range) in Parser::new_ext(source, options).into_offset_iter() {
        builder.event(event, range);
    }
    builder.finish()
}

pub(crate) fn flatten_text(nodes: &[RawNode]) -> String {
    fn walk(buffer: &mut String, nodes: &[RawNode]) {
        for node in nodes {
            match node.token.token_type {
                TokenType::Text | TokenType::CodeInline => buffer.push_str(&node.token.content),
                TokenType::SoftBreak | TokenType::HardBreak => buffer.push(' '),
                _ => {}
            }
            walk(buffer, &node.children);
        }
    }

    let mut text = String::new();
    walk(&mut text, nodes);
    text
}

fn coalesce_text(children: &mut Vec<RawNode>) {
    let mut merged: Vec<RawNode> = Vec::with_capacity(children.len());
    for node in children.drain(..) {
        match merged.last_mut() {
            Some(last)
                if node.token.token_type == TokenType::Text
                    && last.token.token_type == TokenType::Text =>
            {
                last.token.content.push_str(&node.token.content);
            }
            _ => merged.push(node),
        }
    }
    *children = merged;
}

fn postprocess(children: &mut Vec<RawNode>, in_link: bool) {
    coalesce_text(children);
    links::apply_link_attributes(children);
    if !in_link {
        links::linkify(children);
    }

    let mut in_html_anchor = false;
    for child in children.iter_mut() {
        if let Some(opens) = links::html_anchor_edge(child) {
            in_html_anchor = opens;
        }
        let nested_link = in_link
            || in_html_anchor
            || matches!(
                child.token.token_type,
                TokenType::Link | TokenType::Image
            );
        postprocess(&mut child.children, nested_link);
    }
}

fn freeze(node: RawNode, key: NodeKey, keys: &KeyHasher) -> Arc<TreeNode> {
    let children = node
        .children
        .into_iter()
        .enumerate()
        .map(|(index, child)| {
            let child_key = keys.child_key(&key, index, child.token.token_type.as_str());
            freeze(child, child_key, keys)
        })
        .collect();

    Arc::new(TreeNode {
        key,
        token: node.token,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Arc<TreeNode> {
        Tokenizer::new()
            .parse(source, None, true)
            .expect("markdown parses")
    }

    fn types(node: &TreeNode) -> Vec<TokenType> {
        node.children
            .iter()
            .map(|child| child.token.token_type)
            .collect()
    }

    #[test]
    fn paragraph_and_strong_nest_in_document() {
        let tree = parse("**bold** text");
        assert_eq!(tree.token.token_type, TokenType::Document);
        assert_eq!(types(&tree), vec![TokenType::Paragraph]);
        let paragraph = &tree.children[0];
        assert_eq!(types(paragraph), vec![TokenType::Strong, TokenType::Text]);
        assert_eq!(paragraph.children[0].token.markup, "**");
        assert_eq!(paragraph.children[0].text_content(), "bold");
    }

    #[test]
    fn fence_keeps_info_markup_and_content() {
        let tree = parse("```rust\nfn main() {}\n```\n");
        let fence = &tree.children[0];
        assert_eq!(fence.token.token_type, TokenType::Fence);
        assert_eq!(fence.token.info, "rust");
        assert_eq!(fence.token.markup, "```");
        assert_eq!(fence.token.content, "fn main() {}\n");
        assert_eq!(fence.token.map, Some((0, 3)));
    }

    #[test]
    fn table_is_normalized_into_head_and_body() {
        let tree = parse("| a | b |\n|:--|--:|\n| 1 | 2 |\n");
        let table = &tree.children[0];
        assert!(table.is_table());
        assert_eq!(types(table), vec![TokenType::TableHead, TokenType::TableBody]);

        let head_row = &table.children[0].children[0];
        assert_eq!(head_row.children[0].token.token_type, TokenType::TableHeaderCell);
        assert_eq!(head_row.children[0].token.attr("style"), Some("text-align:left"));
        assert_eq!(head_row.children[1].token.attr("style"), Some("text-align:right"));

        let body_row = &table.children[1].children[0];
        assert_eq!(body_row.children[1].token.token_type, TokenType::TableDataCell);
        assert_eq!(body_row.children[1].text_content(), "2");
    }

    #[test]
    fn table_without_body_rows_has_no_tbody() {
        let tree = parse("| a | b |\n|---|---|\n");
        let table = &tree.children[0];
        assert_eq!(types(table), vec![TokenType::TableHead]);
    }

    #[test]
    fn html_is_literal_text_when_disallowed() {
        let tree = Tokenizer::new()
            .parse("<b>hi</b> there", None, false)
            .expect("parses");
        let paragraph = &tree.children[0];
        assert_eq!(types(paragraph), vec![TokenType::Text]);
        assert_eq!(paragraph.children[0].token.content, "<b>hi</b> there");
    }

    #[test]
    fn html_block_is_kept_when_allowed() {
        let tree = parse("<div class=\"note\">\nhello\n</div>\n");
        let block = &tree.children[0];
        assert_eq!(block.token.token_type, TokenType::HtmlBlock);
        assert!(block.token.content.contains("class=\"note\""));
    }

    #[test]
    fn task_items_carry_checked_meta() {
        let tree = parse("- [x] done\n- [ ] todo\n");
        let list = &tree.children[0];
        assert_eq!(list.token.token_type, TokenType::BulletList);
        assert_eq!(list.token.markup, "-");
        assert_eq!(
            list.children[0].token.meta,
            Some(TokenMeta::Task { checked: true })
        );
        assert_eq!(
            list.children[1].token.meta,
            Some(TokenMeta::Task { checked: false })
        );
    }

    #[test]
    fn ordered_list_records_start() {
        let tree = parse("3. three\n4. four\n");
        let list = &tree.children[0];
        assert_eq!(list.token.token_type, TokenType::OrderedList);
        assert_eq!(list.token.attr("start"), Some("3"));
        assert_eq!(list.token.markup, ".");
    }

    #[test]
    fn keys_are_stable_across_appends() {
        let tokenizer = Tokenizer::new();
        let first = tokenizer.parse("one\n\ntwo", None, true).expect("parses");
        let second = tokenizer
            .parse("one\n\ntwo three", None, true)
            .expect("parses");
        assert_eq!(first.key, second.key);
        assert_eq!(first.children[0].key, second.children[0].key);
        assert_eq!(first.children[1].key, second.children[1].key);
    }

    #[test]
    fn partial_markup_never_fails() {
        let tokenizer = Tokenizer::new();
        for source in ["", "**unclosed", "[link](http://", "```", "| a |", "<div", "> > >"] {
            assert!(tokenizer.parse(source, None, true).is_ok(), "{source:?}");
        }
    }

    fn depth(node: &TreeNode) -> usize {
        1 + node.children.iter().map(|child| depth(child)).max().unwrap_or(0)
    }

    #[test]
    fn deeply_nested_lists_fold_past_the_depth_limit() {
        let source = "- ".repeat(200) + "item";
        let tree = parse(&source);
        assert!(depth(&tree) <= MAX_NESTING_DEPTH + 1);
        assert_eq!(tree.text_content(), "item");
        assert_eq!(tree.children[0].token.token_type, TokenType::BulletList);
    }

    #[test]
    fn deeply_nested_quotes_keep_their_text() {
        let source = ">".repeat(MAX_NESTING_DEPTH + 8) + " deep";
        let tree = parse(&source);
        assert!(depth(&tree) <= MAX_NESTING_DEPTH + 1);
        assert_eq!(tree.text_content(), "deep");
    }

    #[test]
    fn code_fence_past_the_depth_limit_keeps_its_content() {
        let quotes = ">".repeat(MAX_NESTING_DEPTH + 2);
        let source = format!("{quotes} ```\n{quotes} let x = 1;\n");
        let tree = parse(&source);
        assert!(tree.text_content().contains("let x = 1;"));
    }

    #[test]
    fn image_alt_is_flattened() {
        let tree = parse("![a *nice* cat](cat.png \"Cat\")");
        let image = &tree.children[0].children[0];
        assert_eq!(image.token.token_type, TokenType::Image);
        assert_eq!(image.token.attr("alt"), Some("a nice cat"));
        assert_eq!(image.token.attr("title"), Some("Cat"));
    }
}
