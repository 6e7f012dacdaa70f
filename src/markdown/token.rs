use std::sync::Arc;

use crate::id::NodeKey;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TokenType {
    Document,
    Paragraph,
    Heading,
    Blockquote,
    BulletList,
    OrderedList,
    ListItem,
    Fence,
    CodeBlock,
    Table,
    TableHead,
    TableBody,
    TableRow,
    TableHeaderCell,
    TableDataCell,
    Rule,
    HtmlBlock,
    HtmlInline,
    Text,
    CodeInline,
    Strong,
    Emphasis,
    Strikethrough,
    Link,
    Image,
    SoftBreak,
    HardBreak,
    FootnoteReference,
    FootnoteDefinition,
}

impl TokenType {
    /// Name following the markdown-it convention (`*_open` for containers).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Paragraph => "paragraph_open",
            Self::Heading => "heading_open",
            Self::Blockquote => "blockquote_open",
            Self::BulletList => "bullet_list_open",
            Self::OrderedList => "ordered_list_open",
            Self::ListItem => "list_item_open",
            Self::Fence => "fence",
            Self::CodeBlock => "code_block",
            Self::Table => "table_open",
            Self::TableHead => "thead_open",
            Self::TableBody => "tbody_open",
            Self::TableRow => "tr_open",
            Self::TableHeaderCell => "th_open",
            Self::TableDataCell => "td_open",
            Self::Rule => "hr",
            Self::HtmlBlock => "html_block",
            Self::HtmlInline => "html_inline",
            Self::Text => "text",
            Self::CodeInline => "code_inline",
            Self::Strong => "strong_open",
            Self::Emphasis => "em_open",
            Self::Strikethrough => "s_open",
            Self::Link => "link_open",
            Self::Image => "image",
            Self::SoftBreak => "softbreak",
            Self::HardBreak => "hardbreak",
            Self::FootnoteReference => "footnote_ref",
            Self::FootnoteDefinition => "footnote_open",
        }
    }

    pub fn is_block(self) -> bool {
        matches!(
            self,
            Self::Document
                | Self::Paragraph
                | Self::Heading
                | Self::Blockquote
                | Self::BulletList
                | Self::OrderedList
                | Self::ListItem
                | Self::Fence
                | Self::CodeBlock
                | Self::Table
                | Self::TableHead
                | Self::TableBody
                | Self::TableRow
                | Self::TableHeaderCell
                | Self::TableDataCell
                | Self::Rule
                | Self::HtmlBlock
                | Self::FootnoteDefinition
        )
    }

    pub fn is_container(self) -> bool {
        !matches!(
            self,
            Self::Fence
                | Self::CodeBlock
                | Self::Rule
                | Self::HtmlBlock
                | Self::HtmlInline
                | Self::Text
                | Self::CodeInline
                | Self::SoftBreak
                | Self::HardBreak
                | Self::FootnoteReference
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum TokenMeta {
    Task { checked: bool },
    Footnote { label: String },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub tag: &'static str,
    pub nesting: i8,
    pub level: usize,
    pub content: String,
    pub attrs: Option<Vec<(String, String)>>,
    pub markup: String,
    pub block: bool,
    pub hidden: bool,
    pub map: Option<(usize, usize)>,
    pub info: String,
    pub meta: Option<TokenMeta>,
}

impl Token {
    pub fn new(token_type: TokenType, tag: &'static str, level: usize) -> Self {
        Self {
            token_type,
            tag,
            nesting: if token_type.is_container() { 1 } else { 0 },
            level,
            content: String::new(),
            attrs: None,
            markup: String::new(),
            block: token_type.is_block(),
            hidden: false,
            map: None,
            info: String::new(),
            meta: None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.as_ref().and_then(|attrs| {
            attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        })
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let attrs = self.attrs.get_or_insert_with(Vec::new);
        if let Some(slot) = attrs.iter_mut().find(|(key, _)| key == name) {
            slot.1 = value;
        } else {
            attrs.push((name.to_string(), value));
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TreeNode {
    pub key: NodeKey,
    pub token: Token,
    pub children: Vec<Arc<TreeNode>>,
}

impl TreeNode {
    pub fn is_table(&self) -> bool {
        self.token.token_type == TokenType::Table
    }

    pub fn last_child(&self) -> Option<&Arc<TreeNode>> {
        self.children.last()
    }

    /// Concatenated text of every text-like descendant.
    pub fn text_content(&self) -> String {
        fn walk(node: &TreeNode, out: &mut String) {
            match node.token.token_type {
                TokenType::Text
                | TokenType::CodeInline
                | TokenType::Fence
                | TokenType::CodeBlock
                | TokenType::HtmlInline
                | TokenType::HtmlBlock => out.push_str(&node.token.content),
                TokenType::SoftBreak | TokenType::HardBreak => out.push(' '),
                _ => {}
            }
            for child in &node.children {
                walk(child, out);
            }
        }

        let mut out = String::new();
        walk(self, &mut out);
        out
    }

    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a TreeNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}
