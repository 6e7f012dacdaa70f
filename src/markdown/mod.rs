pub mod config;
pub mod diff;
pub mod display;
pub mod highlight;
pub mod links;
pub mod parse;
pub mod pipeline;
pub mod render;
pub mod sanitize;
pub mod streaming;
pub mod table;
pub mod token;
pub mod view;

#[cfg(test)]
mod test_markdown_rendering;

pub use config::RenderConfig;
pub use diff::merge_trees;
pub use display::{CodeBlockView, DisplayNode};
pub use parse::{MAX_NESTING_DEPTH, Tokenizer};
pub use pipeline::{MarkdownPipeline, StepOutcome};
pub use render::{RenderMode, RenderedMarkdown, Renderer};
pub use sanitize::sanitize_html;
pub use streaming::{GateDecision, TableStreamingGate, TableStreamingState};
pub use table::{TableInteraction, TablePage, TableSortDirection, TableView};
pub use token::{Token, TokenMeta, TokenType, TreeNode};
pub use view::{MarkdownView, ViewOptions};
