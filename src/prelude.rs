pub use crate::error::{MarkdownError, MarkdownResult, SanitizeError};
pub use crate::i18n::{I18n, Locale};
pub use crate::icon::IconName;
pub use crate::markdown::{
    CodeBlockView, DisplayNode, GateDecision, MarkdownPipeline, MarkdownView, RenderConfig,
    RenderMode, RenderedMarkdown, Renderer, StepOutcome, TableInteraction, TablePage,
    TableSortDirection, TableStreamingGate, TableView, Token, TokenType, Tokenizer, TreeNode,
    ViewOptions,
};
pub use crate::scheduler::ThrottleScheduler;
