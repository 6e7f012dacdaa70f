pub mod error;
pub mod i18n;
pub mod icon;
pub mod id;
pub mod markdown;
pub mod prelude;
pub mod scheduler;

pub use error::{MarkdownError, MarkdownResult, SanitizeError};
pub use i18n::{I18n, Locale};
pub use markdown::{
    DisplayNode, MarkdownPipeline, MarkdownView, RenderConfig, RenderedMarkdown, Tokenizer,
    TreeNode, ViewOptions,
};
pub use scheduler::ThrottleScheduler;
