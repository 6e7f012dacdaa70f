use thiserror::Error;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum MarkdownError {
    #[error("markdown parser panicked: {0}")]
    ParserPanicked(String),
    #[error("markdown state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("markdown view has been disposed")]
    Disposed,
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SanitizeError {
    #[error("unterminated tag starting at byte {offset}")]
    UnterminatedTag { offset: usize },
    #[error("unterminated comment starting at byte {offset}")]
    UnterminatedComment { offset: usize },
}

pub type MarkdownResult<T> = Result<T, MarkdownError>;
