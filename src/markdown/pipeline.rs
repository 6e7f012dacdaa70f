use std::sync::Arc;

use super::config::RenderConfig;
use super::diff::reused_subtrees;
use super::parse::Tokenizer;
use super::render::{RenderMode, RenderedMarkdown, Renderer};
use super::streaming::{GateDecision, TableStreamingGate};
use super::token::TreeNode;
use crate::error::MarkdownResult;

#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    Rendered(Arc<RenderedMarkdown>),
    /// The tree was staged behind the table-streaming gate; output unchanged.
    Staged,
    /// Nothing changed since the last step.
    Idle,
}

/// Per-instance pipeline: markdown in, display tree out. Owns the previous
/// tree used as diff hint and the table-streaming gate.
pub struct MarkdownPipeline {
    tokenizer: Tokenizer,
    renderer: Renderer,
    config: Arc<RenderConfig>,
    source: String,
    remove_html: bool,
    needs_reparse: bool,
    needs_render: bool,
    token_tree: Option<Arc<TreeNode>>,
    staged_streaming_token_tree: Option<Arc<TreeNode>>,
    gate: TableStreamingGate,
    output: Arc<RenderedMarkdown>,
    disposed: bool,
}

impl MarkdownPipeline {
    pub fn new(config: RenderConfig) -> Self {
        Self::with_tokenizer(Tokenizer::new(), config)
    }

    pub fn with_tokenizer(tokenizer: Tokenizer, config: RenderConfig) -> Self {
        Self {
            tokenizer,
            renderer: Renderer::new(),
            config: Arc::new(config),
            source: String::new(),
            remove_html: false,
            needs_reparse: true,
            needs_render: true,
            token_tree: None,
            staged_streaming_token_tree: None,
            gate: TableStreamingGate::new(),
            output: Arc::new(RenderedMarkdown::default()),
            disposed: false,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn config(&self) -> &Arc<RenderConfig> {
        &self.config
    }

    pub fn output(&self) -> Arc<RenderedMarkdown> {
        Arc::clone(&self.output)
    }

    pub fn token_tree(&self) -> Option<&Arc<TreeNode>> {
        self.token_tree.as_ref()
    }

    pub fn staged_tree(&self) -> Option<&Arc<TreeNode>> {
        self.staged_streaming_token_tree.as_ref()
    }

    pub fn gate(&self) -> &TableStreamingGate {
        &self.gate
    }

    pub fn is_dirty(&self) -> bool {
        !self.disposed && (self.needs_reparse || self.needs_render)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn set_markdown(&mut self, markdown: impl Into<String>) {
        let markdown = markdown.into();
        if markdown != self.source {
            self.source = markdown;
            self.needs_reparse = true;
        }
    }

    pub fn append_markdown(&mut self, chunk: &str) {
        if !chunk.is_empty() {
            self.source.push_str(chunk);
            self.needs_reparse = true;
        }
    }

    pub fn set_remove_html(&mut self, remove_html: bool) {
        if remove_html != self.remove_html {
            self.remove_html = remove_html;
            self.needs_reparse = true;
        }
    }

    pub fn set_config(&mut self, config: RenderConfig) {
        if !self.config.same_as(&config) {
            self.config = Arc::new(config);
            self.needs_render = true;
        }
    }

    pub fn set_streaming(&mut self, streaming: bool) {
        if self.config.streaming != streaming {
            self.set_config(self.config.as_ref().clone().streaming(streaming));
        }
    }

    /// One pipeline step: reparse if the source changed, pass the tree through
    /// the table-streaming gate, render when the gate allows it. A parse error
    /// leaves the previous output in place.
    pub fn run_step(&mut self) -> MarkdownResult<StepOutcome> {
        if !self.is_dirty() {
            return Ok(StepOutcome::Idle);
        }

        let tree = if self.needs_reparse {
            let previous = self
                .staged_streaming_token_tree
                .as_ref()
                .or(self.token_tree.as_ref());
            let parsed = self
                .tokenizer
                .parse(&self.source, previous, !self.remove_html);
            self.needs_reparse = false;
            match parsed {
                Ok(tree) => tree,
                Err(error) => {
                    log::error!(target: "calmchat::pipeline", "parse failed, keeping previous output: {error}");
                    self.needs_render = false;
                    return Err(error);
                }
            }
        } else {
            match self
                .staged_streaming_token_tree
                .clone()
                .or_else(|| self.token_tree.clone())
            {
                Some(tree) => tree,
                None => {
                    self.needs_render = false;
                    return Ok(StepOutcome::Idle);
                }
            }
        };
        self.needs_render = false;

        let mode = match self.gate.advance(self.config.streaming, &tree, &self.source) {
            GateDecision::Render => RenderMode::Normal,
            GateDecision::RenderLoadingFrame => RenderMode::TableLoading,
            GateDecision::Stage => {
                log::trace!(target: "calmchat::pipeline", "staging tree behind streaming table");
                self.staged_streaming_token_tree = Some(tree);
                return Ok(StepOutcome::Staged);
            }
        };

        self.staged_streaming_token_tree = None;
        if log::log_enabled!(target: "calmchat::pipeline", log::Level::Trace) {
            log::trace!(
                target: "calmchat::pipeline",
                "rendering with {} reused subtrees",
                self.token_tree
                    .as_ref()
                    .map_or(0, |previous| reused_subtrees(previous, &tree))
            );
        }
        let output = Arc::new(self.renderer.render(&tree, &self.config, mode));
        self.token_tree = Some(tree);
        self.output = Arc::clone(&output);
        Ok(StepOutcome::Rendered(output))
    }

    /// Drops cached state; later steps are no-ops.
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.staged_streaming_token_tree = None;
        self.renderer.clear_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming_pipeline() -> MarkdownPipeline {
        MarkdownPipeline::new(RenderConfig::for_locale("en").streaming(true))
    }

    #[test]
    fn step_is_idle_without_changes() {
        let mut pipeline = MarkdownPipeline::new(RenderConfig::for_locale("en"));
        pipeline.set_markdown("hello");
        assert!(matches!(pipeline.run_step(), Ok(StepOutcome::Rendered(_))));
        assert_eq!(pipeline.run_step(), Ok(StepOutcome::Idle));
        pipeline.set_markdown("hello");
        assert_eq!(pipeline.run_step(), Ok(StepOutcome::Idle));
    }

    #[test]
    fn streaming_table_renders_one_loading_frame_then_stages() {
        let mut pipeline = streaming_pipeline();
        pipeline.set_markdown("| a | b |\n|---|---|\n");
        let Ok(StepOutcome::Rendered(first)) = pipeline.run_step() else {
            panic!("first table frame renders");
        };
        assert!(first.is_loading());

        for chunk in ["| 1 |", " 2 |\n", "| 3 | 4 |\n"] {
            pipeline.append_markdown(chunk);
            assert_eq!(pipeline.run_step(), Ok(StepOutcome::Staged));
        }
        assert!(Arc::ptr_eq(&pipeline.output(), &first));
        assert!(pipeline.staged_tree().is_some());
    }

    #[test]
    fn stopping_the_stream_renders_the_staged_table() {
        let mut pipeline = streaming_pipeline();
        pipeline.set_markdown("| a | b |\n|---|---|\n| 1 | 2 |\n");
        pipeline.run_step().expect("loading frame");
        pipeline.append_markdown("| 3 |");
        assert_eq!(pipeline.run_step(), Ok(StepOutcome::Staged));

        pipeline.set_streaming(false);
        let Ok(StepOutcome::Rendered(output)) = pipeline.run_step() else {
            panic!("settled render");
        };
        assert!(!output.is_loading());
        assert_eq!(output.tables().len(), 1);
        assert_eq!(output.tables()[0].rows.len(), 2);
        assert!(pipeline.staged_tree().is_none());
    }

    #[test]
    fn remove_html_triggers_reparse() {
        let mut pipeline = MarkdownPipeline::new(RenderConfig::for_locale("en"));
        pipeline.set_markdown("a <b>b</b>");
        pipeline.run_step().expect("render");
        assert!(pipeline.output().to_html().contains("<b>b</b>"));

        pipeline.set_remove_html(true);
        pipeline.run_step().expect("render");
        assert!(pipeline.output().to_html().contains("&lt;b&gt;b&lt;/b&gt;"));
    }

    #[test]
    fn deeply_nested_source_still_renders() {
        let mut pipeline = MarkdownPipeline::new(RenderConfig::for_locale("en"));
        pipeline.set_markdown("fine");
        pipeline.run_step().expect("render");

        pipeline.set_markdown(">".repeat(600) + " deep");
        let Ok(StepOutcome::Rendered(output)) = pipeline.run_step() else {
            panic!("deep quote renders");
        };
        assert_eq!(output.text_content(), "deep");
        assert_eq!(pipeline.run_step(), Ok(StepOutcome::Idle));
    }

    #[test]
    fn disposed_pipeline_does_nothing() {
        let mut pipeline = MarkdownPipeline::new(RenderConfig::for_locale("en"));
        pipeline.dispose();
        pipeline.set_markdown("ignored");
        assert_eq!(pipeline.run_step(), Ok(StepOutcome::Idle));
        assert!(pipeline.output().blocks.is_empty());
    }
}
