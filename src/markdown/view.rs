use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::task::Spawn;

use super::config::RenderConfig;
use super::parse::Tokenizer;
use super::pipeline::MarkdownPipeline;
use super::render::RenderedMarkdown;
use crate::error::{MarkdownError, MarkdownResult};
use crate::id::KeyHasher;
use crate::scheduler::ThrottleScheduler;

pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct ViewOptions {
    pub throttle: Duration,
    pub key_namespace: Option<String>,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            throttle: DEFAULT_THROTTLE,
            key_namespace: None,
        }
    }
}

impl ViewOptions {
    pub fn throttle(mut self, value: Duration) -> Self {
        self.throttle = value;
        self
    }

    /// Namespaces node keys so trees from different views never share keys.
    pub fn key_namespace(mut self, value: impl Into<String>) -> Self {
        self.key_namespace = Some(value.into());
        self
    }
}

fn lock_pipeline<'a>(
    pipeline: &'a Mutex<MarkdownPipeline>,
    context: &'static str,
) -> MarkdownResult<MutexGuard<'a, MarkdownPipeline>> {
    pipeline
        .lock()
        .map_err(|_| MarkdownError::StatePoisoned(context))
}

/// Host object for one rendered markdown document. Mutations are applied to the
/// pipeline immediately and rendering is throttled through the scheduler.
pub struct MarkdownView {
    pipeline: Arc<Mutex<MarkdownPipeline>>,
    scheduler: ThrottleScheduler<()>,
}

impl MarkdownView {
    pub fn new(
        config: RenderConfig,
        options: ViewOptions,
        spawner: impl Spawn + Send + Sync + 'static,
    ) -> Self {
        let tokenizer = match &options.key_namespace {
            Some(namespace) => Tokenizer::new().with_key_hasher(KeyHasher::with_namespace(namespace)),
            None => Tokenizer::new(),
        };
        let pipeline = Arc::new(Mutex::new(MarkdownPipeline::with_tokenizer(tokenizer, config)));

        let step_pipeline = Arc::clone(&pipeline);
        let scheduler = ThrottleScheduler::new(options.throttle, spawner, move |()| {
            let mut pipeline = lock_pipeline(&step_pipeline, "running a render step")?;
            pipeline.run_step().map(|_| ())
        });

        Self {
            pipeline,
            scheduler,
        }
    }

    fn update(
        &self,
        context: &'static str,
        apply: impl FnOnce(&mut MarkdownPipeline),
    ) -> MarkdownResult<()> {
        {
            let mut pipeline = lock_pipeline(&self.pipeline, context)?;
            if pipeline.is_disposed() {
                return Err(MarkdownError::Disposed);
            }
            apply(&mut *pipeline);
        }
        self.scheduler.schedule(());
        Ok(())
    }

    pub fn set_markdown(&self, markdown: impl Into<String>) -> MarkdownResult<()> {
        let markdown = markdown.into();
        self.update("setting markdown", move |pipeline| {
            pipeline.set_markdown(markdown)
        })
    }

    pub fn append_markdown(&self, chunk: &str) -> MarkdownResult<()> {
        self.update("appending markdown", |pipeline| pipeline.append_markdown(chunk))
    }

    pub fn set_remove_html(&self, remove_html: bool) -> MarkdownResult<()> {
        self.update("toggling html removal", |pipeline| {
            pipeline.set_remove_html(remove_html)
        })
    }

    pub fn set_streaming(&self, streaming: bool) -> MarkdownResult<()> {
        self.update("toggling streaming", |pipeline| {
            pipeline.set_streaming(streaming)
        })
    }

    pub fn set_config(&self, config: RenderConfig) -> MarkdownResult<()> {
        self.update("replacing render config", move |pipeline| {
            pipeline.set_config(config)
        })
    }

    pub fn config(&self) -> MarkdownResult<Arc<RenderConfig>> {
        Ok(Arc::clone(
            lock_pipeline(&self.pipeline, "reading render config")?.config(),
        ))
    }

    pub fn source(&self) -> MarkdownResult<String> {
        Ok(lock_pipeline(&self.pipeline, "reading markdown source")?
            .source()
            .to_string())
    }

    /// The last rendered output. Staged updates are not visible until the
    /// table-streaming gate releases them.
    pub fn output(&self) -> MarkdownResult<Arc<RenderedMarkdown>> {
        Ok(lock_pipeline(&self.pipeline, "reading rendered output")?.output())
    }

    pub fn render_count(&self) -> usize {
        self.scheduler.runs()
    }

    pub fn flush(&self) {
        self.scheduler.flush();
    }

    pub async fn when_settled(&self) {
        self.scheduler.when_settled().await;
    }

    pub fn dispose(&self) {
        self.scheduler.dispose();
        match lock_pipeline(&self.pipeline, "disposing pipeline") {
            Ok(mut pipeline) => pipeline.dispose(),
            Err(error) => log::warn!(target: "calmchat::view", "{error}"),
        }
    }
}

impl Drop for MarkdownView {
    fn drop(&mut self) {
        self.dispose();
    }
}
