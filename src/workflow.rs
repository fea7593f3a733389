use crate::provider::{CaptionRequest, Provider};
use anyhow::anyhow;
use futures_core::stream::BoxStream;
use futures_util::{stream, StreamExt};
use std::sync::Arc;

/// Result of one task, tagged with the index of the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutput {
    pub index: usize,
    pub text: String,
}

/// One unit of work: every per-image request of a batch.
///
/// Outputs arrive in completion order, not submission order; callers must
/// place them by `TaskOutput::index`.
pub struct Workflow {
    tasks: Vec<CaptionRequest>,
    concurrency: usize,
}

impl Workflow {
    pub fn new(concurrency: usize) -> Self {
        Self {
            tasks: Vec::new(),
            concurrency: concurrency.max(1),
        }
    }

    pub fn add_task(&mut self, req: CaptionRequest) {
        self.tasks.push(req);
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run all tasks with at most `concurrency` in flight. Dropping the
    /// returned stream cancels whatever is still running.
    pub fn run(self, provider: Arc<dyn Provider + Send + Sync>) -> BoxStream<'static, anyhow::Result<TaskOutput>> {
        stream::iter(self.tasks)
            .map(move |req| run_task(Arc::clone(&provider), req))
            .buffer_unordered(self.concurrency)
            .boxed()
    }
}

async fn run_task(provider: Arc<dyn Provider + Send + Sync>, req: CaptionRequest) -> anyhow::Result<TaskOutput> {
    let index = req.index;
    let path = req.image.path.clone();
    tracing::debug!(index, path = %path.display(), provider = provider.name(), "submitting caption request");

    let mut chunks = provider.stream_chat(req).await?;
    let mut text = String::new();
    while let Some(chunk) = chunks.next().await {
        text.push_str(&chunk?.text);
    }

    let text = text.trim();
    if text.is_empty() {
        return Err(anyhow!("provider returned an empty caption for {}", path.display()));
    }
    Ok(TaskOutput {
        index,
        text: text.to_string(),
    })
}
