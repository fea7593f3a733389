use super::{CaptionRequest, ChatChunk, ChunkStream, Provider};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const CHUNK_DELAY: Duration = Duration::from_millis(10);

/// Offline provider that captions an image from its file name.
#[derive(Debug, Default, Clone)]
pub struct StubProvider;

impl StubProvider {
    pub fn new() -> Self {
        Self
    }
}

fn stub_caption(req: &CaptionRequest) -> String {
    let stem = req
        .image
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let mut caption = format!("a photo of {stem}");
    for rule in req.rules.iter() {
        caption.push_str(&format!("; {rule}"));
    }
    caption
}

impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn stream_chat(
        &self,
        req: CaptionRequest,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<ChunkStream>> + Send>> {
        Box::pin(async move {
            let (tx, rx) = mpsc::channel::<anyhow::Result<ChatChunk>>(32);
            let caption = stub_caption(&req);

            tokio::spawn(async move {
                for word in caption.split_inclusive(' ') {
                    tokio::time::sleep(CHUNK_DELAY).await;
                    if tx.send(Ok(ChatChunk { text: word.to_string() })).await.is_err() {
                        break;
                    }
                }
            });

            anyhow::Ok(Box::pin(ReceiverStream::new(rx)) as ChunkStream)
        })
    }
}
