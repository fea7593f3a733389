use crate::loader::ImageData;
use crate::rules::RuleSet;
use crate::settings::Credential;
use futures_core::stream::BoxStream;

/// Fixed instruction sent alongside every image.
pub const DESCRIBE_INSTRUCTION: &str = "Describe the image";

/// One per-image captioning request.
#[derive(Debug, Clone)]
pub struct CaptionRequest {
    /// Position of the image in the batch; results are placed by this tag.
    pub index: usize,
    pub model: String,
    pub instruction: String,
    pub image: ImageData,

    /// Carried for prompt composition; not sent to the model yet.
    #[allow(dead_code)]
    pub topic_hint: Option<String>,

    pub rules: RuleSet,
    pub credential: Credential,
}

#[derive(Debug, Clone)]
pub struct ChatChunk {
    pub text: String,
}

pub type ChunkStream = BoxStream<'static, anyhow::Result<ChatChunk>>;

/// Provider interface: stream the reply to one image request.
pub trait Provider {
    fn name(&self) -> &'static str;

    fn stream_chat(
        &self,
        req: CaptionRequest,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<ChunkStream>> + Send>>;
}
