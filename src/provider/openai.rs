use super::sse::{spawn_chunk_stream, Decoded};
use super::{CaptionRequest, ChunkStream, Provider};
use crate::error::ProviderError;
use anyhow::{anyhow, Context};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_base: Url,
}

impl OpenAiProvider {
    pub fn new(http: reqwest::Client, api_base: Option<&str>) -> anyhow::Result<Self> {
        let base = api_base.unwrap_or("https://api.openai.com/");
        let api_base = super::base_url(base).with_context(|| format!("invalid OpenAI api_base: {base}"))?;
        Ok(Self { http, api_base })
    }

    fn build_url(&self) -> anyhow::Result<Url> {
        Ok(self.api_base.join("v1/chat/completions")?)
    }
}

fn headers(credential: &str) -> anyhow::Result<HeaderMap> {
    let mut h = HeaderMap::new();
    h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let mut v = HeaderValue::from_str(&format!("Bearer {credential}")).map_err(|e| anyhow!(e))?;
    v.set_sensitive(true);
    h.insert(AUTHORIZATION, v);
    Ok(h)
}

fn build_body(req: &CaptionRequest) -> ChatCompletionRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = req.rules.system_prompt() {
        messages.push(Message {
            role: "system",
            content: MessageContent::Text(system),
        });
    }
    messages.push(Message {
        role: "user",
        content: MessageContent::Parts(vec![
            ContentPart::Text {
                text: req.instruction.clone(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: req.image.data_url(),
                    detail: "auto",
                },
            },
        ]),
    });

    ChatCompletionRequest {
        model: req.model.clone(),
        messages,
        stream: true,
    }
}

impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn stream_chat(
        &self,
        req: CaptionRequest,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<ChunkStream>> + Send>> {
        let this = self.clone();

        Box::pin(async move {
            let url = this.build_url()?;
            let headers = headers(req.credential.expose())?;
            let body = build_body(&req);

            let resp = this
                .http
                .post(url)
                .headers(headers)
                .json(&body)
                .send()
                .await
                .context("failed to start OpenAI request")?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(anyhow::Error::new(ProviderError::from_status("openai", status, text)));
            }

            anyhow::Ok(spawn_chunk_stream(resp, decode_event))
        })
    }
}

fn decode_event(data: &str) -> anyhow::Result<Decoded> {
    if data.trim() == "[DONE]" {
        return Ok(Decoded::Done);
    }
    let chunk: ChatCompletionChunk = serde_json::from_str(data).context("failed to parse SSE JSON")?;
    if let Some(err) = chunk.error {
        return Err(anyhow!("OpenAI stream error: {}", err.message));
    }
    match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
        Some(text) if !text.is_empty() => Ok(Decoded::Text(text)),
        _ => Ok(Decoded::Skip),
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}
