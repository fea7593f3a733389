use super::sse::{spawn_chunk_stream, Decoded};
use super::{CaptionRequest, ChunkStream, Provider};
use crate::error::ProviderError;
use anyhow::{anyhow, Context};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone)]
pub struct GoogleProvider {
    http: reqwest::Client,
    api_base: Url,
}

impl GoogleProvider {
    pub fn new(http: reqwest::Client, api_base: Option<&str>) -> anyhow::Result<Self> {
        let base = api_base.unwrap_or("https://generativelanguage.googleapis.com/");
        let api_base = super::base_url(base).with_context(|| format!("invalid Gemini api_base: {base}"))?;
        Ok(Self { http, api_base })
    }

    fn build_url(&self, model: &str, api_key: &str) -> anyhow::Result<Url> {
        // v1beta:streamGenerateContent supports Server-Sent Events with alt=sse.
        let mut url = self
            .api_base
            .join(&format!("v1beta/models/{model}:streamGenerateContent"))?;
        url.query_pairs_mut()
            .append_pair("key", api_key)
            .append_pair("alt", "sse");
        Ok(url)
    }
}

fn build_body(req: &CaptionRequest) -> StreamGenerateContentRequest {
    StreamGenerateContentRequest {
        system_instruction: req.rules.system_prompt().map(|text| Content {
            role: None,
            parts: vec![Part::text(text)],
        }),
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                Part::text(req.instruction.clone()),
                Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: req.image.mime_type.to_string(),
                        data: req.image.base64(),
                    }),
                },
            ],
        }],
    }
}

impl Provider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn stream_chat(
        &self,
        req: CaptionRequest,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<ChunkStream>> + Send>> {
        let this = self.clone();

        Box::pin(async move {
            let url = this.build_url(&req.model, req.credential.expose())?;
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

            let resp = this
                .http
                .post(url)
                .headers(headers)
                .json(&build_body(&req))
                .send()
                .await
                // The URL carries the key; keep it out of the error chain.
                .map_err(|e| anyhow!(e.without_url()))
                .context("failed to start Gemini request")?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(anyhow::Error::new(ProviderError::from_status("google", status, text)));
            }

            anyhow::Ok(spawn_chunk_stream(resp, decode_event))
        })
    }
}

fn decode_event(data: &str) -> anyhow::Result<Decoded> {
    let r: StreamGenerateContentResponse =
        serde_json::from_str(data).context("failed to parse SSE JSON")?;
    Ok(match extract_text(&r) {
        Some(text) => Decoded::Text(text),
        None => Decoded::Skip,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamGenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StreamGenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            inline_data: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

fn extract_text(r: &StreamGenerateContentResponse) -> Option<String> {
    // Concatenate all text parts of the first candidate.
    let cand = r.candidates.first()?;
    let content = cand.content.as_ref()?;
    let out: String = content.parts.iter().filter_map(|p| p.text.as_deref()).collect();
    if out.is_empty() { None } else { Some(out) }
}
