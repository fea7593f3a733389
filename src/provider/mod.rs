#[cfg(feature = "google")]
pub mod google;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(any(feature = "openai", feature = "google"))]
mod sse;
pub mod stub;
mod types;

pub use types::{CaptionRequest, ChatChunk, ChunkStream, Provider, DESCRIBE_INSTRUCTION};

/// Parse an API base URL, forcing a trailing `/` so `Url::join` keeps the
/// last path segment (`https://proxy/openai` -> `https://proxy/openai/`).
#[cfg(any(feature = "openai", feature = "google"))]
pub(crate) fn base_url(base: &str) -> anyhow::Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(base)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
