use anyhow::{anyhow, Context};
use base64::{engine::general_purpose, Engine as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Raw image bytes plus the MIME type sniffed from their header.
#[derive(Clone)]
pub struct ImageData {
    pub path: PathBuf,
    pub mime_type: &'static str,
    pub bytes: Arc<[u8]>,
}

impl std::fmt::Debug for ImageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageData")
            .field("path", &self.path)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImageData {
    pub fn base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64())
    }
}

/// Read an image from disk. Fails if the file is missing, empty, or not a
/// recognised image format.
pub fn load(path: impl AsRef<Path>) -> anyhow::Result<ImageData> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if bytes.is_empty() {
        return Err(anyhow!("file is empty"));
    }

    let format = image::guess_format(&bytes).context("unrecognised image format")?;

    Ok(ImageData {
        path: path.to_path_buf(),
        mime_type: format.to_mime_type(),
        bytes: bytes.into(),
    })
}
