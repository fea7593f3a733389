use std::path::PathBuf;
use thiserror::Error;

/// Errors that end a captioning batch.
///
/// Every variant is fatal for the whole batch. Snapshots yielded before the
/// error remain valid partial results.
#[derive(Debug, Error)]
pub enum CaptionError {
    /// No credential was supplied and none was found in the environment.
    #[error("missing API credential: pass --api-key or set {env_var}")]
    MissingCredential { env_var: &'static str },

    #[error("too many images: {count} (maximum is {max})")]
    TooManyImages { count: usize, max: usize },

    #[error("caption slot count ({slots}) does not match image count ({images})")]
    SlotCountMismatch { images: usize, slots: usize },

    /// An image could not be read or is not a recognised image format.
    #[error("failed to load image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Failure reported by the chat provider. The message is passed through as-is.
    #[error(transparent)]
    Service(anyhow::Error),
}

/// Failures with a known HTTP meaning, attached as the root cause of a
/// provider's `anyhow::Error`.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} rejected the credential (HTTP {status}): {body}")]
    Unauthorized {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} rate limit exceeded: {body}")]
    RateLimited { provider: &'static str, body: String },

    #[error("{provider} API error: HTTP {status}: {body}")]
    Http {
        provider: &'static str,
        status: u16,
        body: String,
    },
}

impl ProviderError {
    pub fn from_status(provider: &'static str, status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => Self::Unauthorized {
                provider,
                status: status.as_u16(),
                body,
            },
            429 => Self::RateLimited { provider, body },
            code => Self::Http {
                provider,
                status: code,
                body,
            },
        }
    }
}
