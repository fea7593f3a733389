use std::fmt;
use std::sync::Arc;

/// API secret shared read-only across every request in a batch.
///
/// `Debug` and `Display` never reveal the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    /// `None` for empty or whitespace-only input.
    pub fn new(secret: impl AsRef<str>) -> Option<Self> {
        let secret = secret.as_ref().trim();
        if secret.is_empty() {
            None
        } else {
            Some(Self(Arc::from(secret)))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Environment variable holding the default credential for a provider.
pub fn credential_env_var(provider: &str) -> &'static str {
    match provider {
        "google" => "GEMINI_API_KEY",
        _ => "OPENAI_API_KEY",
    }
}

/// Values read from the process environment once at startup.
#[derive(Debug, Clone, Default)]
pub struct AmbientConfig {
    pub openai_api_key: Option<Credential>,
    pub gemini_api_key: Option<Credential>,
}

impl AmbientConfig {
    pub fn from_env() -> Self {
        let read = |key: &str| std::env::var(key).ok().and_then(Credential::new);
        Self {
            openai_api_key: read("OPENAI_API_KEY"),
            gemini_api_key: read("GEMINI_API_KEY"),
        }
    }

    fn credential_for(&self, provider: &str) -> Option<Credential> {
        match provider {
            "google" => self.gemini_api_key.clone(),
            _ => self.openai_api_key.clone(),
        }
    }
}

/// The two user-settable caption inputs: rules text and credential.
#[derive(Debug, Clone)]
pub struct CaptionSettings {
    rules: String,
    credential: Option<Credential>,
}

impl CaptionSettings {
    pub fn new(
        ambient: &AmbientConfig,
        provider: &str,
        rules: Option<String>,
        credential: Option<String>,
    ) -> Self {
        let credential = credential
            .and_then(Credential::new)
            .or_else(|| ambient.credential_for(provider));
        Self {
            rules: rules.unwrap_or_default(),
            credential,
        }
    }

    /// Free-text rules, empty when unset. Not validated here.
    pub fn caption_rules(&self) -> &str {
        &self.rules
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ambient() -> AmbientConfig {
        AmbientConfig {
            openai_api_key: Credential::new("sk-env"),
            gemini_api_key: None,
        }
    }

    #[test]
    fn explicit_credential_wins() {
        let s = CaptionSettings::new(&ambient(), "openai", None, Some("sk-cli".into()));
        assert_eq!(s.credential().map(Credential::expose), Some("sk-cli"));
        assert_eq!(s.caption_rules(), "");
    }

    #[test]
    fn falls_back_to_environment() {
        let s = CaptionSettings::new(&ambient(), "openai", Some("be brief".into()), Some("  ".into()));
        assert_eq!(s.credential().map(Credential::expose), Some("sk-env"));
        assert_eq!(s.caption_rules(), "be brief");

        let s = CaptionSettings::new(&ambient(), "google", None, None);
        assert!(s.credential().is_none());
    }

    #[test]
    fn secret_is_redacted() {
        let c = Credential::new("sk-secret").unwrap();
        assert_eq!(format!("{c:?}"), "Credential(***)");
        assert_eq!(c.to_string(), "***");
    }
}
