use crate::{sync::HandleError, APP_USER_AGENT};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use url::Url;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the backend lives and how to talk to it.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    base_url: Url,
    anon_key: SecretString,
    request_timeout: Duration,
}

impl BackendConfig {
    /// # Errors
    /// Returns `HandleError::Config` if the URL is not an absolute http(s) URL
    /// with a host, or if the anon key is blank.
    pub fn new(base_url: &str, anon_key: SecretString) -> Result<Self, HandleError> {
        let mut url = Url::parse(base_url.trim())
            .map_err(|err| HandleError::Config(format!("invalid backend URL {base_url:?}: {err}")))?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(HandleError::Config(format!(
                    "unsupported backend URL scheme: {other}"
                )))
            }
        }

        if url.host_str().is_none() {
            return Err(HandleError::Config(
                "backend URL has no host".to_string(),
            ));
        }

        if anon_key.expose_secret().trim().is_empty() {
            return Err(HandleError::Config("backend anon key is empty".to_string()));
        }

        // Url::join replaces the last segment unless the base ends with '/'.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(Self {
            base_url: url,
            anon_key,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn anon_key(&self) -> &SecretString {
        &self.anon_key
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Resolves `path` against the base URL.
    ///
    /// # Errors
    /// Returns `HandleError::Config` if the joined URL is invalid.
    pub fn endpoint(&self, path: &str) -> Result<Url, HandleError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| HandleError::Config(format!("invalid endpoint {path}: {err}")))
    }

    /// Builds an HTTP client carrying the user agent and request timeout.
    ///
    /// # Errors
    /// Returns `HandleError::Init` if the TLS backend cannot be initialized.
    pub fn build_client(&self) -> Result<Client, HandleError> {
        Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(self.request_timeout)
            .build()
            .map_err(|err| HandleError::Init(format!("failed to build HTTP client: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SecretString {
        SecretString::from("anon".to_string())
    }

    #[test]
    fn normalizes_trailing_slash() {
        let config = BackendConfig::new("https://db.concord.dev/project", key()).unwrap();
        assert_eq!(config.base_url().as_str(), "https://db.concord.dev/project/");
        assert_eq!(
            config.endpoint("/auth/v1/user").unwrap().as_str(),
            "https://db.concord.dev/project/auth/v1/user"
        );
    }

    #[test]
    fn rejects_bad_urls_and_keys() {
        assert!(matches!(
            BackendConfig::new("not a url", key()),
            Err(HandleError::Config(_))
        ));
        assert!(matches!(
            BackendConfig::new("ftp://db.concord.dev", key()),
            Err(HandleError::Config(message)) if message.contains("ftp")
        ));
        assert!(matches!(
            BackendConfig::new("https://db.concord.dev", SecretString::from("  ".to_string())),
            Err(HandleError::Config(_))
        ));
    }

    #[test]
    fn builds_client_with_timeout() {
        let config = BackendConfig::new("http://127.0.0.1:54321", key())
            .unwrap()
            .with_request_timeout(Duration::from_millis(250));
        assert_eq!(config.request_timeout(), Duration::from_millis(250));
        assert!(config.build_client().is_ok());
    }
}
