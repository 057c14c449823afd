use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::error::ClientError;

pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8080/ws";

/// Where to dial and how hard to try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_url: String,
    /// Total dial attempts; 0 is treated as 1.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `GAMEROOM_SERVER_URL`, `GAMEROOM_MAX_RETRIES`
    /// and `GAMEROOM_RETRY_DELAY_SECS`. Unparsable values are logged and
    /// ignored.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("GAMEROOM_SERVER_URL") {
            self.server_url = url;
        }
        if let Some(raw) = lookup("GAMEROOM_MAX_RETRIES") {
            match raw.trim().parse() {
                Ok(n) => self.max_retries = n,
                Err(err) => warn!(value = %raw, error = %err, "ignoring GAMEROOM_MAX_RETRIES"),
            }
        }
        if let Some(raw) = lookup("GAMEROOM_RETRY_DELAY_SECS") {
            match raw.trim().parse() {
                Ok(secs) => self.retry_delay = Duration::from_secs(secs),
                Err(err) => warn!(value = %raw, error = %err, "ignoring GAMEROOM_RETRY_DELAY_SECS"),
            }
        }
        self
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    pub fn validate(&self) -> Result<Url, ClientError> {
        let url = Url::parse(&self.server_url)
            .map_err(|err| ClientError::InvalidUrl(format!("{}: {err}", self.server_url)))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(ClientError::InvalidUrl(format!(
                "{}: scheme must be ws or wss, not {other}",
                self.server_url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_apply_and_bad_values_are_ignored() {
        let env: HashMap<&str, &str> = [
            ("GAMEROOM_SERVER_URL", "wss://games.example.com/ws"),
            ("GAMEROOM_MAX_RETRIES", "five"),
            ("GAMEROOM_RETRY_DELAY_SECS", " 7 "),
        ]
        .into_iter()
        .collect();
        let config = ClientConfig::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.server_url, "wss://games.example.com/ws");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(7));
    }

    #[test]
    fn zero_retries_still_dials_once() {
        let config = ClientConfig { max_retries: 0, ..ClientConfig::default() };
        assert_eq!(config.attempts(), 1);
    }

    #[test]
    fn only_websocket_urls_validate() {
        assert!(ClientConfig::default().validate().is_ok());
        assert!(matches!(
            ClientConfig::new("http://127.0.0.1:8080/ws").validate(),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            ClientConfig::new("not a url").validate(),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
