//! Transport configuration.
//!
//! # Design
//! Timeouts and the default server-trust policy are an explicit value handed
//! to `HttpsClient::new`; nothing is read from global state after
//! construction. Timeouts are kept as signed milliseconds so that "unset" and
//! "non-positive" both fall back to [`DEFAULT_TIMEOUT`].
//!
//! ## Environment Variables
//! - `WEIXIN_CONNECT_TIMEOUT_MS`: TCP/TLS connect timeout
//! - `WEIXIN_READ_TIMEOUT_MS`: socket read/write timeout
//! - `WEIXIN_SERVER_TRUST`: `accept-all` (default) or `platform`

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WeixinError;

/// Applied when a configured timeout is missing, zero or negative.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const CONNECT_TIMEOUT_ENV: &str = "WEIXIN_CONNECT_TIMEOUT_MS";
pub const READ_TIMEOUT_ENV: &str = "WEIXIN_READ_TIMEOUT_MS";
pub const SERVER_TRUST_ENV: &str = "WEIXIN_SERVER_TRUST";

/// How server certificates are checked when no client certificate is used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerTrust {
    /// Accept any certificate chain and host name. The platform's chains are
    /// not in every stock trust store, so this stays the default.
    #[default]
    AcceptAll,
    /// Verify against the platform trust store.
    Platform,
}

impl std::str::FromStr for ServerTrust {
    type Err = WeixinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept-all" | "lenient" => Ok(ServerTrust::AcceptAll),
            "platform" | "verify" => Ok(ServerTrust::Platform),
            other => Err(WeixinError::Config(format!("unknown server trust `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub connect_timeout_ms: i64,
    pub read_timeout_ms: i64,
    pub server_trust: ServerTrust,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_TIMEOUT.as_millis() as i64,
            read_timeout_ms: DEFAULT_TIMEOUT.as_millis() as i64,
            server_trust: ServerTrust::AcceptAll,
        }
    }
}

impl TransportConfig {
    /// Load from environment variables. Unset variables keep their defaults;
    /// set but unparsable ones are an error.
    pub fn from_env() -> Result<Self, WeixinError> {
        let mut config = Self::default();
        if let Some(ms) = env_millis(CONNECT_TIMEOUT_ENV)? {
            config.connect_timeout_ms = ms;
        }
        if let Some(ms) = env_millis(READ_TIMEOUT_ENV)? {
            config.read_timeout_ms = ms;
        }
        if let Ok(value) = std::env::var(SERVER_TRUST_ENV) {
            config.server_trust = value.parse()?;
        }
        Ok(config)
    }

    pub fn with_connect_timeout_ms(mut self, ms: i64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    pub fn with_read_timeout_ms(mut self, ms: i64) -> Self {
        self.read_timeout_ms = ms;
        self
    }

    pub fn with_server_trust(mut self, trust: ServerTrust) -> Self {
        self.server_trust = trust;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        effective_timeout(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        effective_timeout(self.read_timeout_ms)
    }
}

fn effective_timeout(ms: i64) -> Duration {
    if ms > 0 {
        Duration::from_millis(ms as u64)
    } else {
        DEFAULT_TIMEOUT
    }
}

fn env_millis(key: &str) -> Result<Option<i64>, WeixinError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| WeixinError::Config(format!("{key}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_ten_seconds_and_lenient() {
        let config = TransportConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.read_timeout(), Duration::from_secs(10));
        assert_eq!(config.server_trust, ServerTrust::AcceptAll);
    }

    #[test]
    fn non_positive_timeouts_fall_back() {
        let config = TransportConfig::default()
            .with_connect_timeout_ms(0)
            .with_read_timeout_ms(-5);
        assert_eq!(config.connect_timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.read_timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn positive_timeouts_are_used() {
        let config = TransportConfig::default()
            .with_connect_timeout_ms(2500)
            .with_read_timeout_ms(30_000);
        assert_eq!(config.connect_timeout(), Duration::from_millis(2500));
        assert_eq!(config.read_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: TransportConfig =
            serde_json::from_str(r#"{"read_timeout_ms": 3000, "server_trust": "platform"}"#).unwrap();
        assert_eq!(config.connect_timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.read_timeout(), Duration::from_secs(3));
        assert_eq!(config.server_trust, ServerTrust::Platform);
    }

    #[test]
    fn from_env_reads_all_values() {
        temp_env::with_vars(
            [
                (CONNECT_TIMEOUT_ENV, Some("1500")),
                (READ_TIMEOUT_ENV, Some("0")),
                (SERVER_TRUST_ENV, Some("platform")),
            ],
            || {
                let config = TransportConfig::from_env().unwrap();
                assert_eq!(config.connect_timeout(), Duration::from_millis(1500));
                assert_eq!(config.read_timeout(), DEFAULT_TIMEOUT);
                assert_eq!(config.server_trust, ServerTrust::Platform);
            },
        );
    }

    #[test]
    fn from_env_without_variables_is_default() {
        temp_env::with_vars_unset([CONNECT_TIMEOUT_ENV, READ_TIMEOUT_ENV, SERVER_TRUST_ENV], || {
            assert_eq!(TransportConfig::from_env().unwrap(), TransportConfig::default());
        });
    }

    #[test]
    fn from_env_rejects_garbage() {
        temp_env::with_var(CONNECT_TIMEOUT_ENV, Some("ten seconds"), || {
            let err = TransportConfig::from_env().unwrap_err();
            assert!(matches!(err, WeixinError::Config(_)));
        });
        temp_env::with_var(SERVER_TRUST_ENV, Some("sometimes"), || {
            assert!(matches!(TransportConfig::from_env(), Err(WeixinError::Config(_))));
        });
    }
}
