//! Worker configuration resolution
//!
//! Static settings, resolved once at startup with ENV → TOML priority. The
//! runtime-mutable gates live in [`crate::gates`], not here.

use std::time::Duration;
use tagboard_common::config::{env_var, resolve_setting, TomlConfig};
use tagboard_common::normalize::{Normalizer, DEFAULT_STOPWORDS};
use tagboard_common::{Error, Result};

const DEFAULT_TAGGER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_IDLE_INTERVAL_SECS: u64 = 60;
const DEFAULT_DAILY_CAP: u32 = 200;

/// Resolved worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Tagging endpoint. `None` leaves the worker idling fail-closed.
    pub tagger_endpoint: Option<String>,
    pub tagger_api_key: Option<String>,
    /// Hard bound on one tagging call.
    pub tagger_timeout: Duration,
    /// Short sleep: queue empty or collaborator unconfigured.
    pub poll_interval: Duration,
    /// Long sleep: paused or daily cap reached.
    pub idle_interval: Duration,
    /// Default daily cap; `TAGBOARD_DAILY_CAP` overrides it per iteration.
    pub default_daily_cap: u32,
    pub public_url_base: Option<String>,
    pub signed_url_base: Option<String>,
    pub extra_stopwords: Vec<String>,
}

fn resolve_secs(env_name: &str, toml_value: Option<u64>, default: u64) -> u64 {
    env_var(env_name)
        .and_then(|v| v.trim().parse().ok())
        .or(toml_value)
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Resolve from environment and a loaded TOML config.
    pub fn resolve(toml: &TomlConfig) -> Result<Self> {
        let database_url = resolve_setting(
            "database URL",
            "TAGBOARD_DATABASE_URL",
            toml.database_url.as_ref(),
        )
        .ok_or_else(|| {
            Error::Config(
                "database URL not configured; set TAGBOARD_DATABASE_URL or database_url in the \
                 config file"
                    .to_string(),
            )
        })?;

        let tagger_endpoint = resolve_setting(
            "tagger endpoint",
            "TAGBOARD_TAGGER_ENDPOINT",
            toml.tagger_endpoint.as_ref(),
        );
        let tagger_api_key = resolve_setting(
            "tagger API key",
            "TAGBOARD_TAGGER_API_KEY",
            toml.tagger_api_key.as_ref(),
        );

        let default_daily_cap = env_var("TAGBOARD_DAILY_CAP")
            .and_then(|v| v.trim().parse().ok())
            .or(toml.daily_cap)
            .unwrap_or(DEFAULT_DAILY_CAP);

        Ok(Self {
            database_url,
            tagger_endpoint,
            tagger_api_key,
            tagger_timeout: Duration::from_secs(resolve_secs(
                "TAGBOARD_TAGGER_TIMEOUT_SECS",
                toml.tagger_timeout_secs,
                DEFAULT_TAGGER_TIMEOUT_SECS,
            )),
            poll_interval: Duration::from_secs(resolve_secs(
                "TAGBOARD_POLL_INTERVAL_SECS",
                toml.poll_interval_secs,
                DEFAULT_POLL_INTERVAL_SECS,
            )),
            idle_interval: Duration::from_secs(resolve_secs(
                "TAGBOARD_IDLE_INTERVAL_SECS",
                toml.idle_interval_secs,
                DEFAULT_IDLE_INTERVAL_SECS,
            )),
            default_daily_cap,
            public_url_base: resolve_setting(
                "public URL base",
                "TAGBOARD_PUBLIC_URL_BASE",
                toml.public_url_base.as_ref(),
            ),
            signed_url_base: resolve_setting(
                "signed URL base",
                "TAGBOARD_SIGNED_URL_BASE",
                toml.signed_url_base.as_ref(),
            ),
            extra_stopwords: toml.extra_stopwords.clone().unwrap_or_default(),
        })
    }

    /// The normalizer every code path in this process shares: built-in
    /// stopwords plus any configured extras.
    pub fn normalizer(&self) -> Normalizer {
        Normalizer::with_stopwords(
            DEFAULT_STOPWORDS
                .iter()
                .map(|s| s.to_string())
                .chain(self.extra_stopwords.iter().cloned()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        for name in [
            "TAGBOARD_DATABASE_URL",
            "TAGBOARD_TAGGER_ENDPOINT",
            "TAGBOARD_TAGGER_API_KEY",
            "TAGBOARD_TAGGER_TIMEOUT_SECS",
            "TAGBOARD_DAILY_CAP",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn toml_only_resolution() {
        clear_env();
        let toml = TomlConfig {
            database_url: Some("postgres://localhost/tagboard_test".to_string()),
            daily_cap: Some(10),
            extra_stopwords: Some(vec!["re".to_string()]),
            ..Default::default()
        };
        let config = WorkerConfig::resolve(&toml).unwrap();
        assert_eq!(config.database_url, "postgres://localhost/tagboard_test");
        assert_eq!(config.default_daily_cap, 10);
        assert_eq!(
            config.tagger_timeout,
            Duration::from_secs(DEFAULT_TAGGER_TIMEOUT_SECS)
        );
        assert!(config.tagger_endpoint.is_none());
    }

    #[test]
    fn missing_database_url_is_a_config_error() {
        clear_env();
        let result = WorkerConfig::resolve(&TomlConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn normalizer_includes_extra_stopwords() {
        let toml = TomlConfig {
            database_url: Some("postgres://x/y".to_string()),
            extra_stopwords: Some(vec!["s".to_string()]),
            ..Default::default()
        };
        let config = WorkerConfig::resolve(&toml).unwrap();
        let n = config.normalizer();
        assert!(n.is_stopword("s"));
        assert!(n.is_stopword("the"));
    }
}
