//! Configuration types.
//!
//! The collector is configured from a single JSON document. Secrets can be
//! overridden from the environment so the file can be committed without them.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use regex::Regex;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use tracing::error;

use crate::error::ConfigError;

/// Longest reply the upstream platform accepts.
const MAX_REPLY_LENGTH: usize = 140;

/// Reserved for `@username ` (15 char handle, `@` and a space).
const MENTION_RESERVE: usize = 17;

/// Reserved for a 13 digit millisecond timestamp and a space.
const TIMESTAMP_RESERVE: usize = 14;

/// Every URL is shortened to this many characters by the platform.
const SHORT_URL_LENGTH: usize = 23;

/// The provider sends a keep-alive every 30s; a shorter idle timeout always fires.
const KEEP_ALIVE_INTERVAL_MS: u64 = 30_000;

/// Full collector configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportsConfig {
    /// Instance name, used for the log file prefix.
    #[serde(default = "default_instance")]
    pub instance: String,
    pub stream: StreamConfig,
    #[serde(default)]
    pub twitter: TwitterConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Upstream stream and rules endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub stream_url: String,
    pub rules_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default = "empty_secret", deserialize_with = "deserialize_secret")]
    pub password: SecretString,
    /// Reconnect if nothing (data or keep-alive) arrives within this window.
    /// Must exceed the provider's keep-alive interval (30s).
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_initial_reconnect_delay_ms")]
    pub initial_reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
    /// Rule tag → rule query. The tag prefix decides which signal a match raises.
    #[serde(default)]
    pub rules: BTreeMap<String, String>,
    /// Accounts notified once an outage reaches the maximum reconnect delay.
    #[serde(default)]
    pub admin_recipients: Vec<String>,
}

impl StreamConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn initial_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.initial_reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }
}

/// Outbound reply settings and localized message texts.
#[derive(Debug, Clone, Deserialize)]
pub struct TwitterConfig {
    /// When false, replies are logged instead of sent (dependent steps still run).
    #[serde(default)]
    pub send_enabled: bool,
    /// Append a millisecond timestamp so repeated texts aren't rejected as duplicates.
    #[serde(default = "default_true")]
    pub add_timestamp: bool,
    #[serde(default = "default_language")]
    pub default_language: String,
    /// Accounts that never receive replies (e.g. the monitored account itself).
    #[serde(default)]
    pub reply_blacklist: Vec<String>,
    /// Account whose retweets mark a stored report as verified.
    #[serde(default)]
    pub username_verify: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "empty_secret", deserialize_with = "deserialize_secret")]
    pub bearer_token: SecretString,
    /// Message code (`invite_text`, `askforgeo_text`, `thanks_text`) → language → text.
    #[serde(default)]
    pub messages: HashMap<String, HashMap<String, String>>,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            send_enabled: false,
            add_timestamp: true,
            default_language: default_language(),
            reply_blacklist: Vec::new(),
            username_verify: None,
            api_url: default_api_url(),
            bearer_token: empty_secret(),
            messages: HashMap::new(),
        }
    }
}

/// Database location and table names.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default)]
    pub tables: TableNames,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            tables: TableNames::default(),
        }
    }
}

/// Table names are injected so deployments can share a schema with other collectors.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub reports: String,
    pub users: String,
    pub invitees: String,
    pub unconfirmed: String,
    pub nonspatial_reports: String,
    pub nonspatial_users: String,
    pub all_reports: String,
    pub all_users: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            reports: "tweet_reports".into(),
            users: "tweet_users".into(),
            invitees: "tweet_invitees".into(),
            unconfirmed: "tweet_reports_unconfirmed".into(),
            nonspatial_reports: "nonspatial_tweet_reports".into(),
            nonspatial_users: "nonspatial_tweet_users".into(),
            all_reports: "all_reports".into(),
            all_users: "all_users".into(),
        }
    }
}

impl ReportsConfig {
    /// Parse a configuration document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load configuration from a file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_json(&raw)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Secrets from `POWERTRACK_PASSWORD` / `TWITTER_BEARER_TOKEN` and the
    /// database path from `REPORTS_DB_PATH` win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var("POWERTRACK_PASSWORD") {
            self.stream.password = SecretString::from(password);
        }
        if let Ok(token) = std::env::var("TWITTER_BEARER_TOKEN") {
            self.twitter.bearer_token = SecretString::from(token);
        }
        if let Ok(path) = std::env::var("REPORTS_DB_PATH") {
            self.database.path = path;
        }
    }

    /// Check values that would otherwise only fail at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.idle_timeout_ms <= KEEP_ALIVE_INTERVAL_MS {
            return Err(ConfigError::InvalidValue {
                key: "stream.idle_timeout_ms".into(),
                message: format!(
                    "{} must exceed the {KEEP_ALIVE_INTERVAL_MS} ms keep-alive interval",
                    self.stream.idle_timeout_ms
                ),
            });
        }
        if self.stream.initial_reconnect_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "stream.initial_reconnect_delay_ms".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.stream.max_reconnect_delay_ms < self.stream.initial_reconnect_delay_ms {
            return Err(ConfigError::InvalidValue {
                key: "stream.max_reconnect_delay_ms".into(),
                message: format!(
                    "{} is below the initial delay {}",
                    self.stream.max_reconnect_delay_ms, self.stream.initial_reconnect_delay_ms
                ),
            });
        }
        if self.stream.rules.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "stream.rules".into(),
                hint: "Configure at least one tagged rule.".into(),
            });
        }
        if !message_lengths_ok(&self.twitter) {
            return Err(ConfigError::InvalidValue {
                key: "twitter.messages".into(),
                message: "one or more message texts are too long".into(),
            });
        }
        Ok(())
    }
}

/// Check that every configured message fits in a reply once the mention
/// (and timestamp, if enabled) are added. Each offending text is logged.
pub fn message_lengths_ok(twitter: &TwitterConfig) -> bool {
    let mut max_length = MAX_REPLY_LENGTH - MENTION_RESERVE;
    if twitter.add_timestamp {
        max_length -= TIMESTAMP_RESERVE;
    }

    let url = url_regex();
    let mut ok = true;
    for (code, texts) in &twitter.messages {
        for (lang, text) in texts {
            let length = reply_length(&url, text);
            if length > max_length {
                error!(
                    code = %code,
                    lang = %lang,
                    length,
                    max_length,
                    "Message text is too long"
                );
                ok = false;
            }
        }
    }
    ok
}

/// Character count as the platform sees it: URLs count as a fixed short length.
fn reply_length(url: &Regex, text: &str) -> usize {
    url.find_iter(text).fold(text.chars().count(), |len, m| {
        len - m.as_str().chars().count() + SHORT_URL_LENGTH
    })
}

fn url_regex() -> Regex {
    Regex::new(r"http[^ ]*").expect("static regex")
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

fn default_instance() -> String {
    "powertrack-reports".to_string()
}

fn default_idle_timeout_ms() -> u64 {
    60_000
}

fn default_initial_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_max_reconnect_delay_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    "en".to_string()
}

fn default_api_url() -> String {
    "https://api.twitter.com".to_string()
}

fn default_db_path() -> String {
    "./data/reports.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;

    const MINIMAL: &str = r#"{
        "stream": {
            "stream_url": "https://stream.example.com/track.json",
            "rules_url": "https://api.example.com/rules.json",
            "username": "collector",
            "password": "hunter2",
            "rules": { "addressed": "flood @petajkt" }
        }
    }"#;

    #[test]
    fn defaults_fill_missing_sections() {
        let config = ReportsConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.stream.initial_reconnect_delay(), Duration::from_secs(1));
        assert_eq!(config.stream.max_reconnect_delay(), Duration::from_secs(300));
        assert_eq!(config.stream.idle_timeout(), Duration::from_secs(60));
        assert_eq!(config.stream.password.expose_secret(), "hunter2");
        assert!(!config.twitter.send_enabled);
        assert!(config.twitter.add_timestamp);
        assert_eq!(config.twitter.default_language, "en");
        assert_eq!(config.database.tables.all_users, "all_users");
    }

    #[test]
    fn partial_table_names_keep_defaults() {
        let raw = r#"{
            "stream": { "stream_url": "s", "rules_url": "r", "rules": { "location": "x" } },
            "database": { "path": ":memory:", "tables": { "reports": "flood_reports" } }
        }"#;
        let config = ReportsConfig::from_json(raw).unwrap();
        assert_eq!(config.database.tables.reports, "flood_reports");
        assert_eq!(config.database.tables.invitees, "tweet_invitees");
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = ReportsConfig::load(file.path()).unwrap();
        assert_eq!(config.stream.username, "collector");
    }

    #[test]
    fn invalid_json_is_parse_error() {
        let err = ReportsConfig::from_json("{").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn validate_rejects_max_below_initial() {
        let mut config = ReportsConfig::from_json(MINIMAL).unwrap();
        config.stream.max_reconnect_delay_ms = 500;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_reconnect_delay_ms"));
    }

    #[test]
    fn validate_rejects_idle_timeout_within_keep_alive() {
        let mut config = ReportsConfig::from_json(MINIMAL).unwrap();
        assert!(config.validate().is_ok());

        for idle_timeout_ms in [0, 5_000, KEEP_ALIVE_INTERVAL_MS] {
            config.stream.idle_timeout_ms = idle_timeout_ms;
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("idle_timeout_ms"));
        }

        config.stream.idle_timeout_ms = 45_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_requires_rules() {
        let mut config = ReportsConfig::from_json(MINIMAL).unwrap();
        config.stream.rules.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn message_length_limit_depends_on_timestamp() {
        let mut twitter = TwitterConfig::default();
        // 109 allowed with timestamp, 123 without
        let text = "x".repeat(115);
        twitter
            .messages
            .insert("invite_text".into(), HashMap::from([("en".into(), text)]));
        assert!(!message_lengths_ok(&twitter));
        twitter.add_timestamp = false;
        assert!(message_lengths_ok(&twitter));
    }

    #[test]
    fn urls_count_as_short_links() {
        let url = url_regex();
        let long_url = format!("see http://example.com/{}", "a".repeat(60));
        assert_eq!(reply_length(&url, &long_url), 4 + SHORT_URL_LENGTH);
        assert_eq!(reply_length(&url, "no links here"), 13);
    }
}
