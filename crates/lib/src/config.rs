//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.smsxmpp/config.json`) and environment.
//! Secrets may come from the environment instead of the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::routing::is_phone_number;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener for SMS provider webhooks.
    #[serde(default)]
    pub http: HttpConfig,

    /// XMPP server connection and component identity.
    #[serde(default)]
    pub xmpp: XmppConfig,

    /// SMS provider selection and credentials.
    #[serde(default)]
    pub sms: SmsConfig,

    /// Bare JID -> E.164 phone number for each local user.
    #[serde(default)]
    pub users: BTreeMap<String, String>,

    /// How the gateway loop reacts to unexpected input.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Restart timing and limits.
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

/// HTTP bind address and optional basic auth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_http_host")]
    pub host: String,

    /// Port for provider webhooks (default 9677).
    #[serde(default = "default_http_port")]
    pub port: u16,

    pub username: Option<String>,
    pub password: Option<String>,
}

/// Credentials webhook callers must present. Only exists when both halves are configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl HttpConfig {
    /// Basic auth credentials, if both username and password are set and non-empty.
    pub fn basic_auth(&self) -> Option<BasicAuth> {
        let username = non_empty(self.username.as_deref())?;
        let password = non_empty(self.password.as_deref())?;
        Some(BasicAuth { username, password })
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
            username: None,
            password: None,
        }
    }
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    9677
}

/// XMPP component connection (XEP-0114).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XmppConfig {
    #[serde(default = "default_xmpp_host")]
    pub host: String,

    /// Component port on the XMPP server (default 5347).
    #[serde(default = "default_xmpp_port")]
    pub port: u16,

    /// Component domain, e.g. "sms.example.com". Phone-number JIDs live under it.
    #[serde(default)]
    pub component_name: String,

    /// Shared secret for the component handshake. Overridden by SMSXMPP_XMPP_SECRET env.
    pub shared_secret: Option<String>,
}

impl Default for XmppConfig {
    fn default() -> Self {
        Self {
            host: default_xmpp_host(),
            port: default_xmpp_port(),
            component_name: String::new(),
            shared_secret: None,
        }
    }
}

fn default_xmpp_host() -> String {
    "127.0.0.1".to_string()
}

fn default_xmpp_port() -> u16 {
    5347
}

/// SMS provider selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsConfig {
    /// Provider name (currently "twilio").
    pub provider: Option<String>,

    #[serde(default)]
    pub twilio: TwilioConfig,
}

/// Twilio account settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwilioConfig {
    pub account_sid: Option<String>,
    /// Overridden by TWILIO_AUTH_TOKEN env.
    pub auth_token: Option<String>,
    /// Public URL of this gateway's webhook; Twilio posts delivery status updates there.
    pub status_callback_url: Option<String>,
    /// API base URL override (tests, regional endpoints).
    pub api_base: Option<String>,
}

/// What the gateway does with a status code it has no variant for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownStatusPolicy {
    /// Terminate the gateway task; the supervisor restarts it.
    #[default]
    Crash,
    /// Log a warning and acknowledge the update.
    Ignore,
}

/// What the gateway does when an inbound XMPP message cannot be turned into an SMS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XmppErrorPolicy {
    /// Terminate the gateway task (and with it the pending receipts).
    #[default]
    Crash,
    /// Log a warning and drop only that message.
    Drop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default)]
    pub unknown_status: UnknownStatusPolicy,
    #[serde(default)]
    pub xmpp_errors: XmppErrorPolicy,
}

/// Restart timing for the supervised tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorConfig {
    /// Delay before reconnecting to the XMPP server (default 1000).
    #[serde(default = "default_xmpp_cooldown_ms")]
    pub xmpp_cooldown_ms: u64,

    /// Upper bound when the XMPP delay doubles on repeated failures. Defaults to the cooldown itself (fixed delay).
    pub max_cooldown_ms: Option<u64>,

    /// Give up after this many consecutive restarts of one task. Unlimited when absent.
    pub max_restarts: Option<u32>,
}

impl SupervisorConfig {
    pub fn xmpp_cooldown(&self) -> Duration {
        Duration::from_millis(self.xmpp_cooldown_ms)
    }

    pub fn max_cooldown(&self) -> Duration {
        let max = self.max_cooldown_ms.unwrap_or(self.xmpp_cooldown_ms);
        Duration::from_millis(max.max(self.xmpp_cooldown_ms))
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            xmpp_cooldown_ms: default_xmpp_cooldown_ms(),
            max_cooldown_ms: None,
            max_restarts: None,
        }
    }
}

fn default_xmpp_cooldown_ms() -> u64 {
    1000
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Env var wins over the config value; blank values count as unset.
fn env_or(var: &str, configured: Option<&str>) -> Option<String> {
    non_empty(std::env::var(var).ok().as_deref()).or_else(|| non_empty(configured))
}

/// Resolve the component shared secret: env SMSXMPP_XMPP_SECRET overrides config.
pub fn resolve_shared_secret(config: &Config) -> Option<String> {
    env_or("SMSXMPP_XMPP_SECRET", config.xmpp.shared_secret.as_deref())
}

/// Resolve the Twilio auth token: env TWILIO_AUTH_TOKEN overrides config.
pub fn resolve_twilio_token(config: &Config) -> Option<String> {
    env_or("TWILIO_AUTH_TOKEN", config.sms.twilio.auth_token.as_deref())
}

impl Config {
    /// Check the required settings before any task starts.
    pub fn validate(&self) -> Result<()> {
        if self.xmpp.component_name.trim().is_empty() {
            anyhow::bail!("xmpp.componentName is required");
        }
        if resolve_shared_secret(self).is_none() {
            anyhow::bail!("xmpp.sharedSecret (or SMSXMPP_XMPP_SECRET) is required");
        }
        for (jid, phone) in &self.users {
            if !is_phone_number(phone) {
                anyhow::bail!("users.{}: {:?} is not an E.164 phone number", jid, phone);
            }
        }
        Ok(())
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("SMSXMPP_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".smsxmpp").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, SMSXMPP_CONFIG_PATH, or the default path.
/// Unlike most settings files a missing file is an error: the XMPP identity has no default.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let s = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let config: Config = serde_json::from_str(&s)
        .with_context(|| format!("parsing config from {}", path.display()))?;
    log::debug!("loaded config from {}", path.display());
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_for_empty_document() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.http.host, "127.0.0.1");
        assert_eq!(config.http.port, 9677);
        assert_eq!(config.xmpp.port, 5347);
        assert_eq!(config.supervisor.xmpp_cooldown(), Duration::from_secs(1));
        assert_eq!(config.supervisor.max_cooldown(), Duration::from_secs(1));
        assert_eq!(config.gateway.unknown_status, UnknownStatusPolicy::Crash);
        assert_eq!(config.gateway.xmpp_errors, XmppErrorPolicy::Crash);
    }

    #[test]
    fn parses_camel_case_document() {
        let json = r#"{
            "http": { "port": 8080, "username": "twilio", "password": "pass" },
            "xmpp": { "componentName": "sms.example.com", "sharedSecret": "s3cr3t" },
            "sms": { "provider": "twilio", "twilio": { "accountSid": "AC1" } },
            "users": { "alice@example.com": "+15559998888" },
            "gateway": { "unknownStatus": "ignore", "xmppErrors": "drop" },
            "supervisor": { "xmppCooldownMs": 250, "maxCooldownMs": 4000, "maxRestarts": 3 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.xmpp.component_name, "sms.example.com");
        assert_eq!(config.sms.twilio.account_sid.as_deref(), Some("AC1"));
        assert_eq!(config.users["alice@example.com"], "+15559998888");
        assert_eq!(config.gateway.unknown_status, UnknownStatusPolicy::Ignore);
        assert_eq!(config.gateway.xmpp_errors, XmppErrorPolicy::Drop);
        assert_eq!(config.supervisor.max_cooldown(), Duration::from_secs(4));
        assert_eq!(config.supervisor.max_restarts, Some(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn basic_auth_requires_both_halves() {
        let mut http = HttpConfig::default();
        assert_eq!(http.basic_auth(), None);
        http.username = Some("twilio".to_string());
        assert_eq!(http.basic_auth(), None);
        http.password = Some("  ".to_string());
        assert_eq!(http.basic_auth(), None);
        http.password = Some("pass".to_string());
        assert_eq!(
            http.basic_auth(),
            Some(BasicAuth {
                username: "twilio".to_string(),
                password: "pass".to_string(),
            })
        );
    }

    #[test]
    fn max_cooldown_never_below_base() {
        let sup = SupervisorConfig {
            xmpp_cooldown_ms: 2000,
            max_cooldown_ms: Some(500),
            max_restarts: None,
        };
        assert_eq!(sup.max_cooldown(), Duration::from_secs(2));
    }

    #[test]
    fn validate_rejects_missing_component_and_bad_phone() {
        let mut config = Config::default();
        config.xmpp.shared_secret = Some("s3cr3t".to_string());
        assert!(config.validate().is_err());

        config.xmpp.component_name = "sms.example.com".to_string();
        assert!(config.validate().is_ok());

        config
            .users
            .insert("bob@example.com".to_string(), "555-1234".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_reports_missing_file() {
        let path = std::env::temp_dir().join(format!("smsxmpp-missing-{}.json", uuid::Uuid::new_v4()));
        let err = load_config(Some(path)).unwrap_err();
        assert!(err.to_string().contains("reading config"));
    }
}
