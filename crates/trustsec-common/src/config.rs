//! Configuration for the ERS session
//!
//! Loaded from an optional TOML file and then overridden by the `ISE_*`
//! environment variables. The resulting [`ErsConfig`] is passed explicitly to
//! every component; nothing reads the environment after startup.

use crate::endpoints::{
    MERAKI_BASE_URL, REQUEST_TIMEOUT_SECS, REST_PAGE_SIZE_MAX, TCP_CONNECTIONS_DEFAULT, TCP_CONNECTIONS_MAX,
};
use crate::error::{ErsError, ErsResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Hostname or IP address of the primary admin node
pub const ENV_HOST: &str = "ISE_PPAN";
/// ERS admin or operator username
pub const ENV_USERNAME: &str = "ISE_REST_USERNAME";
/// ERS admin or operator password
pub const ENV_PASSWORD: &str = "ISE_REST_PASSWORD";
/// Whether to validate the node certificate
pub const ENV_VERIFY: &str = "ISE_VERIFY";
/// Meraki dashboard API key
pub const ENV_MERAKI_API_KEY: &str = "MERAKI_DASHBOARD_API_KEY";
/// Meraki organization holding the adaptive policy
pub const ENV_MERAKI_ORG_ID: &str = "MERAKI_ORG_ID";

/// Remote node and credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname or IP address
    #[serde(default)]
    pub host: String,

    /// Basic auth username
    #[serde(default)]
    pub username: String,

    /// Basic auth password
    #[serde(default)]
    pub password: String,

    /// Validate the TLS certificate
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            verify_tls: default_verify_tls(),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

/// Request shaping limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum simultaneous connections to the node
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Resources requested per list page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Meraki dashboard access for the adaptive policy export
#[derive(Clone, Serialize, Deserialize)]
pub struct MerakiConfig {
    /// Dashboard API base URL
    #[serde(default = "default_meraki_base_url")]
    pub base_url: String,

    /// Dashboard API key
    #[serde(default)]
    pub api_key: String,

    /// Organization id; the first accessible organization when empty
    #[serde(default)]
    pub org_id: String,
}

impl Default for MerakiConfig {
    fn default() -> Self {
        Self {
            base_url: default_meraki_base_url(),
            api_key: String::new(),
            org_id: String::new(),
        }
    }
}

impl fmt::Debug for MerakiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerakiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("org_id", &self.org_id)
            .finish()
    }
}

/// Complete session configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErsConfig {
    /// Remote node
    #[serde(default)]
    pub server: ServerConfig,

    /// Request limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Meraki dashboard
    #[serde(default)]
    pub meraki: MerakiConfig,
}

fn default_verify_tls() -> bool {
    true
}

fn default_meraki_base_url() -> String {
    MERAKI_BASE_URL.to_string()
}

fn default_max_connections() -> usize {
    TCP_CONNECTIONS_DEFAULT
}

fn default_page_size() -> usize {
    REST_PAGE_SIZE_MAX
}

fn default_timeout_secs() -> u64 {
    REQUEST_TIMEOUT_SECS
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Interprets an `ISE_VERIFY` style flag. Values starting with `f` or `n`
/// (false, no) disable verification; anything else enables it.
pub fn parse_verify_flag(value: &str) -> bool {
    !matches!(
        value.chars().next().map(|c| c.to_ascii_lowercase()),
        Some('f') | Some('n')
    )
}

impl ErsConfig {
    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> ErsResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                ErsError::invalid_config(
                    path.display().to_string(),
                    format!("failed to parse: {}", e),
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ErsError::Io(e)),
        }
    }

    /// Overlay `ISE_*` and `MERAKI_*` variables from the given iterator.
    pub fn apply_env<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let value: String = value.into();
            match key.as_ref() {
                ENV_HOST => self.server.host = value,
                ENV_USERNAME => self.server.username = value,
                ENV_PASSWORD => self.server.password = value,
                ENV_VERIFY => self.server.verify_tls = parse_verify_flag(&value),
                ENV_MERAKI_API_KEY => self.meraki.api_key = value,
                ENV_MERAKI_ORG_ID => self.meraki.org_id = value,
                _ => {}
            }
        }
    }

    fn read(path: Option<&Path>) -> ErsResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_or_default(path)?,
            None => Self::default(),
        };
        config.apply_env(std::env::vars());
        Ok(config)
    }

    /// Load the optional file, overlay the process environment and validate.
    pub fn load(path: Option<&Path>) -> ErsResult<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`ErsConfig::load`], but validates only the Meraki section.
    pub fn load_meraki(path: Option<&Path>) -> ErsResult<Self> {
        let config = Self::read(path)?;
        config.validate_meraki()?;
        Ok(config)
    }

    /// Base URL of the node.
    pub fn base_url(&self) -> String {
        if self.server.host.starts_with("http://") || self.server.host.starts_with("https://") {
            self.server.host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.server.host)
        }
    }

    /// Per-request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.limits.timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> ErsResult<()> {
        if self.server.host.is_empty() {
            return Err(ErsError::invalid_config(
                "host",
                format!("set {} or [server].host", ENV_HOST),
            ));
        }

        if self.server.username.is_empty() || self.server.password.is_empty() {
            return Err(ErsError::invalid_config(
                "credentials",
                format!("set {} and {}", ENV_USERNAME, ENV_PASSWORD),
            ));
        }

        if self.limits.page_size == 0 || self.limits.page_size > REST_PAGE_SIZE_MAX {
            return Err(ErsError::invalid_config(
                "page_size",
                format!("must be 1-{}", REST_PAGE_SIZE_MAX),
            ));
        }

        self.validate_limits()
    }

    fn validate_limits(&self) -> ErsResult<()> {
        if self.limits.max_connections == 0 || self.limits.max_connections > TCP_CONNECTIONS_MAX {
            return Err(ErsError::invalid_config(
                "max_connections",
                format!("must be 1-{}", TCP_CONNECTIONS_MAX),
            ));
        }

        if self.limits.timeout_secs == 0 {
            return Err(ErsError::invalid_config("timeout_secs", "must be > 0"));
        }

        Ok(())
    }

    /// Validate the Meraki section
    pub fn validate_meraki(&self) -> ErsResult<()> {
        if self.meraki.api_key.is_empty() {
            return Err(ErsError::invalid_config(
                "api_key",
                format!("set {} or [meraki].api_key", ENV_MERAKI_API_KEY),
            ));
        }

        let url = &self.meraki.base_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ErsError::invalid_config("base_url", "must be an http(s) URL"));
        }

        self.validate_limits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> ErsConfig {
        let mut config = ErsConfig::default();
        config.apply_env([
            (ENV_HOST, "10.1.1.1"),
            (ENV_USERNAME, "admin"),
            (ENV_PASSWORD, "secret"),
        ]);
        config
    }

    #[test]
    fn test_default_limits() {
        let config = ErsConfig::default();
        assert_eq!(config.limits.max_connections, 5);
        assert_eq!(config.limits.page_size, 100);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.server.verify_tls);
    }

    #[test]
    fn test_defaults_without_env_verify_tls() {
        let mut config = ErsConfig::default();
        config.apply_env([
            (ENV_HOST, "10.1.1.1"),
            (ENV_USERNAME, "admin"),
            (ENV_PASSWORD, "secret"),
        ]);
        assert!(config.server.verify_tls);
        assert!(ServerConfig::default().verify_tls);
    }

    #[test]
    fn test_toml_without_server_section_verifies_tls() {
        let config: ErsConfig = toml::from_str("[limits]\nmax_connections = 5").unwrap();
        assert!(config.server.verify_tls);
        assert_eq!(config.limits.max_connections, 5);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[limits]\npage_size = 50").unwrap();
        let config = ErsConfig::load_or_default(file.path()).unwrap();
        assert!(config.server.verify_tls);
        assert_eq!(config.limits.page_size, 50);
    }

    #[test]
    fn test_meraki_env_and_validation() {
        let mut config = ErsConfig::default();
        assert_eq!(config.meraki.base_url, MERAKI_BASE_URL);
        assert!(matches!(
            config.validate_meraki(),
            Err(ErsError::InvalidConfig { ref field, .. }) if field == "api_key"
        ));

        config.apply_env([(ENV_MERAKI_API_KEY, "k3y"), (ENV_MERAKI_ORG_ID, "549236")]);
        assert_eq!(config.meraki.org_id, "549236");
        assert!(config.validate_meraki().is_ok());
        // The ISE section is not needed for a dashboard export
        assert!(config.validate().is_err());

        let debug = format!("{:?}", config);
        assert!(!debug.contains("k3y"));
    }

    #[test]
    fn test_verify_flag() {
        assert!(!parse_verify_flag("false"));
        assert!(!parse_verify_flag("No"));
        assert!(parse_verify_flag("true"));
        assert!(parse_verify_flag(""));
    }

    #[test]
    fn test_apply_env() {
        let mut config = valid_config();
        config.apply_env([(ENV_VERIFY, "False"), ("HOME", "/root")]);
        assert_eq!(config.server.host, "10.1.1.1");
        assert!(!config.server.verify_tls);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_missing_host() {
        let config = ErsConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ErsError::InvalidConfig { ref field, .. }) if field == "host"
        ));
    }

    #[test]
    fn test_validate_limits() {
        let mut config = valid_config();
        config.limits.page_size = 101;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.limits.max_connections = 31;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.limits.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_url() {
        let mut config = valid_config();
        assert_eq!(config.base_url(), "https://10.1.1.1");
        config.server.host = "http://127.0.0.1:9060/".to_string();
        assert_eq!(config.base_url(), "http://127.0.0.1:9060");
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = valid_config();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[server]
host = "ise.example.com"
verify_tls = false

[limits]
max_connections = 10
"#;
        let config: ErsConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "ise.example.com");
        assert!(!config.server.verify_tls);
        assert_eq!(config.limits.max_connections, 10);
        // Unspecified values should use defaults
        assert_eq!(config.limits.page_size, 100);
    }

    #[test]
    fn test_load_file_then_env_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nhost = \"from-file\"\nusername = \"ops\"").unwrap();

        let mut config = ErsConfig::load_or_default(file.path()).unwrap();
        config.apply_env([(ENV_HOST, "from-env")]);
        assert_eq!(config.server.host, "from-env");
        assert_eq!(config.server.username, "ops");
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = ErsConfig::load_or_default("/nonexistent/trustsec.toml").unwrap();
        assert_eq!(config.limits.page_size, 100);
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nhost=").unwrap();
        assert!(matches!(
            ErsConfig::load_or_default(file.path()),
            Err(ErsError::InvalidConfig { .. })
        ));
    }
}
