//! ChattyBank Configuration
//!
//! TOML configuration loading with environment variable overrides

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_GRAPH_API_URL: &str = "https://graph.facebook.com/v2.6";
pub const DEFAULT_DIALOG_VERSION: &str = "2016-07-11";
pub const DEFAULT_OFFERS_BASE_URL: &str =
    "https://api.eu.apiconnect.ibmcloud.com/matthewcroninukibmcom-mattcronin/development/api/products";

/// Action tags with built-in meaning; config entries may not reuse them.
pub const RESERVED_ACTION_TAGS: &[&str] = &["check_balance", "end_conversation"];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub messenger: MessengerConfig,
    #[serde(default)]
    pub dialog: DialogConfig,
    #[serde(default)]
    pub offers: OffersConfig,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoreConfig {
    pub data_dir: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL (scheme included) used to build asset links.
    #[serde(default)]
    pub server_url: String,
    #[serde(default = "default_public_dir")]
    pub public_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            server_url: String::new(),
            public_dir: default_public_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessengerConfig {
    #[serde(default)]
    pub app_secret: String,
    #[serde(default)]
    pub validation_token: String,
    #[serde(default)]
    pub page_access_token: String,
    #[serde(default = "default_graph_api_url")]
    pub graph_api_url: String,
    pub request_timeout_secs: Option<u64>,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            app_secret: String::new(),
            validation_token: String::new(),
            page_access_token: String::new(),
            graph_api_url: default_graph_api_url(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default = "default_dialog_version")]
    pub version: String,
    pub request_timeout_secs: Option<u64>,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            workspace_id: String::new(),
            version: default_dialog_version(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffersConfig {
    #[serde(default = "default_offers_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub request_timeout_secs: Option<u64>,
}

impl Default for OffersConfig {
    fn default() -> Self {
        Self {
            base_url: default_offers_base_url(),
            client_id: String::new(),
            client_secret: String::new(),
            request_timeout_secs: None,
        }
    }
}

/// Extra lookup action: `tag` emitted by the dialog maps to a product query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    pub tag: String,
    pub query: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_public_dir() -> String {
    "public".to_string()
}

fn default_graph_api_url() -> String {
    DEFAULT_GRAPH_API_URL.to_string()
}

fn default_dialog_version() -> String {
    DEFAULT_DIALOG_VERSION.to_string()
}

fn default_offers_base_url() -> String {
    DEFAULT_OFFERS_BASE_URL.to_string()
}

impl Config {
    /// Loads `path` (when it exists), applies process environment overrides
    /// and validates the result.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chattybank").join("config.toml"))
    }

    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = self.core.data_dir.as_deref().map(str::trim) {
            if !dir.is_empty() {
                return expand_home(dir);
            }
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chattybank")
    }

    /// Environment wins over file values, matching how the platform
    /// credentials are usually injected in hosted deployments.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = non_empty("MESSENGER_APP_SECRET") {
            self.messenger.app_secret = value;
        }
        if let Some(value) = non_empty("MESSENGER_VALIDATION_TOKEN") {
            self.messenger.validation_token = value;
        }
        if let Some(value) = non_empty("MESSENGER_PAGE_ACCESS_TOKEN") {
            self.messenger.page_access_token = value;
        }
        if let Some(value) = non_empty("SERVER_URL") {
            self.server.server_url = value;
        }
        if let Some(value) = non_empty("PORT") {
            match value.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => self.server.port = 0,
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let required = [
            ("messenger.app_secret", &self.messenger.app_secret),
            ("messenger.validation_token", &self.messenger.validation_token),
            ("messenger.page_access_token", &self.messenger.page_access_token),
            ("server.server_url", &self.server.server_url),
            ("dialog.url", &self.dialog.url),
            ("dialog.username", &self.dialog.username),
            ("dialog.password", &self.dialog.password),
            ("dialog.workspace_id", &self.dialog.workspace_id),
            ("offers.client_id", &self.offers.client_id),
            ("offers.client_secret", &self.offers.client_secret),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            anyhow::bail!("Missing config values: {}", missing.join(", "));
        }

        if self.server.port == 0 {
            anyhow::bail!("server.port must be in range 1..=65535");
        }

        let server_url = self.server.server_url.trim();
        if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
            anyhow::bail!("server.server_url must include the http(s) scheme");
        }

        if self.dialog.version.trim().is_empty() {
            anyhow::bail!("dialog.version cannot be empty");
        }
        if self.offers.base_url.trim().is_empty() {
            anyhow::bail!("offers.base_url cannot be empty");
        }

        for timeout in [
            self.messenger.request_timeout_secs,
            self.dialog.request_timeout_secs,
            self.offers.request_timeout_secs,
        ]
        .into_iter()
        .flatten()
        {
            if timeout == 0 {
                anyhow::bail!("request_timeout_secs must be > 0");
            }
        }

        let mut tags = HashSet::new();
        for action in &self.actions {
            let tag = action.tag.trim();
            if tag.is_empty() {
                anyhow::bail!("actions entry has an empty tag");
            }
            if RESERVED_ACTION_TAGS.contains(&tag) {
                anyhow::bail!("action tag '{}' is reserved", tag);
            }
            if !tags.insert(tag.to_string()) {
                anyhow::bail!("Duplicate action tag '{}'", tag);
            }
            if !action.query.starts_with('?') {
                anyhow::bail!("action '{}' query must start with '?'", tag);
            }
        }

        Ok(())
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::{Config, DEFAULT_GRAPH_API_URL, DEFAULT_PORT};
    use std::collections::HashMap;

    fn parse_config(input: &str) -> Config {
        let cfg: Config = toml::from_str(input).expect("valid TOML");
        cfg
    }

    const MINIMAL: &str = r#"
[server]
server_url = "https://bank.example.com"

[messenger]
app_secret = "secret"
validation_token = "token"
page_access_token = "page"

[offers]
client_id = "client-id"
client_secret = "client-secret"

[dialog]
url = "https://gateway.watsonplatform.net/conversation/api"
username = "user"
password = "pass"
workspace_id = "ws"
"#;

    #[test]
    fn validate_accepts_minimal_config_with_defaults() {
        let cfg = parse_config(MINIMAL);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.server.port, DEFAULT_PORT);
        assert_eq!(cfg.server.public_dir, "public");
        assert_eq!(cfg.messenger.graph_api_url, DEFAULT_GRAPH_API_URL);
        assert_eq!(cfg.dialog.version, "2016-07-11");
    }

    #[test]
    fn validate_reports_every_missing_value() {
        let cfg = parse_config("[core]\n");
        let err = cfg.validate().expect_err("empty config must fail");
        let message = err.to_string();
        assert!(message.contains("messenger.app_secret"));
        assert!(message.contains("dialog.workspace_id"));
        assert!(message.contains("server.server_url"));
        assert!(message.contains("offers.client_id"));
        assert!(message.contains("offers.client_secret"));
    }

    #[test]
    fn validate_requires_catalog_credentials() {
        let mut cfg = parse_config(MINIMAL);
        cfg.offers.client_secret = String::new();
        let message = cfg.validate().expect_err("secret required").to_string();
        assert!(message.contains("offers.client_secret"));
        assert!(!message.contains("offers.client_id"));
    }

    #[test]
    fn env_overrides_fill_platform_credentials() {
        let mut cfg = parse_config(
            r#"
[offers]
client_id = "client-id"
client_secret = "client-secret"

[dialog]
url = "https://gateway.watsonplatform.net/conversation/api"
username = "user"
password = "pass"
workspace_id = "ws"
"#,
        );
        let env: HashMap<&str, &str> = [
            ("MESSENGER_APP_SECRET", "s"),
            ("MESSENGER_VALIDATION_TOKEN", "v"),
            ("MESSENGER_PAGE_ACCESS_TOKEN", "p"),
            ("SERVER_URL", "https://tunnel.example.com"),
            ("PORT", "8080"),
        ]
        .into_iter()
        .collect();
        cfg.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(cfg.messenger.app_secret, "s");
        assert_eq!(cfg.server.server_url, "https://tunnel.example.com");
        assert_eq!(cfg.server.port, 8080);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn empty_env_values_do_not_clobber_file_values() {
        let mut cfg = parse_config(MINIMAL);
        cfg.apply_env_overrides(|key| (key == "MESSENGER_APP_SECRET").then(|| " ".to_string()));
        assert_eq!(cfg.messenger.app_secret, "secret");
    }

    #[test]
    fn validate_rejects_unparseable_port_override() {
        let mut cfg = parse_config(MINIMAL);
        cfg.apply_env_overrides(|key| (key == "PORT").then(|| "http".to_string()));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_server_url_without_scheme() {
        let mut cfg = parse_config(MINIMAL);
        cfg.server.server_url = "bank.example.com".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_extra_lookup_actions() {
        let cfg = parse_config(&format!(
            "{}\n[[actions]]\ntag = \"overdraft\"\nquery = \"?filter[where][overdraft]=true&filter[limit]=1\"\n",
            MINIMAL
        ));
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.actions.len(), 1);
    }

    #[test]
    fn validate_rejects_reserved_action_tag() {
        let cfg = parse_config(&format!(
            "{}\n[[actions]]\ntag = \"check_balance\"\nquery = \"?x=1\"\n",
            MINIMAL
        ));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_action_tags() {
        let cfg = parse_config(&format!(
            "{}\n[[actions]]\ntag = \"a\"\nquery = \"?x=1\"\n[[actions]]\ntag = \"a\"\nquery = \"?x=2\"\n",
            MINIMAL
        ));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_query_without_question_mark() {
        let cfg = parse_config(&format!(
            "{}\n[[actions]]\ntag = \"a\"\nquery = \"x=1\"\n",
            MINIMAL
        ));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut cfg = parse_config(MINIMAL);
        cfg.dialog.request_timeout_secs = Some(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_without_file_uses_defaults_then_validates() {
        let path = std::env::temp_dir().join("chattybank-config-does-not-exist.toml");
        // Process env may or may not carry the overrides; only the dialog
        // section is guaranteed to be missing.
        let err = Config::load(&path).expect_err("dialog settings are required");
        assert!(err.to_string().contains("dialog.url"));
    }
}
