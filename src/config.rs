use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One year.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub session: SessionConfig,

    pub security: SecurityConfig,

    pub mail: MailConfig,

    pub oauth: OAuthConfig,

    pub observability: ObservabilityConfig,

    /// File the config was read from. Logged once tracing is up.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Emit logs as JSON lines instead of the human readable format.
    pub json_logs: bool,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,

    /// Public URL of the frontend, used to build links in outgoing mail.
    pub website_url: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/homebase.db".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
            website_url: "http://localhost:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionExpiry {
    /// Sessions end a fixed time after login.
    Absolute,
    /// Sessions end after a period without requests.
    Inactivity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,

    pub ttl_hours: i64,

    pub expiry: SessionExpiry,

    /// Whether to set the Secure flag on session cookies.
    /// Default: true for production safety. Set to false for local development without HTTPS.
    pub secure_cookies: bool,

    /// Explicit cookie domain, e.g. `.example.com` to share the session across subdomains.
    pub cookie_domain: Option<String>,

    /// Interval of the expired session sweeper.
    pub cleanup_interval_seconds: u64,
}

impl SessionConfig {
    /// Session lifetime, clamped to the range `validate` accepts.
    #[must_use]
    pub fn ttl(&self) -> time::Duration {
        time::Duration::hours(self.ttl_hours.clamp(1, MAX_SESSION_TTL_HOURS))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "homebase.sid".to_string(),
            ttl_hours: 24,
            expiry: SessionExpiry::Absolute,
            secure_cookies: true,
            cookie_domain: None,
            cleanup_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 19456, the OWASP minimum)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations) - higher = more CPU work
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    pub min_password_length: usize,

    /// Reject sessions of users deactivated after login.
    pub recheck_active_on_request: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 19456,
            argon2_time_cost: 2,
            argon2_parallelism: 1,
            min_password_length: 8,
            recheck_active_on_request: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MailTransportConfig {
    Smtp {
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        use_tls: bool,
    },
    /// Writes every message as an `.eml` file, for development.
    File { path: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub from_email: String,

    pub from_name: String,

    pub transport: MailTransportConfig,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from_email: "noreply@localhost".to_string(),
            from_name: "Homebase".to_string(),
            transport: MailTransportConfig::Smtp {
                host: "localhost".to_string(),
                port: 1025,
                username: None,
                password: None,
                use_tls: false,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub google: Option<GoogleOAuthConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleOAuthConfig {
    pub client_id: String,

    pub client_secret: String,

    pub callback_url: String,

    /// Where the browser lands after a successful login.
    pub success_redirect: String,

    /// Where the browser lands after a rejected login.
    pub failure_redirect: String,

    pub authorize_url: String,

    pub token_url: String,

    pub user_info_url: String,
}

impl Default for GoogleOAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            callback_url: "http://localhost:3001/api/auth/google/callback".to_string(),
            success_redirect: "http://localhost:3000".to_string(),
            failure_redirect: "http://localhost:3000/login".to_string(),
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            user_info_url: "https://www.googleapis.com/oauth2/v3/userinfo".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            security: SecurityConfig::default(),
            mail: MailConfig::default(),
            oauth: OAuthConfig::default(),
            observability: ObservabilityConfig::default(),
            source: None,
        }
    }
}

impl Config {
    /// Loads the first config file found (or defaults), then applies `.env`
    /// and environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = if let Some(path) = explicit {
            Self::load_from_path(path)?
        } else {
            Self::search_paths()?
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn search_paths() -> Result<Self> {
        for path in &Self::config_paths() {
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("homebase").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".homebase").join("config.toml"));
        }

        paths
    }

    /// Overlays values from the process environment. `lookup` is injected so
    /// tests do not have to mutate the real environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.general.database_path = url;
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(url) = lookup("WEBSITE_URL") {
            self.general.website_url = url;
        }
        if let Some(domain) = lookup("COOKIE_DOMAIN") {
            self.session.cookie_domain = Some(domain);
        }
        if let Some(secure) = lookup("SECURE_COOKIES").and_then(|v| v.parse().ok()) {
            self.session.secure_cookies = secure;
        }

        if let Some(client_id) = lookup("GOOGLE_CLIENT_ID").filter(|id| !id.is_empty()) {
            let google = self.oauth.google.get_or_insert_with(GoogleOAuthConfig::default);
            google.client_id = client_id;
            if let Some(secret) = lookup("GOOGLE_CLIENT_SECRET") {
                google.client_secret = secret;
            }
            if let Some(callback) = lookup("GOOGLE_CALLBACK_URL") {
                google.callback_url = callback;
            }
        }

        if let Some(from) = lookup("SMTP_FROM") {
            self.mail.from_email = from;
        }
        if let Some(host) = lookup("SMTP_HOST") {
            let port = lookup("SMTP_PORT").and_then(|p| p.parse().ok()).unwrap_or(1025);
            let username = lookup("SMTP_USER");
            let password = lookup("SMTP_PASS");
            self.mail.transport = MailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls: port == 587 || port == 465,
            };
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&self.session.ttl_hours) {
            anyhow::bail!("session.ttl_hours must be between 1 and {MAX_SESSION_TTL_HOURS}");
        }

        if self.security.min_password_length < 8 {
            anyhow::bail!("security.min_password_length must be at least 8");
        }

        if let Some(google) = &self.oauth.google
            && (google.client_id.is_empty() || google.client_secret.is_empty())
        {
            anyhow::bail!("oauth.google requires both client_id and client_secret");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.ttl_hours, 24);
        assert_eq!(config.session.expiry, SessionExpiry::Absolute);
        assert_eq!(config.security.min_password_length, 8);
        assert!(config.oauth.google.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [session]
            ttl_hours = 12
            expiry = "inactivity"
            cookie_domain = ".example.com"

            [mail.transport]
            type = "file"
            path = "/tmp/mail"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.session.ttl_hours, 12);
        assert_eq!(config.session.expiry, SessionExpiry::Inactivity);
        assert_eq!(config.session.cookie_domain.as_deref(), Some(".example.com"));
        assert!(matches!(
            config.mail.transport,
            MailTransportConfig::File { ref path } if path == "/tmp/mail"
        ));

        assert_eq!(config.server.port, 3001);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PORT", "8080"),
            ("GOOGLE_CLIENT_ID", "client"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_PORT", "587"),
            ("SECURE_COOKIES", "false"),
        ]);

        let mut config = Config::default();
        config.apply_env_overrides(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.server.port, 8080);
        assert!(!config.session.secure_cookies);
        let google = config.oauth.google.as_ref().unwrap();
        assert_eq!(google.client_id, "client");
        assert_eq!(google.client_secret, "secret");
        assert!(matches!(
            config.mail.transport,
            MailTransportConfig::Smtp { port: 587, use_tls: true, .. }
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_incomplete_google_section() {
        let mut config = Config::default();
        config.oauth.google = Some(GoogleOAuthConfig::default());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.ttl_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_caps_session_ttl() {
        let mut config = Config::default();
        config.session.ttl_hours = MAX_SESSION_TTL_HOURS;
        assert!(config.validate().is_ok());

        config.session.ttl_hours = i64::MAX;
        assert!(config.validate().is_err());
        assert_eq!(
            config.session.ttl(),
            time::Duration::hours(MAX_SESSION_TTL_HOURS)
        );
    }

    #[test]
    fn test_load_from_path_records_source() {
        let dir = std::env::temp_dir().join(format!("homebase-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[server]\nport = 4000\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
        assert!(Config::default().source.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
