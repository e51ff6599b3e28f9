//! TOML-based configuration system for crgate.
//!
//! Sensitive values (the LDAP bind password) are stored as `_env` fields that
//! reference environment variable names. The actual secrets are resolved at
//! runtime via [`AppConfig::resolve_env_vars`].

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
///
/// Every section has defaults, so an empty file (or no file at all) yields
/// a working demo setup backed by the static credential table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listener and logging settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// HTTP API behaviour.
    #[serde(default)]
    pub web: WebConfig,

    /// Credential source selection and settings.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Group-to-role mapping rules.
    #[serde(default)]
    pub roles: RoleConfig,

    /// Session token settings.
    #[serde(default)]
    pub session: SessionConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Listener / logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (default `0.0.0.0:8000`).
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_listen() -> String {
    "0.0.0.0:8000".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Web
// ---------------------------------------------------------------------------

/// HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Require a bearer session with the admin or approver role on the
    /// batch endpoints. Off by default.
    #[serde(default)]
    pub require_session: bool,

    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            require_session: false,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Which credential source backs authentication.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// In-memory user table (demo / test).
    #[default]
    Static,
    /// Live LDAP directory.
    Ldap,
}

/// A user in the static credential table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticUserConfig {
    pub username: String,

    /// Plaintext password (demo only). Ignored when `password_hash` is set.
    #[serde(default)]
    pub password: Option<String>,

    /// bcrypt hash of the password.
    #[serde(default)]
    pub password_hash: Option<String>,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    /// Group identifiers fed to the role mapper, e.g.
    /// `CN=CR_Approvers,OU=Groups,DC=company,DC=com`.
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Credential source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// `static` or `ldap`.
    #[serde(default)]
    pub source: SourceKind,

    /// Overall deadline for one verification, in seconds (default 10).
    #[serde(default = "default_verify_timeout")]
    pub timeout_secs: u64,

    /// Static users. When empty, the built-in demo users are used.
    #[serde(default)]
    pub users: Vec<StaticUserConfig>,

    /// LDAP settings (required when `source = "ldap"`).
    #[serde(default)]
    pub ldap: Option<LdapConfig>,
}

fn default_verify_timeout() -> u64 {
    10
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            timeout_secs: default_verify_timeout(),
            users: Vec::new(),
            ldap: None,
        }
    }
}

/// LDAP server connection and search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// Server URL, e.g. `ldaps://ldap.company.com`.
    pub url: String,

    /// Service account DN used for the search.
    pub bind_dn: String,

    /// Environment variable holding the service account password.
    pub bind_password_env: String,

    /// Subtree to search for users.
    pub search_base: String,

    /// Search filter; `{username}` is replaced by the escaped username.
    #[serde(default = "default_search_filter")]
    pub search_filter: String,

    #[serde(default = "default_display_name_attr")]
    pub display_name_attr: String,

    #[serde(default = "default_email_attr")]
    pub email_attr: String,

    #[serde(default = "default_group_attr")]
    pub group_attr: String,

    /// Domain used to build an email address when the entry has none.
    #[serde(default)]
    pub email_domain: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Upgrade plain `ldap://` connections with StartTLS.
    #[serde(default)]
    pub starttls: bool,

    /// Resolved bind password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub bind_password: Option<String>,
}

fn default_search_filter() -> String {
    "(uid={username})".into()
}
fn default_display_name_attr() -> String {
    "cn".into()
}
fn default_email_attr() -> String {
    "mail".into()
}
fn default_group_attr() -> String {
    "memberOf".into()
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_operation_timeout() -> u64 {
    5
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Substring patterns that promote a group membership to a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    #[serde(default = "default_admin_patterns")]
    pub admin_patterns: Vec<String>,

    #[serde(default = "default_approver_patterns")]
    pub approver_patterns: Vec<String>,

    #[serde(default = "default_requester_patterns")]
    pub requester_patterns: Vec<String>,

    /// Compare patterns case-sensitively (default: case-insensitive, as
    /// LDAP DNs are).
    #[serde(default)]
    pub case_sensitive: bool,
}

fn default_admin_patterns() -> Vec<String> {
    vec!["CN=CR_Admins".into(), "CN=Administrators".into()]
}
fn default_approver_patterns() -> Vec<String> {
    vec!["CN=CR_Approvers".into(), "CN=Approvers".into()]
}
fn default_requester_patterns() -> Vec<String> {
    vec!["CN=CR_Requesters".into(), "CN=Users".into()]
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            admin_patterns: default_admin_patterns(),
            approver_patterns: default_approver_patterns(),
            requester_patterns: default_requester_patterns(),
            case_sensitive: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Session token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Token lifetime in seconds (default 8 hours). `0` disables expiry.
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
}

fn default_session_ttl() -> u64 {
    8 * 60 * 60
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve all `*_env` fields from environment variables.
    ///
    /// The LDAP bind password is required when the LDAP source is selected;
    /// otherwise a missing variable only logs a warning.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        if let Some(ref mut ldap) = self.directory.ldap {
            let field = "directory.ldap.bind_password_env";
            ldap.bind_password = resolve_optional_env(&ldap.bind_password_env, field);
            if ldap.bind_password.is_none() && self.directory.source == SourceKind::Ldap {
                return Err(ConfigError::EnvVarMissing {
                    var: ldap.bind_password_env.clone(),
                    field: field.into(),
                });
            }
        }

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue {
                field: "server.listen".into(),
                detail: format!("'{}' is not a socket address", self.server.listen),
            });
        }
        if self.directory.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "directory.timeout_secs".into(),
                detail: "verification timeout must be > 0".into(),
            });
        }
        if self.web.max_body_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "web.max_body_bytes".into(),
                detail: "body limit must be > 0".into(),
            });
        }

        for (i, user) in self.directory.users.iter().enumerate() {
            if user.username.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("directory.users[{}].username", i),
                    detail: "username must not be empty".into(),
                });
            }
            if user.password.is_none() && user.password_hash.is_none() {
                return Err(ConfigError::InvalidValue {
                    field: format!("directory.users[{}]", i),
                    detail: format!("user '{}' needs a password or password_hash", user.username),
                });
            }
        }

        if self.directory.source == SourceKind::Ldap {
            let ldap = self.directory.ldap.as_ref().ok_or_else(|| ConfigError::InvalidValue {
                field: "directory.ldap".into(),
                detail: "source is 'ldap' but no [directory.ldap] section is present".into(),
            })?;
            if ldap.url.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "directory.ldap.url".into(),
                    detail: "LDAP URL must not be empty".into(),
                });
            }
            if ldap.search_base.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "directory.ldap.search_base".into(),
                    detail: "search base must not be empty".into(),
                });
            }
            if !ldap.search_filter.contains("{username}") {
                return Err(ConfigError::InvalidValue {
                    field: "directory.ldap.search_filter".into(),
                    detail: "filter must contain the {username} placeholder".into(),
                });
            }
            if ldap.connect_timeout_secs == 0 || ldap.operation_timeout_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "directory.ldap".into(),
                    detail: "LDAP timeouts must be > 0".into(),
                });
            }
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[server]
listen = "127.0.0.1:9000"
log_level = "debug"

[web]
require_session = true

[directory]
source = "ldap"
timeout_secs = 4

[directory.ldap]
url = "ldaps://ldap.company.com"
bind_dn = "cn=svc-crgate,ou=service,dc=company,dc=com"
bind_password_env = "CRGATE_TEST_BIND_PW"
search_base = "ou=users,dc=company,dc=com"
search_filter = "(sAMAccountName={username})"
email_domain = "company.com"

[roles]
admin_patterns = ["CN=Ops"]

[session]
ttl_secs = 600
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert!(config.web.require_session);
        assert_eq!(config.directory.source, SourceKind::Ldap);
        let ldap = config.directory.ldap.as_ref().unwrap();
        assert_eq!(ldap.search_filter, "(sAMAccountName={username})");
        assert_eq!(ldap.group_attr, "memberOf");
        assert_eq!(ldap.connect_timeout_secs, 5);
        assert_eq!(config.roles.admin_patterns, vec!["CN=Ops"]);
        assert_eq!(config.roles.approver_patterns, default_approver_patterns());
        assert_eq!(config.session.ttl_secs, 600);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crgate.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.server.log_level, "debug");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/crgate.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:8000");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.directory.source, SourceKind::Static);
        assert_eq!(config.directory.timeout_secs, 10);
        assert!(!config.web.require_session);
        assert_eq!(config.session.ttl_secs, 28800);
        assert!(!config.roles.case_sensitive);
        config.validate().unwrap();
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("CRGATE_TEST_BIND_PW", "s3cret");

        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.resolve_env_vars().unwrap();
        assert_eq!(
            config.directory.ldap.as_ref().unwrap().bind_password.as_deref(),
            Some("s3cret")
        );

        std::env::remove_var("CRGATE_TEST_BIND_PW");
    }

    #[test]
    fn test_resolve_env_vars_requires_ldap_password() {
        let toml_str = sample_toml().replace("CRGATE_TEST_BIND_PW", "CRGATE_TEST_UNSET_PW");
        let mut config: AppConfig = toml::from_str(&toml_str).unwrap();
        let result = config.resolve_env_vars();
        assert!(matches!(
            result,
            Err(ConfigError::EnvVarMissing { ref var, .. }) if var == "CRGATE_TEST_UNSET_PW"
        ));
    }

    #[test]
    fn test_validate_rejects_ldap_without_section() {
        let config: AppConfig = toml::from_str("[directory]\nsource = \"ldap\"\n").unwrap();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "directory.ldap"
        ));
    }

    #[test]
    fn test_validate_rejects_filter_without_placeholder() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.directory.ldap.as_mut().unwrap().search_filter = "(uid=*)".into();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "directory.ldap.search_filter"
        ));
    }

    #[test]
    fn test_validate_rejects_user_without_password() {
        let toml_str = r#"
[[directory.users]]
username = "nopass"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "directory.users[0]"
        ));
    }
}
