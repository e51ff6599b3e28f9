//! Credential sources that verify a username/password pair.
//!
//! Two implementations are provided:
//! 1. [`StaticDirectory`] -- an in-memory user table for demos and tests
//! 2. [`LdapDirectory`] -- a live directory (bind, search, re-bind as user)
//!
//! Which one backs the service is chosen by `directory.source` in the
//! configuration; the verifier only sees the [`CredentialSource`] trait.

pub mod ldap;
pub mod static_table;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{DirectoryConfig, SourceKind};
use crate::errors::{ConfigError, DirectoryError};

pub use ldap::LdapDirectory;
pub use static_table::StaticDirectory;

/// What a credential source knows about a user once the password checks out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Distinguished name (or a synthetic one for the static table).
    pub dn: String,
    pub display_name: String,
    pub email: String,
    /// Raw group identifiers, unmapped.
    #[serde(default)]
    pub groups: Vec<String>,
}

/// A backend able to prove that a password belongs to a user.
///
/// Implementations perform no retries: every error is final for the call.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Short label used in logs (`static`, `ldap`).
    fn kind(&self) -> &'static str;

    /// Check the credentials and return the user's entry.
    async fn verify(&self, username: &str, password: &str)
        -> Result<DirectoryEntry, DirectoryError>;
}

/// Build the credential source selected by the configuration.
pub fn from_config(config: &DirectoryConfig) -> Result<Arc<dyn CredentialSource>, ConfigError> {
    match config.source {
        SourceKind::Static => {
            let table = if config.users.is_empty() {
                info!("no static users configured, using built-in demo users");
                StaticDirectory::demo()
            } else {
                StaticDirectory::from_config(&config.users)
            };
            Ok(Arc::new(table))
        }
        SourceKind::Ldap => {
            let ldap = config.ldap.as_ref().ok_or_else(|| ConfigError::InvalidValue {
                field: "directory.ldap".into(),
                detail: "source is 'ldap' but no [directory.ldap] section is present".into(),
            })?;
            Ok(Arc::new(LdapDirectory::new(ldap.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds_static_source() {
        let source = from_config(&DirectoryConfig::default()).unwrap();
        assert_eq!(source.kind(), "static");
    }

    #[test]
    fn test_ldap_source_requires_section() {
        let config = DirectoryConfig {
            source: SourceKind::Ldap,
            ..Default::default()
        };
        assert!(matches!(
            from_config(&config),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
