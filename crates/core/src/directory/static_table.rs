//! In-memory credential table.
//!
//! Users come from `[[directory.users]]` in the configuration. Passwords are
//! either bcrypt hashes or plaintext compared in constant time.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::{CredentialSource, DirectoryEntry};
use crate::config::StaticUserConfig;
use crate::errors::DirectoryError;

#[derive(Clone)]
enum Secret {
    Plain(String),
    Bcrypt(String),
}

// Never print the secret itself, plaintext or hash.
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Secret::Plain(_) => f.write_str("Plain(<redacted>)"),
            Secret::Bcrypt(_) => f.write_str("Bcrypt(<redacted>)"),
        }
    }
}

impl Secret {
    fn matches(&self, candidate: &str) -> Result<bool, DirectoryError> {
        match self {
            Secret::Plain(expected) => {
                Ok(bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())))
            }
            Secret::Bcrypt(hash) => bcrypt::verify(candidate, hash)
                .map_err(|e| DirectoryError::Protocol(format!("bcrypt verify: {}", e))),
        }
    }
}

#[derive(Debug, Clone)]
struct StaticUser {
    secret: Secret,
    entry: DirectoryEntry,
}

/// Credential source backed by a fixed username table.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: HashMap<String, StaticUser>,
}

impl StaticDirectory {
    /// Build the table from configured users. Entries without any password
    /// are skipped (configuration validation rejects them earlier).
    pub fn from_config(users: &[StaticUserConfig]) -> Self {
        let mut table = HashMap::new();
        for user in users {
            let secret = match (&user.password_hash, &user.password) {
                (Some(hash), _) => Secret::Bcrypt(hash.clone()),
                (None, Some(plain)) => Secret::Plain(plain.clone()),
                (None, None) => {
                    warn!(username = %user.username, "static user has no password, skipping");
                    continue;
                }
            };
            let username = user.username.trim().to_string();
            let entry = DirectoryEntry {
                dn: format!("uid={},ou=static", username),
                display_name: user.display_name.clone().unwrap_or_else(|| username.clone()),
                email: user.email.clone().unwrap_or_default(),
                groups: user.groups.clone(),
            };
            table.insert(username, StaticUser { secret, entry });
        }
        debug!(count = table.len(), "loaded static credential table");
        Self { users: table }
    }

    /// The three demo accounts: `admin`, `boss` and `kevin`, all with the
    /// password `admin`, whose groups map to admin, approver and requester.
    pub fn demo() -> Self {
        let user = |username: &str, name: &str, group: &str| StaticUserConfig {
            username: username.into(),
            password: Some("admin".into()),
            password_hash: None,
            display_name: Some(name.into()),
            email: Some(format!("{}@company.com", username)),
            groups: vec![format!("CN={},OU=Groups,DC=company,DC=com", group)],
        };
        Self::from_config(&[
            user("admin", "System Administrator", "CR_Admins"),
            user("boss", "Boss", "CR_Approvers"),
            user("kevin", "Kevin", "CR_Requesters"),
        ])
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl CredentialSource for StaticDirectory {
    fn kind(&self) -> &'static str {
        "static"
    }

    async fn verify(
        &self,
        username: &str,
        password: &str,
    ) -> Result<DirectoryEntry, DirectoryError> {
        let user = self
            .users
            .get(username)
            .ok_or_else(|| DirectoryError::UserNotFound(username.to_string()))?;

        if user.secret.matches(password)? {
            Ok(user.entry.clone())
        } else {
            Err(DirectoryError::InvalidCredentials(username.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_output_redacts_passwords() {
        let users = vec![
            StaticUserConfig {
                username: "ops".into(),
                password: Some("s3cret-pw".into()),
                password_hash: None,
                display_name: None,
                email: None,
                groups: vec![],
            },
            StaticUserConfig {
                username: "audit".into(),
                password: None,
                password_hash: Some("$2b$04$abcdefghijklmnopqrstuv".into()),
                display_name: None,
                email: None,
                groups: vec![],
            },
        ];
        let rendered = format!("{:?}", StaticDirectory::from_config(&users));
        assert!(!rendered.contains("s3cret-pw"));
        assert!(!rendered.contains("$2b$04$"));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_demo_users_verify() {
        let table = StaticDirectory::demo();
        assert_eq!(table.len(), 3);

        let entry = table.verify("boss", "admin").await.unwrap();
        assert_eq!(entry.display_name, "Boss");
        assert_eq!(entry.email, "boss@company.com");
        assert_eq!(entry.groups, vec!["CN=CR_Approvers,OU=Groups,DC=company,DC=com"]);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user() {
        let table = StaticDirectory::demo();
        assert!(matches!(
            table.verify("kevin", "nope").await,
            Err(DirectoryError::InvalidCredentials(_))
        ));
        assert!(matches!(
            table.verify("ghost", "admin").await,
            Err(DirectoryError::UserNotFound(_))
        ));
        // Prefix of the real password must not pass.
        assert!(table.verify("kevin", "adm").await.is_err());
    }

    #[tokio::test]
    async fn test_bcrypt_hashed_user() {
        let hash = bcrypt::hash("hunter2", 4).unwrap();
        let table = StaticDirectory::from_config(&[StaticUserConfig {
            username: "alice".into(),
            password: Some("ignored-when-hash-present".into()),
            password_hash: Some(hash),
            display_name: None,
            email: None,
            groups: vec![],
        }]);

        let entry = table.verify("alice", "hunter2").await.unwrap();
        assert_eq!(entry.display_name, "alice");
        assert!(entry.email.is_empty());
        assert!(entry.groups.is_empty());

        assert!(matches!(
            table.verify("alice", "ignored-when-hash-present").await,
            Err(DirectoryError::InvalidCredentials(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_hash_is_protocol_error() {
        let table = StaticDirectory::from_config(&[StaticUserConfig {
            username: "bob".into(),
            password: None,
            password_hash: Some("not-a-bcrypt-hash".into()),
            display_name: None,
            email: None,
            groups: vec![],
        }]);
        assert!(matches!(
            table.verify("bob", "whatever").await,
            Err(DirectoryError::Protocol(_))
        ));
    }
}
