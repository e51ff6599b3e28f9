//! Credential verification: the single entry point that turns a
//! username/password pair into an [`Identity`].
//!
//! [`CredentialVerifier`] validates the input, asks the configured
//! [`CredentialSource`] under a deadline, and derives the role with the
//! [`RoleMapper`]. Nothing the caller sends can influence the role.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::directory::CredentialSource;
use crate::errors::{AuthFailure, DirectoryError};
use crate::models::Identity;
use crate::roles::RoleMapper;

/// Longest username accepted before contacting the source.
const MAX_USERNAME_LEN: usize = 256;

pub struct CredentialVerifier {
    source: Arc<dyn CredentialSource>,
    mapper: RoleMapper,
    deadline: Duration,
}

impl CredentialVerifier {
    pub fn new(source: Arc<dyn CredentialSource>, mapper: RoleMapper, deadline: Duration) -> Self {
        Self {
            source,
            mapper,
            deadline,
        }
    }

    /// Label of the backing credential source.
    pub fn source_kind(&self) -> &'static str {
        self.source.kind()
    }

    /// Verify credentials and build the caller's [`Identity`].
    ///
    /// Leading/trailing whitespace is stripped from the username. Empty
    /// input is rejected with [`AuthFailure::MalformedRequest`] before the
    /// source is contacted.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Identity, AuthFailure> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            debug!("rejecting authentication with empty username or password");
            return Err(AuthFailure::MalformedRequest);
        }
        if username.len() > MAX_USERNAME_LEN || username.chars().any(char::is_control) {
            debug!(len = username.len(), "rejecting unusable username");
            return Err(AuthFailure::MalformedRequest);
        }

        let source = self.source.kind();
        let outcome = tokio::time::timeout(self.deadline, self.source.verify(username, password))
            .await
            .unwrap_or_else(|_| {
                Err(DirectoryError::Unavailable(format!(
                    "no answer within {}s",
                    self.deadline.as_secs()
                )))
            });

        let entry = match outcome {
            Ok(entry) => entry,
            Err(err) => {
                match &err {
                    DirectoryError::UserNotFound(_) | DirectoryError::InvalidCredentials(_) => {
                        info!(username, source, reason = %err, "authentication rejected");
                    }
                    DirectoryError::Unavailable(_) | DirectoryError::Protocol(_) => {
                        warn!(username, source, error = %err, "authentication failed");
                    }
                }
                return Err(AuthFailure::from(err));
            }
        };

        let role = self.mapper.map(&entry.groups);
        info!(username, source, %role, "authentication succeeded");

        Ok(Identity {
            username: username.to_string(),
            display_name: entry.display_name,
            email: entry.email,
            raw_groups: entry.groups,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::directory::{DirectoryEntry, StaticDirectory};
    use crate::errors::FailureCategory;
    use crate::roles::Role;

    fn verifier_with(source: Arc<dyn CredentialSource>) -> CredentialVerifier {
        CredentialVerifier::new(source, RoleMapper::default(), Duration::from_secs(5))
    }

    /// Counts calls and answers with a fixed result.
    struct ScriptedSource {
        calls: AtomicUsize,
        groups: Vec<String>,
        fail_with: Option<fn() -> DirectoryError>,
        delay: Option<Duration>,
    }

    impl ScriptedSource {
        fn ok(groups: &[&str]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                groups: groups.iter().map(|g| g.to_string()).collect(),
                fail_with: None,
                delay: None,
            }
        }
    }

    #[async_trait]
    impl CredentialSource for ScriptedSource {
        fn kind(&self) -> &'static str {
            "scripted"
        }

        async fn verify(
            &self,
            username: &str,
            _password: &str,
        ) -> Result<DirectoryEntry, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            Ok(DirectoryEntry {
                dn: format!("uid={},ou=test", username),
                display_name: username.to_uppercase(),
                email: format!("{}@test", username),
                groups: self.groups.clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_demo_users_get_mapped_roles() {
        let verifier = verifier_with(Arc::new(StaticDirectory::demo()));

        let admin = verifier.authenticate("admin", "admin").await.unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.display_name, "System Administrator");

        let boss = verifier.authenticate("boss", "admin").await.unwrap();
        assert_eq!(boss.role, Role::Approver);

        let kevin = verifier.authenticate("  kevin ", "admin").await.unwrap();
        assert_eq!(kevin.role, Role::Requester);
        assert_eq!(kevin.username, "kevin");
    }

    #[tokio::test]
    async fn test_wrong_password_looks_like_unknown_user() {
        let verifier = verifier_with(Arc::new(StaticDirectory::demo()));

        let wrong_password = verifier.authenticate("boss", "letmein").await.unwrap_err();
        let unknown_user = verifier.authenticate("nobody", "letmein").await.unwrap_err();

        assert_eq!(wrong_password.category(), FailureCategory::Rejected);
        assert_eq!(wrong_password.category(), unknown_user.category());
        assert_eq!(wrong_password.public_message(), unknown_user.public_message());
    }

    #[tokio::test]
    async fn test_empty_input_never_reaches_source() {
        let source = Arc::new(ScriptedSource::ok(&[]));
        let verifier = verifier_with(source.clone());

        for (user, pass) in [("", "pw"), ("   ", "pw"), ("kevin", ""), ("", "")] {
            assert_eq!(
                verifier.authenticate(user, pass).await.unwrap_err(),
                AuthFailure::MalformedRequest
            );
        }
        let long = "x".repeat(MAX_USERNAME_LEN + 1);
        assert_eq!(
            verifier.authenticate(&long, "pw").await.unwrap_err(),
            AuthFailure::MalformedRequest
        );
        assert_eq!(
            verifier.authenticate("bad\nname", "pw").await.unwrap_err(),
            AuthFailure::MalformedRequest
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_role_comes_only_from_groups() {
        let verifier = verifier_with(Arc::new(ScriptedSource::ok(&[
            "CN=CR_Approvers,OU=Groups,DC=company,DC=com",
        ])));
        // A username that looks like a role name gets no special treatment.
        let identity = verifier.authenticate("admin", "whatever").await.unwrap();
        assert_eq!(identity.role, Role::Approver);
        assert_eq!(identity.raw_groups.len(), 1);

        let no_groups = verifier_with(Arc::new(ScriptedSource::ok(&[])));
        let identity = no_groups.authenticate("admin", "whatever").await.unwrap();
        assert_eq!(identity.role, Role::Requester);
    }

    #[tokio::test]
    async fn test_directory_errors_are_normalized() {
        let mut source = ScriptedSource::ok(&[]);
        source.fail_with = Some(|| DirectoryError::Unavailable("connection refused".into()));
        let verifier = verifier_with(Arc::new(source));
        assert_eq!(
            verifier.authenticate("jdoe", "pw").await.unwrap_err(),
            AuthFailure::DirectoryUnavailable
        );

        let mut source = ScriptedSource::ok(&[]);
        source.fail_with = Some(|| DirectoryError::Protocol("rc=80 other".into()));
        let verifier = verifier_with(Arc::new(source));
        let failure = verifier.authenticate("jdoe", "pw").await.unwrap_err();
        assert_eq!(failure, AuthFailure::Internal);
        assert_eq!(failure.public_message(), "Internal server error");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_hits_deadline() {
        let mut source = ScriptedSource::ok(&[]);
        source.delay = Some(Duration::from_secs(60));
        let verifier = CredentialVerifier::new(
            Arc::new(source),
            RoleMapper::default(),
            Duration::from_secs(2),
        );
        assert_eq!(
            verifier.authenticate("jdoe", "pw").await.unwrap_err(),
            AuthFailure::DirectoryUnavailable
        );
    }
}
