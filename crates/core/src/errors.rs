//! Error types for the crgate core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Auth(#[from] AuthFailure),

    #[error(transparent)]
    Session(#[from] SessionError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Directory errors
// ---------------------------------------------------------------------------

/// Errors from a credential source (static table or LDAP directory).
///
/// The `Display` text may contain directory detail and is meant for logs
/// only. Callers facing the network go through [`AuthFailure`].
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The directory could not be reached, timed out, or refused the
    /// service-account bind.
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    /// The search returned no entry for the username.
    #[error("no directory entry for user '{0}'")]
    UserNotFound(String),

    /// The entry exists but the password did not bind.
    #[error("invalid credentials for user '{0}'")]
    InvalidCredentials(String),

    /// The directory answered with something we did not expect.
    #[error("directory protocol error: {0}")]
    Protocol(String),
}

impl From<ldap3::LdapError> for DirectoryError {
    fn from(err: ldap3::LdapError) -> Self {
        use ldap3::LdapError;
        let detail = err.to_string();
        match err {
            LdapError::Io { .. }
            | LdapError::Timeout { .. }
            | LdapError::EndOfStream
            | LdapError::UrlParsing { .. }
            | LdapError::UnknownScheme(_) => DirectoryError::Unavailable(detail),
            _ => DirectoryError::Protocol(detail),
        }
    }
}

// ---------------------------------------------------------------------------
// Authentication failures
// ---------------------------------------------------------------------------

/// Externally visible grouping of [`AuthFailure`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// The request itself was unusable.
    BadRequest,
    /// The credentials were not accepted.
    Rejected,
    /// Something behind the verifier failed.
    Unavailable,
}

/// Outcome of a failed [`authenticate`](crate::verifier::CredentialVerifier::authenticate) call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// Missing, empty or unusable username / password.
    #[error("malformed authentication request")]
    MalformedRequest,

    /// The password did not match.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// No such user in the credential source.
    #[error("user not found")]
    UserNotFound,

    /// The directory could not be reached in time.
    #[error("directory unavailable")]
    DirectoryUnavailable,

    /// Any other fault below the verifier.
    #[error("internal authentication failure")]
    Internal,
}

impl AuthFailure {
    /// The category a client is allowed to observe. `UserNotFound` and
    /// `InvalidCredentials` are deliberately indistinguishable here.
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::MalformedRequest => FailureCategory::BadRequest,
            Self::InvalidCredentials | Self::UserNotFound => FailureCategory::Rejected,
            Self::DirectoryUnavailable | Self::Internal => FailureCategory::Unavailable,
        }
    }

    /// Message safe to send to the client.
    pub fn public_message(&self) -> &'static str {
        match self.category() {
            FailureCategory::BadRequest => "Username and password are required",
            FailureCategory::Rejected => "Invalid username or password",
            FailureCategory::Unavailable => "Internal server error",
        }
    }
}

impl From<DirectoryError> for AuthFailure {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Unavailable(_) => Self::DirectoryUnavailable,
            DirectoryError::UserNotFound(_) => Self::UserNotFound,
            DirectoryError::InvalidCredentials(_) => Self::InvalidCredentials,
            DirectoryError::Protocol(_) => Self::Internal,
        }
    }
}

// ---------------------------------------------------------------------------
// Session errors
// ---------------------------------------------------------------------------

/// Errors from resolving a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The token was never issued, or has been revoked.
    #[error("unknown session token")]
    Unauthenticated,

    /// The token was issued but its lifetime has passed.
    #[error("session expired")]
    Expired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = DirectoryError::UserNotFound("jdoe".into());
        assert_eq!(err.to_string(), "no directory entry for user 'jdoe'");

        let err = ConfigError::EnvVarMissing {
            var: "LDAP_BIND_PASSWORD".into(),
            field: "directory.ldap.bind_password_env".into(),
        };
        assert!(err.to_string().contains("LDAP_BIND_PASSWORD"));
    }

    #[test]
    fn test_not_found_and_wrong_password_look_identical() {
        let a = AuthFailure::from(DirectoryError::UserNotFound("ghost".into()));
        let b = AuthFailure::from(DirectoryError::InvalidCredentials("kevin".into()));
        assert_ne!(a, b);
        assert_eq!(a.category(), b.category());
        assert_eq!(a.public_message(), b.public_message());
    }

    #[test]
    fn test_public_message_hides_directory_detail() {
        let failure =
            AuthFailure::from(DirectoryError::Protocol("LDAP operations error rc=1".into()));
        assert_eq!(failure, AuthFailure::Internal);
        assert_eq!(failure.category(), FailureCategory::Unavailable);
        assert!(!failure.public_message().contains("LDAP"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let core_err: CoreError = SessionError::Expired.into();
        assert!(matches!(core_err, CoreError::Session(_)));

        let core_err: CoreError = AuthFailure::MalformedRequest.into();
        assert!(matches!(core_err, CoreError::Auth(_)));
    }
}
