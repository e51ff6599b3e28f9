//! crgate core library.
//!
//! This crate provides the authentication boundary of the change-request
//! gateway: configuration, credential sources (static table or LDAP), role
//! mapping, credential verification and bearer sessions, plus the read-only
//! change-request table.

pub mod config;
pub mod directory;
pub mod errors;
pub mod models;
pub mod records;
pub mod roles;
pub mod session;
pub mod verifier;

// Re-exports for convenience.
pub use config::AppConfig;
pub use directory::CredentialSource;
pub use records::ChangeRequestStore;
pub use roles::{Role, RoleMapper};
pub use session::SessionStore;
pub use verifier::CredentialVerifier;
