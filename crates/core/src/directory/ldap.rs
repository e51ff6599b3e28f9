//! LDAP credential source.
//!
//! Verification is the usual two-connection dance:
//! 1. bind as the service account and search for the user's entry
//! 2. bind as that entry's DN with the supplied password
//!
//! Display, mail and group attributes are read from the search result, so
//! the user connection is only used to prove the password.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{ldap_escape, Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use tracing::{debug, info, warn};

use super::{CredentialSource, DirectoryEntry};
use crate::config::LdapConfig;
use crate::errors::DirectoryError;

/// LDAP result code for `invalidCredentials`.
const RC_INVALID_CREDENTIALS: u32 = 49;

/// Credential source backed by an LDAP server.
pub struct LdapDirectory {
    config: LdapConfig,
    connect_timeout: Duration,
    op_timeout: Duration,
}

impl LdapDirectory {
    /// Create a new LDAP source.
    ///
    /// This does not connect -- every verification opens its own
    /// connections.
    pub fn new(config: LdapConfig) -> Self {
        info!(
            url = %config.url,
            search_base = %config.search_base,
            "created LDAP credential source"
        );
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            op_timeout: Duration::from_secs(config.operation_timeout_secs),
            config,
        }
    }

    /// Render the search filter for a username, escaping filter
    /// metacharacters.
    pub fn render_filter(&self, username: &str) -> String {
        self.config
            .search_filter
            .replace("{username}", &ldap_escape(username))
    }

    async fn connect(&self) -> Result<Ldap, DirectoryError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.connect_timeout)
            .set_starttls(self.config.starttls);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.config.url).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver stopped");
            }
        });
        Ok(ldap)
    }

    /// Bind as the service account and find the user's entry.
    async fn locate(&self, username: &str) -> Result<SearchEntry, DirectoryError> {
        let mut ldap = self.connect().await?;
        let result = self.search_as_service(&mut ldap, username).await;
        let _ = ldap.unbind().await;
        result
    }

    async fn search_as_service(
        &self,
        ldap: &mut Ldap,
        username: &str,
    ) -> Result<SearchEntry, DirectoryError> {
        let password = self.config.bind_password.as_deref().unwrap_or("");
        let bind = ldap
            .with_timeout(self.op_timeout)
            .simple_bind(&self.config.bind_dn, password)
            .await?;
        if bind.rc != 0 {
            // A broken service account is an outage, not a user error.
            return Err(DirectoryError::Unavailable(format!(
                "service bind as '{}' rejected (rc={})",
                self.config.bind_dn, bind.rc
            )));
        }

        let filter = self.render_filter(username);
        let attrs = vec![
            self.config.display_name_attr.as_str(),
            self.config.email_attr.as_str(),
            self.config.group_attr.as_str(),
        ];
        debug!(filter = %filter, base = %self.config.search_base, "LDAP search");

        let (entries, _) = ldap
            .with_timeout(self.op_timeout)
            .search(&self.config.search_base, Scope::Subtree, &filter, attrs)
            .await?
            .success()?;

        if entries.len() > 1 {
            warn!(username, matches = entries.len(), "search matched several entries, using the first");
        }
        entries
            .into_iter()
            .next()
            .map(SearchEntry::construct)
            .ok_or_else(|| DirectoryError::UserNotFound(username.to_string()))
    }

    /// Bind as the located DN to prove the password.
    async fn bind_as_user(&self, username: &str, dn: &str, password: &str) -> Result<(), DirectoryError> {
        let mut ldap = self.connect().await?;
        let bind = ldap
            .with_timeout(self.op_timeout)
            .simple_bind(dn, password)
            .await;
        let _ = ldap.unbind().await;

        let bind = bind?;
        match bind.rc {
            0 => Ok(()),
            RC_INVALID_CREDENTIALS => Err(DirectoryError::InvalidCredentials(username.to_string())),
            rc => Err(DirectoryError::Protocol(format!(
                "user bind returned rc={} ({})",
                rc, bind.text
            ))),
        }
    }

    /// Turn a search entry into a [`DirectoryEntry`], applying fallbacks for
    /// missing attributes.
    pub fn entry_from_search(&self, username: &str, search: SearchEntry) -> DirectoryEntry {
        let display_name = first_attr(&search.attrs, &self.config.display_name_attr)
            .unwrap_or_else(|| username.to_string());
        let email = first_attr(&search.attrs, &self.config.email_attr)
            .or_else(|| {
                self.config
                    .email_domain
                    .as_ref()
                    .map(|domain| format!("{}@{}", username, domain))
            })
            .unwrap_or_default();
        let groups = all_attr(&search.attrs, &self.config.group_attr);

        DirectoryEntry {
            dn: search.dn,
            display_name,
            email,
            groups,
        }
    }
}

#[async_trait]
impl CredentialSource for LdapDirectory {
    fn kind(&self) -> &'static str {
        "ldap"
    }

    async fn verify(
        &self,
        username: &str,
        password: &str,
    ) -> Result<DirectoryEntry, DirectoryError> {
        // An empty password would be an unauthenticated bind, which most
        // servers report as success.
        if password.is_empty() {
            return Err(DirectoryError::InvalidCredentials(username.to_string()));
        }

        let found = self.locate(username).await?;
        debug!(username, dn = %found.dn, "located directory entry");

        self.bind_as_user(username, &found.dn, password).await?;
        Ok(self.entry_from_search(username, found))
    }
}

/// Attribute names are case-insensitive in LDAP; servers may echo them in a
/// different case than requested.
fn attr_values<'a>(attrs: &'a HashMap<String, Vec<String>>, name: &str) -> Option<&'a Vec<String>> {
    attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, values)| values)
}

fn first_attr(attrs: &HashMap<String, Vec<String>>, name: &str) -> Option<String> {
    attr_values(attrs, name)
        .and_then(|values| values.iter().find(|v| !v.trim().is_empty()))
        .cloned()
}

fn all_attr(attrs: &HashMap<String, Vec<String>>, name: &str) -> Vec<String> {
    attr_values(attrs, name).cloned().unwrap_or_default()
}
