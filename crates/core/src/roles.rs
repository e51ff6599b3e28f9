//! Application roles and the directory-group to role mapping.
//!
//! [`RoleMapper`] is the only place a [`Role`] is derived. It never fails:
//! unknown, empty or malformed group data falls through to
//! [`Role::Requester`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RoleConfig;

/// Closed set of application roles, highest privilege first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Approver,
    Requester,
}

impl Role {
    /// Whether this role may approve or reject change requests.
    pub fn can_decide(&self) -> bool {
        matches!(self, Self::Admin | Self::Approver)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Approver => write!(f, "approver"),
            Self::Requester => write!(f, "requester"),
        }
    }
}

/// Maps raw directory group identifiers to a single [`Role`].
///
/// Rules are evaluated in priority order and the first match wins:
/// admin patterns, then approver patterns, then requester patterns. A
/// pattern matches when it occurs as a substring of a group identifier.
#[derive(Debug, Clone)]
pub struct RoleMapper {
    admin: Vec<String>,
    approver: Vec<String>,
    requester: Vec<String>,
    case_sensitive: bool,
}

impl RoleMapper {
    pub fn new(config: &RoleConfig) -> Self {
        let prepare = |patterns: &[String]| -> Vec<String> {
            patterns
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .map(|p| normalize(p, config.case_sensitive))
                .collect()
        };

        Self {
            admin: prepare(&config.admin_patterns),
            approver: prepare(&config.approver_patterns),
            requester: prepare(&config.requester_patterns),
            case_sensitive: config.case_sensitive,
        }
    }

    /// Derive the role for a set of group identifiers.
    pub fn map<S: AsRef<str>>(&self, groups: &[S]) -> Role {
        let rule = self.matching_rule(groups);
        let role = rule.role();
        debug!(
            groups = groups.len(),
            %role,
            rule = rule.as_str(),
            "mapped directory groups to role"
        );
        role
    }

    /// The rule that decides the role for these groups.
    pub fn matching_rule<S: AsRef<str>>(&self, groups: &[S]) -> RuleMatch {
        let groups: Vec<String> = groups
            .iter()
            .map(|g| g.as_ref().trim())
            .filter(|g| !g.is_empty())
            .map(|g| normalize(g, self.case_sensitive))
            .collect();

        if matches_any(&groups, &self.admin) {
            RuleMatch::Admin
        } else if matches_any(&groups, &self.approver) {
            RuleMatch::Approver
        } else if matches_any(&groups, &self.requester) {
            RuleMatch::Requester
        } else {
            RuleMatch::Default
        }
    }
}

/// Which pattern list decided a mapping. `Default` means no pattern
/// matched and the least-privilege role was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleMatch {
    Admin,
    Approver,
    Requester,
    Default,
}

impl RuleMatch {
    pub fn role(&self) -> Role {
        match self {
            Self::Admin => Role::Admin,
            Self::Approver => Role::Approver,
            Self::Requester | Self::Default => Role::Requester,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin_patterns",
            Self::Approver => "approver_patterns",
            Self::Requester => "requester_patterns",
            Self::Default => "default",
        }
    }
}

impl Default for RoleMapper {
    fn default() -> Self {
        Self::new(&RoleConfig::default())
    }
}

fn normalize(value: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        value.to_string()
    } else {
        value.to_lowercase()
    }
}

fn matches_any(groups: &[String], patterns: &[String]) -> bool {
    groups
        .iter()
        .any(|group| patterns.iter().any(|pattern| group.contains(pattern.as_str())))
}
