//! Domain model types used throughout crgate.
//!
//! These types bridge the credential verifier, the session store, the
//! change-request table and the web API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::roles::Role;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A verified user, produced only by
/// [`CredentialVerifier`](crate::verifier::CredentialVerifier).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Login handle as typed by the user.
    pub username: String,
    /// Human-readable name.
    pub display_name: String,
    /// Contact address (may be empty when the directory has none).
    pub email: String,
    /// Group identifiers returned by the credential source.
    #[serde(default)]
    pub raw_groups: Vec<String>,
    /// Application role derived from `raw_groups`.
    pub role: Role,
}

// ---------------------------------------------------------------------------
// Change requests
// ---------------------------------------------------------------------------

/// Identifier of a change request.
pub type ChangeRequestId = u64;

/// Lifecycle status of a change request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for ChangeRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A change request as returned by `GET /api/change-requests`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequest {
    pub id: ChangeRequestId,
    pub title: String,
    pub description: String,
    pub requester: String,
    pub created_at: DateTime<Utc>,
    pub status: ChangeRequestStatus,
}

// ---------------------------------------------------------------------------
// Batch decisions
// ---------------------------------------------------------------------------

/// The two batch operations exposed by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    Approve,
    Reject,
}

impl BatchAction {
    /// Past-tense verb used in acknowledgement messages.
    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::Approve => "approved",
            Self::Reject => "rejected",
        }
    }
}

/// The entries of a batch request.
///
/// Entries that do not name a change request (e.g. `"abc"` or `null`) are
/// not resolvable but still count towards the acknowledged total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSelection {
    pub ids: Vec<ChangeRequestId>,
    pub unrecognized: usize,
}

impl BatchSelection {
    /// Number of entries as sent.
    pub fn len(&self) -> usize {
        self.ids.len() + self.unrecognized
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<ChangeRequestId>> for BatchSelection {
    fn from(ids: Vec<ChangeRequestId>) -> Self {
        Self {
            ids,
            unrecognized: 0,
        }
    }
}

/// Acknowledgement of a batch decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReceipt {
    pub action: BatchAction,
    /// Number of ids named in the request.
    pub count: usize,
    /// Who made the decision.
    pub actor: String,
    pub decided_at: DateTime<Utc>,
}

impl BatchReceipt {
    /// Human-readable summary, e.g. `Successfully approved 2 change requests`.
    pub fn message(&self) -> String {
        format!(
            "Successfully {} {} change requests",
            self.action.past_tense(),
            self.count
        )
    }
}
