//! Read-only change-request table.
//!
//! The table is seeded once at startup and never mutated. Batch decisions
//! are acknowledged and logged but do not change any status.

use chrono::{DateTime, TimeZone, Utc};
use tracing::{info, warn};

use crate::models::{
    BatchAction, BatchReceipt, BatchSelection, ChangeRequest, ChangeRequestId, ChangeRequestStatus,
};

/// Actor recorded when a batch request does not name one.
pub const UNKNOWN_ACTOR: &str = "Unknown";

pub struct ChangeRequestStore {
    records: Vec<ChangeRequest>,
}

impl ChangeRequestStore {
    /// Build a store from records, kept in ascending id order.
    pub fn new(mut records: Vec<ChangeRequest>) -> Self {
        records.sort_by_key(|cr| cr.id);
        Self { records }
    }

    /// The five demo records the service ships with.
    pub fn seeded() -> Self {
        let cr = |id, title: &str, description: &str, day, status| ChangeRequest {
            id,
            title: title.into(),
            description: description.into(),
            requester: "Kevin".into(),
            created_at: june_2023(day),
            status,
        };
        Self::new(vec![
            cr(
                1001,
                "User Login Function Optimization",
                "Improve user login process to enhance user experience",
                15,
                ChangeRequestStatus::Pending,
            ),
            cr(
                1002,
                "Database Index Optimization",
                "Optimize database indexes related to user queries",
                18,
                ChangeRequestStatus::Approved,
            ),
            cr(
                1003,
                "Payment Interface Upgrade",
                "Upgrade payment interface from V1 to V2 version",
                20,
                ChangeRequestStatus::Pending,
            ),
            cr(
                1004,
                "Frontend Framework Migration",
                "Migrate frontend framework from Vue2 to Vue3",
                22,
                ChangeRequestStatus::Rejected,
            ),
            cr(
                1005,
                "Add Data Export Function",
                "Add Excel data export function for users",
                25,
                ChangeRequestStatus::Pending,
            ),
        ])
    }

    /// All records, in id order.
    pub fn list(&self) -> &[ChangeRequest] {
        &self.records
    }

    pub fn get(&self, id: ChangeRequestId) -> Option<&ChangeRequest> {
        self.records
            .binary_search_by_key(&id, |cr| cr.id)
            .ok()
            .map(|idx| &self.records[idx])
    }

    /// Acknowledge a batch decision without changing any record.
    ///
    /// `count` reflects the entries as sent, including unknown ids and
    /// entries that are not ids at all.
    pub fn acknowledge(
        &self,
        action: BatchAction,
        selection: &BatchSelection,
        actor: Option<&str>,
    ) -> BatchReceipt {
        let actor = actor
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(UNKNOWN_ACTOR)
            .to_string();

        let unknown: Vec<ChangeRequestId> = selection
            .ids
            .iter()
            .copied()
            .filter(|id| self.get(*id).is_none())
            .collect();
        if !unknown.is_empty() {
            warn!(?unknown, "batch names change requests that do not exist");
        }
        if selection.unrecognized > 0 {
            warn!(
                unrecognized = selection.unrecognized,
                "batch contains entries that are not change-request ids"
            );
        }

        info!(
            action = action.past_tense(),
            ids = ?selection.ids,
            actor = %actor,
            "batch decision acknowledged"
        );

        BatchReceipt {
            action,
            count: selection.len(),
            actor,
            decided_at: Utc::now(),
        }
    }
}

impl Default for ChangeRequestStore {
    fn default() -> Self {
        Self::seeded()
    }
}

fn june_2023(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 6, day, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_records_in_order() {
        let store = ChangeRequestStore::seeded();
        let ids: Vec<_> = store.list().iter().map(|cr| cr.id).collect();
        assert_eq!(ids, vec![1001, 1002, 1003, 1004, 1005]);

        let statuses: Vec<_> = store.list().iter().map(|cr| cr.status).collect();
        assert_eq!(
            statuses,
            vec![
                ChangeRequestStatus::Pending,
                ChangeRequestStatus::Approved,
                ChangeRequestStatus::Pending,
                ChangeRequestStatus::Rejected,
                ChangeRequestStatus::Pending,
            ]
        );
        assert_eq!(
            store.get(1003).unwrap().created_at.to_rfc3339(),
            "2023-06-20T00:00:00+00:00"
        );
    }

    #[test]
    fn test_acknowledge_is_a_no_op() {
        let store = ChangeRequestStore::seeded();
        let before = store.list().to_vec();

        let selection = BatchSelection::from(vec![1001, 1003]);
        let receipt = store.acknowledge(BatchAction::Approve, &selection, Some("Boss"));
        assert_eq!(receipt.count, 2);
        assert_eq!(receipt.actor, "Boss");
        assert_eq!(receipt.message(), "Successfully approved 2 change requests");

        assert_eq!(store.list(), before.as_slice());
    }

    #[test]
    fn test_acknowledge_defaults_actor_and_counts_unknown_ids() {
        let store = ChangeRequestStore::seeded();
        let selection = BatchSelection::from(vec![42, 1002]);
        let receipt = store.acknowledge(BatchAction::Reject, &selection, Some("  "));
        assert_eq!(receipt.actor, UNKNOWN_ACTOR);
        assert_eq!(receipt.count, 2);

        let receipt = store.acknowledge(BatchAction::Reject, &BatchSelection::default(), None);
        assert_eq!(receipt.count, 0);
        assert_eq!(receipt.message(), "Successfully rejected 0 change requests");
    }

    #[test]
    fn test_acknowledge_counts_unrecognized_entries() {
        let store = ChangeRequestStore::seeded();
        let selection = BatchSelection {
            ids: vec![1001],
            unrecognized: 2,
        };
        let receipt = store.acknowledge(BatchAction::Approve, &selection, None);
        assert_eq!(receipt.count, 3);
        assert_eq!(receipt.message(), "Successfully approved 3 change requests");
    }

    #[test]
    fn test_new_sorts_by_id() {
        let mut records = ChangeRequestStore::seeded().list().to_vec();
        records.reverse();
        let store = ChangeRequestStore::new(records);
        assert_eq!(store.list()[0].id, 1001);
        assert!(store.get(9999).is_none());
    }
}
