//! Receipt reconciliation and divergence records.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktrace_core::{DivergenceId, Entity, ItemId, TransferId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DivergenceKind {
    /// Manifested but not received.
    Missing,
    /// Received but not manifested.
    Surplus,
}

impl DivergenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DivergenceKind::Missing => "MISSING",
            DivergenceKind::Surplus => "SURPLUS",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        [DivergenceKind::Missing, DivergenceKind::Surplus]
            .into_iter()
            .find(|k| k.as_str() == tag)
    }
}

/// A mismatch found at receipt. Resolved only by an explicit action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    pub id: DivergenceId,
    pub transfer_id: TransferId,
    pub item_id: ItemId,
    pub kind: DivergenceKind,
    pub resolved: bool,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Divergence {
    pub fn open(
        transfer_id: TransferId,
        item_id: ItemId,
        kind: DivergenceKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DivergenceId::new(),
            transfer_id,
            item_id,
            kind,
            resolved: false,
            resolved_by: None,
            resolved_at: None,
            created_at,
        }
    }
}

impl Entity for Divergence {
    type Id = DivergenceId;

    fn id(&self) -> &DivergenceId {
        &self.id
    }
}

/// Manifest vs. received, split three ways.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Manifested and received: these move to the destination.
    pub matched: Vec<ItemId>,
    pub missing: Vec<ItemId>,
    pub surplus: Vec<ItemId>,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.surplus.is_empty()
    }

    pub fn divergences(&self, transfer_id: TransferId, at: DateTime<Utc>) -> Vec<Divergence> {
        let missing = self
            .missing
            .iter()
            .map(|&item| Divergence::open(transfer_id, item, DivergenceKind::Missing, at));
        let surplus = self
            .surplus
            .iter()
            .map(|&item| Divergence::open(transfer_id, item, DivergenceKind::Surplus, at));
        missing.chain(surplus).collect()
    }
}

/// `missing = manifest \ received`, `surplus = received \ manifest`.
///
/// Duplicate scans count once. Output lists are sorted by id.
pub fn reconcile(manifest: &[ItemId], received: &[ItemId]) -> Reconciliation {
    let manifest: BTreeSet<ItemId> = manifest.iter().copied().collect();
    let received: BTreeSet<ItemId> = received.iter().copied().collect();

    Reconciliation {
        matched: manifest.intersection(&received).copied().collect(),
        missing: manifest.difference(&received).copied().collect(),
        surplus: received.difference(&manifest).copied().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(n: usize) -> Vec<ItemId> {
        (0..n).map(|_| ItemId::new()).collect()
    }

    #[test]
    fn full_receipt_is_clean() {
        let manifest = ids(3);
        let result = reconcile(&manifest, &manifest);
        assert!(result.is_clean());
        assert_eq!(result.matched.len(), 3);
    }

    #[test]
    fn partial_receipt_with_stranger() {
        let manifest = ids(3);
        let stranger = ItemId::new();
        let received = vec![manifest[0], manifest[1], stranger];

        let result = reconcile(&manifest, &received);
        assert_eq!(result.missing, vec![manifest[2]]);
        assert_eq!(result.surplus, vec![stranger]);
        assert_eq!(result.matched.len(), 2);

        let transfer_id = TransferId::new();
        let divergences = result.divergences(transfer_id, Utc::now());
        assert_eq!(divergences.len(), 2);
        assert!(divergences.iter().all(|d| !d.resolved && d.transfer_id == transfer_id));
        assert_eq!(divergences[0].kind, DivergenceKind::Missing);
        assert_eq!(divergences[1].kind, DivergenceKind::Surplus);
    }

    #[test]
    fn duplicate_scans_count_once() {
        let manifest = ids(1);
        let result = reconcile(&manifest, &[manifest[0], manifest[0]]);
        assert!(result.is_clean());
        assert_eq!(result.matched, manifest);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        #[test]
        fn set_algebra_holds(
            pool_size in 0usize..24,
            manifest_mask in prop::collection::vec(any::<bool>(), 24),
            received_mask in prop::collection::vec(any::<bool>(), 24),
        ) {
            let pool = ids(pool_size);
            let pick = |mask: &[bool]| -> Vec<ItemId> {
                pool.iter().zip(mask).filter(|(_, keep)| **keep).map(|(i, _)| *i).collect()
            };
            let manifest = pick(&manifest_mask);
            let received = pick(&received_mask);

            let result = reconcile(&manifest, &received);

            for id in &result.missing {
                prop_assert!(manifest.contains(id) && !received.contains(id));
            }
            for id in &result.surplus {
                prop_assert!(received.contains(id) && !manifest.contains(id));
            }
            for id in &result.matched {
                prop_assert!(manifest.contains(id) && received.contains(id));
            }
            prop_assert_eq!(result.matched.len() + result.missing.len(), manifest.len());
            prop_assert_eq!(result.matched.len() + result.surplus.len(), received.len());
            let same_sets = manifest.iter().all(|i| received.contains(i))
                && received.iter().all(|i| manifest.contains(i));
            prop_assert_eq!(result.is_clean(), same_sets);
        }
    }
}
