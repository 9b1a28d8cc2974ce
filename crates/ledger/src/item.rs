use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktrace_core::{
    DomainError, DomainResult, Entity, ItemId, LocationId, ProductId, ProductionRunId,
    PurchaseBatchId,
};

use crate::token::Token;

/// Lifecycle state of one physical unit.
///
/// Legal edges: `IN_STOCK -> IN_TRANSFER -> IN_STOCK`, and
/// `IN_STOCK -> CONSUMED | DISPOSED` (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemState {
    InStock,
    InTransfer,
    Consumed,
    Disposed,
}

impl ItemState {
    pub const ALL: [ItemState; 4] = [
        ItemState::InStock,
        ItemState::InTransfer,
        ItemState::Consumed,
        ItemState::Disposed,
    ];

    pub fn can_transition_to(self, next: ItemState) -> bool {
        use ItemState::*;
        matches!(
            (self, next),
            (InStock, InTransfer)
                | (InTransfer, InStock)
                | (InStock, Consumed)
                | (InStock, Disposed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ItemState::Consumed | ItemState::Disposed)
    }

    /// Stable storage tag.
    pub fn as_str(self) -> &'static str {
        match self {
            ItemState::InStock => "IN_STOCK",
            ItemState::InTransfer => "IN_TRANSFER",
            ItemState::Consumed => "CONSUMED",
            ItemState::Disposed => "DISPOSED",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == tag)
    }
}

impl core::fmt::Display for ItemState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physically tagged unit.
///
/// Never deleted: consumption and disposal are state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub scan_token: Token,
    pub short_token: Option<Token>,
    pub product_id: ProductId,
    pub purchase_batch_id: Option<PurchaseBatchId>,
    pub production_run_id: Option<ProductionRunId>,
    /// Last known location; kept while the item is in transfer.
    pub location_id: Option<LocationId>,
    pub state: ItemState,
    pub expires_at: Option<DateTime<Utc>>,
    pub produced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &ItemId {
        &self.id
    }
}

impl Item {
    pub fn is_at(&self, location_id: LocationId) -> bool {
        self.location_id == Some(location_id)
    }

    /// Apply a guarded transition to this record.
    ///
    /// Fails with `InvalidStateTransition` if the stored state is not
    /// `expected` or the edge `expected -> next` is not legal.
    pub fn apply_transition(
        &mut self,
        expected: ItemState,
        next: ItemState,
        location_id: Option<LocationId>,
    ) -> DomainResult<()> {
        check_transition(self, expected, next)?;
        self.state = next;
        if let Some(location_id) = location_id {
            self.location_id = Some(location_id);
        }
        Ok(())
    }
}

pub fn check_transition(item: &Item, expected: ItemState, next: ItemState) -> DomainResult<()> {
    if !expected.can_transition_to(next) {
        return Err(DomainError::invalid_transition(format!(
            "{expected} -> {next} is not a legal item transition"
        )));
    }
    if item.state != expected {
        return Err(DomainError::invalid_transition(format!(
            "item {} is {}, expected {expected}",
            item.id, item.state
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_item(state: ItemState) -> Item {
        let now = Utc::now();
        Item {
            id: ItemId::new(),
            scan_token: Token::from_raw("QR-TEST-ABCDEF"),
            short_token: None,
            product_id: ProductId::new(),
            purchase_batch_id: None,
            production_run_id: None,
            location_id: Some(LocationId::new()),
            state,
            expires_at: None,
            produced_at: now,
            created_at: now,
        }
    }

    #[test]
    fn consumed_and_disposed_are_terminal() {
        for next in ItemState::ALL {
            assert!(!ItemState::Consumed.can_transition_to(next));
            assert!(!ItemState::Disposed.can_transition_to(next));
        }
        assert!(ItemState::Consumed.is_terminal());
        assert!(!ItemState::InTransfer.is_terminal());
    }

    #[test]
    fn transition_keeps_location_when_none_given() {
        let mut item = test_item(ItemState::InStock);
        let before = item.location_id;
        item.apply_transition(ItemState::InStock, ItemState::InTransfer, None)
            .unwrap();
        assert_eq!(item.state, ItemState::InTransfer);
        assert_eq!(item.location_id, before);

        let dest = LocationId::new();
        item.apply_transition(ItemState::InTransfer, ItemState::InStock, Some(dest))
            .unwrap();
        assert!(item.is_at(dest));
    }

    #[test]
    fn stale_expected_state_is_rejected() {
        let mut item = test_item(ItemState::Disposed);
        let err = item
            .apply_transition(ItemState::InStock, ItemState::InTransfer, None)
            .unwrap_err();
        match err {
            DomainError::InvalidStateTransition(msg) => assert!(msg.contains("DISPOSED")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(item.state, ItemState::Disposed);
    }

    #[test]
    fn state_tags_round_trip() {
        for state in ItemState::ALL {
            assert_eq!(ItemState::from_tag(state.as_str()), Some(state));
        }
        assert_eq!(ItemState::from_tag("in_stock"), None);
    }

    fn any_state() -> impl Strategy<Value = ItemState> {
        prop::sample::select(ItemState::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn only_legal_edges_succeed(
            from in any_state(),
            expected in any_state(),
            next in any_state(),
        ) {
            let mut item = test_item(from);
            let result = item.apply_transition(expected, next, None);
            let legal = from == expected && expected.can_transition_to(next);
            prop_assert_eq!(result.is_ok(), legal);
            if legal {
                prop_assert_eq!(item.state, next);
            } else {
                prop_assert!(result.unwrap_err().is_lost_race());
                prop_assert_eq!(item.state, from);
            }
        }
    }
}
