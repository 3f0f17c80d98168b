//! Derived quantity counters.
//!
//! Counters are never written directly: they are recomputed from the ledger
//! and the package's order claims after every change.

use serde::{Deserialize, Serialize};

use goodstock_core::{DomainError, DomainResult};

use crate::claim::OrdersPackage;
use crate::ledger::Ledger;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantities {
    pub on_hand: i64,
    pub available: i64,
    pub designated: i64,
    pub dispatched: i64,
}

impl Quantities {
    pub fn recompute(ledger: &Ledger, claims: &[OrdersPackage]) -> Self {
        let on_hand = ledger.on_hand();
        let designated: i64 = claims
            .iter()
            .filter(|c| c.is_active())
            .map(|c| c.remaining())
            .sum();
        let dispatched: i64 = claims.iter().map(|c| c.dispatched_quantity).sum();

        Self {
            on_hand,
            available: on_hand - designated,
            designated,
            dispatched,
        }
    }

    /// Reject counters that went negative or locations holding more than is on hand.
    pub fn validate(&self, allocated: i64) -> DomainResult<()> {
        for (field, value) in [
            ("on_hand_quantity", self.on_hand),
            ("available_quantity", self.available),
            ("designated_quantity", self.designated),
            ("dispatched_quantity", self.dispatched),
        ] {
            if value < 0 {
                return Err(DomainError::negative(field, value));
            }
        }
        if allocated > self.on_hand {
            return Err(DomainError::validation(
                "quantity",
                format!(
                    "locations hold {allocated} but only {} is on hand",
                    self.on_hand
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::ClaimState;
    use crate::ledger::{EntryDraft, LedgerAction};
    use goodstock_core::{OperationContext, OrderId, PackageId, UserId};

    fn received(quantity: i64) -> Ledger {
        let mut ledger = Ledger::new(PackageId::new());
        ledger
            .record(
                EntryDraft::new(LedgerAction::Receive, quantity),
                &OperationContext::stock_app(UserId::new()),
            )
            .unwrap();
        ledger
    }

    #[test]
    fn designated_and_dispatched_come_from_claims() {
        let ledger = received(5);
        let mut claim = OrdersPackage::new(ledger.package_id(), OrderId::new(), 3);
        claim.state = ClaimState::Designated;
        claim.dispatched_quantity = 1;

        let q = Quantities::recompute(&ledger, &[claim]);
        assert_eq!(q.on_hand, 5);
        assert_eq!(q.designated, 2);
        assert_eq!(q.dispatched, 1);
        assert_eq!(q.available, 3);
    }

    #[test]
    fn cancelled_claims_do_not_hold_stock() {
        let ledger = received(4);
        let mut claim = OrdersPackage::new(ledger.package_id(), OrderId::new(), 4);
        claim.state = ClaimState::Cancelled;

        let q = Quantities::recompute(&ledger, &[claim]);
        assert_eq!(q.available, 4);
        assert_eq!(q.designated, 0);
    }

    #[test]
    fn validate_reports_negative_counter() {
        let q = Quantities {
            on_hand: 2,
            available: -1,
            designated: 3,
            dispatched: 0,
        };
        match q.validate(0).unwrap_err() {
            DomainError::NegativeQuantity { field, value } => {
                assert_eq!(field, "available_quantity");
                assert_eq!(value, -1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_over_allocation() {
        let q = Quantities {
            on_hand: 2,
            available: 2,
            designated: 0,
            dispatched: 0,
        };
        assert_eq!(q.validate(3).unwrap_err().field(), "quantity");
        assert!(q.validate(2).is_ok());
    }
}
