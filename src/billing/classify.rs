//! Vendor order-status classification.

/// What a purchase event should do to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseAction {
    Grant,
    Hold,
    Revoke,
}

/// Case-insensitive. Unknown statuses are held, never granted: a new status
/// the vendor starts sending must not silently add or remove credits.
pub fn classify_status(status: &str) -> PurchaseAction {
    match status.trim().to_ascii_lowercase().as_str() {
        "approved" | "paid" | "completed" | "captured" => PurchaseAction::Grant,
        "refunded" | "chargeback" | "canceled" | "cancelled" | "reversed" => PurchaseAction::Revoke,
        _ => PurchaseAction::Hold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_statuses() {
        for status in ["approved", "paid", "completed", "captured"] {
            assert_eq!(classify_status(status), PurchaseAction::Grant, "{status}");
        }
    }

    #[test]
    fn revoke_statuses() {
        for status in ["refunded", "chargeback", "canceled", "cancelled", "reversed"] {
            assert_eq!(classify_status(status), PurchaseAction::Revoke, "{status}");
        }
    }

    #[test]
    fn unknown_and_pending_are_held() {
        for status in ["pending", "waiting_payment", "in_review", "", "some_future_status"] {
            assert_eq!(classify_status(status), PurchaseAction::Hold, "{status:?}");
        }
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify_status("APPROVED"), PurchaseAction::Grant);
        assert_eq!(classify_status("Refunded"), PurchaseAction::Revoke);
        assert_eq!(classify_status("  paid  "), PurchaseAction::Grant);
    }
}
