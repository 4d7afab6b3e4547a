//! Credit gate for generation endpoints: the cost is debited atomically
//! BEFORE the upstream call, so two racing requests can never both spend the
//! last credits. A failed generation after a successful debit is not
//! refunded; the usage row in the audit trail records the operation for a
//! manual compensating grant.

use crate::{
    config::CreditCosts,
    errors::Result,
    storage::{CreditBalance, CreditLedger},
    types::{GenerationKind, UserId},
};
use tracing::debug;

pub async fn charge(
    ledger: &dyn CreditLedger,
    costs: &CreditCosts,
    user: UserId,
    kind: GenerationKind,
) -> Result<CreditBalance> {
    let cost = costs.cost(kind);
    let reason = format!("{kind} generation");
    let balance = ledger.debit(user, cost, Some(kind), Some(&reason)).await?;
    debug!(%user, %kind, cost, remaining = balance.balance, "charged generation");
    Ok(balance)
}
