//! Billing: offer resolution, webhook reconciliation, and the credit gate
//! that fronts every generation endpoint.

pub mod classify;
pub mod gate;
pub mod offers;
pub mod signature;
pub mod webhook;
