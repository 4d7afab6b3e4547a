//! Offer resolution: mapping a purchase event to a credit quantity.

use crate::billing::webhook::PurchaseEvent;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOffer {
    pub offer_id: String,
    pub credits: i64,
}

#[derive(Debug, Clone)]
pub struct OfferTable {
    offers: HashMap<String, i64>,
}

impl OfferTable {
    pub fn new(offers: HashMap<String, i64>) -> Self {
        Self { offers }
    }

    /// Pick the identifying field by priority (checkout link, then offer id,
    /// then product id) and look it up exactly once. If the first non-empty
    /// field doesn't resolve, the event is unresolved; we do not fall through
    /// to the next field, since a mismatched link and offer id means the
    /// payload is suspect.
    pub fn resolve(&self, event: &PurchaseEvent) -> Option<ResolvedOffer> {
        let candidate = event
            .checkout_link
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(code_from_checkout_link)
            .or_else(|| non_empty(event.offer_id.as_deref()))
            .or_else(|| non_empty(event.product_id.as_deref()))?;

        let credits = *self.offers.get(&candidate)?;
        Some(ResolvedOffer {
            offer_id: candidate,
            credits,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

/// The offer code is the last path segment of the vendor checkout link,
/// e.g. `https://pay.example.com/b25quAR?src=email` -> `b25quAR`.
fn code_from_checkout_link(link: &str) -> String {
    let trimmed = link.split(['?', '#']).next().unwrap_or(link);
    trimmed
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(trimmed)
        .to_string()
}
