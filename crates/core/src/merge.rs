//! De-duplicating merge of newly extracted records into a collection.
//!
//! Identity is the customer `id` and nothing else. Two records with
//! different ids but the same name and address are two customers.

use std::collections::HashSet;

use crate::types::{Customer, CustomerId};

/// Result of [`merge`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// New records first, then the existing collection in its original order.
    pub customers: Vec<Customer>,
    /// Number of incoming records that were actually added.
    pub added: usize,
    /// Number of incoming records dropped because their id was already known.
    pub duplicates: usize,
}

impl MergeOutcome {
    /// Whether the merge added nothing. Callers report "no new records"
    /// instead of re-saving an unchanged collection.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.added == 0
    }
}

/// Merge `incoming` into `existing`.
///
/// Records whose id already appears in `existing` are dropped; existing data
/// always wins. Repeated ids inside `incoming` keep their first occurrence.
/// Surviving incoming records are placed before the existing ones.
///
/// Runs in O(n + m).
///
/// # Example
///
/// ```rust
/// # use customer_atlas_core::{Customer, merge};
/// let existing = vec![Customer::new("1", "", "", "Taipei")];
/// let incoming = vec![
///     Customer::new("1", "", "", "Taipei"),
///     Customer::new("2", "", "", "Taichung"),
/// ];
/// let outcome = merge(&existing, incoming);
/// assert_eq!(outcome.added, 1);
/// assert_eq!(outcome.customers[0].id.as_str(), "2");
/// ```
#[must_use]
pub fn merge(existing: &[Customer], incoming: Vec<Customer>) -> MergeOutcome {
    let mut seen: HashSet<CustomerId> = existing.iter().map(|c| c.id.clone()).collect();
    let incoming_len = incoming.len();

    let mut customers: Vec<Customer> = incoming
        .into_iter()
        .filter(|c| seen.insert(c.id.clone()))
        .collect();
    let added = customers.len();

    customers.extend_from_slice(existing);

    MergeOutcome {
        customers,
        added,
        duplicates: incoming_len - added,
    }
}
