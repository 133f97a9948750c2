//! Per-city aggregation for the dashboard chart.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::Customer;

/// Number of customers in one city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityCount {
    pub city: String,
    pub count: usize,
}

/// Count customers per city, most populous first.
///
/// Cities are compared by exact string equality with no case folding or
/// trimming. Records with an empty city are left out. Ties keep the order in
/// which each city was first encountered.
#[must_use]
pub fn aggregate(customers: &[Customer]) -> Vec<CityCount> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<CityCount> = Vec::new();

    for customer in customers.iter().filter(|c| !c.city.is_empty()) {
        if let Some(&slot) = index.get(customer.city.as_str()) {
            if let Some(entry) = counts.get_mut(slot) {
                entry.count += 1;
            }
        } else {
            index.insert(&customer.city, counts.len());
            counts.push(CityCount {
                city: customer.city.clone(),
                count: 1,
            });
        }
    }

    // Stable sort keeps first-seen order among equal counts.
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}
