//! The customer record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::CustomerId;
use super::status::SyncStatus;

/// One customer extracted from a spreadsheet photo or CSV file.
///
/// Only `id` is mandatory on the wire; the descriptive fields default to the
/// empty string so older backups and sparse extractions still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// Natural key used for de-duplication.
    pub id: CustomerId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    /// Map link, filled in by enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_url: Option<String>,
    /// Set exactly once, at first persistence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Only present when a cloud store is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SyncStatus>,
}

impl Customer {
    /// Create a freshly extracted record with no enrichment or persistence
    /// metadata.
    #[must_use]
    pub fn new(
        id: impl Into<CustomerId>,
        name: impl Into<String>,
        address: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            city: city.into(),
            lat: None,
            lng: None,
            map_url: None,
            created_at: None,
            sync_status: None,
        }
    }

    /// Whether enrichment still has something to do for this record.
    #[must_use]
    pub fn needs_map_url(&self) -> bool {
        self.map_url.as_deref().is_none_or(|url| url.trim().is_empty())
    }

    /// Set `created_at` if it has never been set. Returns `true` if the
    /// record was stamped.
    pub fn stamp_created_at(&mut self, now: DateTime<Utc>) -> bool {
        if self.created_at.is_some() {
            return false;
        }
        self.created_at = Some(now);
        true
    }
}

/// Sort records newest first by `created_at`.
///
/// Records without a timestamp sort as if created at the epoch, so they end
/// up last. The sort is stable: records sharing a timestamp keep their
/// relative order.
pub fn sort_newest_first(customers: &mut [Customer]) {
    customers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    #[test]
    fn test_serialization_uses_camel_case_and_skips_absent_fields() {
        let mut customer = Customer::new("1", "Lin", "No. 5 Zhongshan Rd", "Taipei");
        customer.map_url = Some("https://maps.example/1".to_string());

        let json = serde_json::to_value(&customer).expect("serialize");
        assert_eq!(json["mapUrl"], "https://maps.example/1");
        assert!(json.get("createdAt").is_none());
        assert!(json.get("syncStatus").is_none());
        assert!(json.get("lat").is_none());
    }

    #[test]
    fn test_deserialize_sparse_record() {
        let customer: Customer =
            serde_json::from_str(r#"{"id":"2","city":"Taichung"}"#).expect("deserialize");
        assert_eq!(customer.id.as_str(), "2");
        assert_eq!(customer.city, "Taichung");
        assert!(customer.name.is_empty());
        assert!(customer.created_at.is_none());
    }

    #[test]
    fn test_deserialize_requires_id() {
        assert!(serde_json::from_str::<Customer>(r#"{"name":"No id"}"#).is_err());
    }

    #[test]
    fn test_stamp_created_at_only_once() {
        let mut customer = Customer::new("a", "", "", "");
        assert!(customer.stamp_created_at(at(100)));
        assert!(!customer.stamp_created_at(at(200)));
        assert_eq!(customer.created_at, Some(at(100)));
    }

    #[test]
    fn test_needs_map_url_treats_blank_as_missing() {
        let mut customer = Customer::new("a", "", "", "");
        assert!(customer.needs_map_url());
        customer.map_url = Some("  ".to_string());
        assert!(customer.needs_map_url());
        customer.map_url = Some("https://maps.example/a".to_string());
        assert!(!customer.needs_map_url());
    }

    #[test]
    fn test_sort_newest_first_puts_untimestamped_last() {
        let mut old = Customer::new("old", "", "", "");
        old.created_at = Some(at(10));
        let mut new = Customer::new("new", "", "", "");
        new.created_at = Some(at(20));
        let none = Customer::new("none", "", "", "");

        let mut customers = vec![none, old, new];
        sort_newest_first(&mut customers);

        let ids: Vec<&str> = customers.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["new", "old", "none"]);
    }

    #[test]
    fn test_sort_newest_first_is_stable_for_equal_timestamps() {
        let mut customers: Vec<Customer> = ["x", "y", "z"]
            .into_iter()
            .map(|id| {
                let mut c = Customer::new(id, "", "", "");
                c.created_at = Some(at(5));
                c
            })
            .collect();
        sort_newest_first(&mut customers);

        let ids: Vec<&str> = customers.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["x", "y", "z"]);
    }
}
