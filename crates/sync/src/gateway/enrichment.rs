//! Map link enrichment.
//!
//! Enrichment is best-effort. Implementations may fail; the pipeline goes
//! through [`enrich_best_effort`](super::enrich_best_effort), which falls
//! back to the unenriched records.

use async_trait::async_trait;
use customer_atlas_core::{Customer, CustomerId};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::claude::{ClaudeClient, ContentBlock, Message};

use super::Enricher;
use super::error::EnrichmentError;
use super::extraction::json_array_slice;

const MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/?api=1&query=";

const ENRICHMENT_SYSTEM_PROMPT: &str = "You locate customer addresses on a map. For each \
input record you can place with confidence, return an object with \"id\" (copied from the \
input), \"mapUrl\" (a Google Maps link to the place) and, when known, numeric \"lat\" and \
\"lng\". Leave out records you cannot place. Answer with a JSON array only.";

/// Leaves every record untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnricher;

#[async_trait]
impl Enricher for NoopEnricher {
    async fn enrich(&self, customers: Vec<Customer>) -> Result<Vec<Customer>, EnrichmentError> {
        Ok(customers)
    }
}

/// Builds a map search link from each record's address without any network
/// call.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapSearchEnricher;

impl MapSearchEnricher {
    /// Search link for one record, or `None` if it has nothing to search for.
    #[must_use]
    pub fn search_url(customer: &Customer) -> Option<String> {
        let parts: Vec<&str> = [customer.address.trim(), customer.city.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect();

        let query = if parts.is_empty() {
            let name = customer.name.trim();
            if name.is_empty() {
                return None;
            }
            name.to_string()
        } else {
            parts.join(", ")
        };

        Some(format!("{MAPS_SEARCH_URL}{}", urlencoding::encode(&query)))
    }
}

#[async_trait]
impl Enricher for MapSearchEnricher {
    async fn enrich(
        &self,
        mut customers: Vec<Customer>,
    ) -> Result<Vec<Customer>, EnrichmentError> {
        for customer in customers.iter_mut().filter(|c| c.needs_map_url()) {
            if let Some(url) = Self::search_url(customer) {
                customer.map_url = Some(url);
            }
        }
        Ok(customers)
    }
}

/// Asks Claude for map links, one batched request per import.
#[derive(Debug, Clone)]
pub struct ClaudeEnricher {
    client: ClaudeClient,
}

impl ClaudeEnricher {
    #[must_use]
    pub const fn new(client: ClaudeClient) -> Self {
        Self { client }
    }
}

#[derive(Serialize)]
struct LookupRow<'a> {
    id: &'a CustomerId,
    name: &'a str,
    address: &'a str,
    city: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MapMatch {
    id: CustomerId,
    map_url: String,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lng: Option<f64>,
}

#[async_trait]
impl Enricher for ClaudeEnricher {
    #[instrument(skip(self, customers), fields(count = customers.len()))]
    async fn enrich(
        &self,
        mut customers: Vec<Customer>,
    ) -> Result<Vec<Customer>, EnrichmentError> {
        let lookups: Vec<LookupRow<'_>> = customers
            .iter()
            .filter(|c| c.needs_map_url())
            .map(|c| LookupRow {
                id: &c.id,
                name: &c.name,
                address: &c.address,
                city: &c.city,
            })
            .collect();

        if lookups.is_empty() {
            return Ok(customers);
        }

        let payload = serde_json::to_string(&lookups)
            .map_err(|e| EnrichmentError::InvalidReply(e.to_string()))?;

        let response = self
            .client
            .chat(
                vec![Message::user(vec![ContentBlock::text(payload)])],
                Some(ENRICHMENT_SYSTEM_PROMPT.to_string()),
            )
            .await?;

        let matches = parse_map_matches(&response.text())?;
        let applied = apply_matches(&mut customers, matches);
        debug!(applied, "Applied map links");

        Ok(customers)
    }
}

fn parse_map_matches(reply: &str) -> Result<Vec<MapMatch>, EnrichmentError> {
    let json = json_array_slice(reply)
        .ok_or_else(|| EnrichmentError::InvalidReply("no JSON array in reply".to_string()))?;
    serde_json::from_str(json).map_err(|e| EnrichmentError::InvalidReply(e.to_string()))
}

/// Apply matches by id to records still missing a link. Links that are not
/// absolute http(s) URLs are ignored. Returns how many records changed.
fn apply_matches(customers: &mut [Customer], matches: Vec<MapMatch>) -> usize {
    let mut applied = 0;
    for found in matches {
        if !is_web_url(&found.map_url) {
            continue;
        }
        if let Some(customer) = customers
            .iter_mut()
            .find(|c| c.id == found.id && c.needs_map_url())
        {
            customer.map_url = Some(found.map_url);
            customer.lat = customer.lat.or(found.lat);
            customer.lng = customer.lng.or(found.lng);
            applied += 1;
        }
    }
    applied
}

fn is_web_url(candidate: &str) -> bool {
    url::Url::parse(candidate).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url_uses_address_and_city() {
        let customer = Customer::new("1", "Lin", "5 Zhongshan Rd", "Taipei");
        assert_eq!(
            MapSearchEnricher::search_url(&customer).as_deref(),
            Some("https://www.google.com/maps/search/?api=1&query=5%20Zhongshan%20Rd%2C%20Taipei")
        );
    }

    #[test]
    fn test_search_url_falls_back_to_name() {
        let customer = Customer::new("1", "Din Tai Fung", "", "");
        let url = MapSearchEnricher::search_url(&customer).expect("url");
        assert!(url.ends_with("Din%20Tai%20Fung"));

        assert!(MapSearchEnricher::search_url(&Customer::new("2", "", " ", "")).is_none());
    }

    #[tokio::test]
    async fn test_map_search_keeps_existing_links() {
        let mut linked = Customer::new("1", "", "Somewhere", "Taipei");
        linked.map_url = Some("https://maps.example/original".to_string());
        let unlinked = Customer::new("2", "", "Elsewhere", "Tainan");

        let enriched = MapSearchEnricher
            .enrich(vec![linked, unlinked])
            .await
            .expect("enrich");

        assert_eq!(
            enriched[0].map_url.as_deref(),
            Some("https://maps.example/original")
        );
        assert!(enriched[1].map_url.is_some());
    }

    #[test]
    fn test_apply_matches_only_fills_missing_links() {
        let mut customers = vec![
            Customer::new("1", "", "", ""),
            Customer::new("2", "", "", ""),
        ];
        customers[1].map_url = Some("https://maps.example/keep".to_string());

        let matches = parse_map_matches(
            r#"```json
            [
              {"id": "1", "mapUrl": "https://maps.google.com/?q=1", "lat": 25.03, "lng": 121.56},
              {"id": "2", "mapUrl": "https://maps.google.com/?q=2"},
              {"id": "3", "mapUrl": "https://maps.google.com/?q=3"}
            ]
            ```"#,
        )
        .expect("parse");

        let applied = apply_matches(&mut customers, matches);

        assert_eq!(applied, 1);
        assert_eq!(
            customers[0].map_url.as_deref(),
            Some("https://maps.google.com/?q=1")
        );
        assert_eq!(customers[0].lat, Some(25.03));
        assert_eq!(
            customers[1].map_url.as_deref(),
            Some("https://maps.example/keep")
        );
    }

    #[test]
    fn test_apply_matches_rejects_non_web_links() {
        let mut customers = vec![Customer::new("1", "", "", "")];
        let matches = parse_map_matches(r#"[{"id":"1","mapUrl":"javascript:alert(1)"}]"#)
            .expect("parse");
        assert_eq!(apply_matches(&mut customers, matches), 0);
        assert!(customers[0].map_url.is_none());
    }
}
