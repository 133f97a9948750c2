//! Extraction and enrichment gateways.
//!
//! The pipeline only sees the two narrow capabilities below, so it can be
//! tested with in-process fakes:
//!
//! - [`Extractor`]: spreadsheet photo or CSV text in, candidate records out
//! - [`Enricher`]: records in, the same records with map links where found

mod enrichment;
mod error;
mod extraction;
mod input;

use std::collections::HashMap;

use async_trait::async_trait;
use customer_atlas_core::{Customer, CustomerId};
use tracing::warn;

pub use enrichment::{ClaudeEnricher, MapSearchEnricher, NoopEnricher};
pub use error::{EnrichmentError, ExtractionError, InputError};
pub use extraction::{ClaudeExtractor, parse_customer_reply};
pub use input::{ExtractionInput, InputFile};

/// Turns one input into candidate customer records.
///
/// An empty `Ok` means nothing was recognized; a failed call must be an
/// `Err`, never a silently empty list.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, input: &ExtractionInput) -> Result<Vec<Customer>, ExtractionError>;
}

/// Adds map links to records that lack one.
///
/// Implementations should only look up records where
/// [`Customer::needs_map_url`] is true and return every input record.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, customers: Vec<Customer>) -> Result<Vec<Customer>, EnrichmentError>;
}

/// Run `enricher` without ever failing.
///
/// Only map fields of records that were missing a link are taken from the
/// enricher's answer, matched by id, so a misbehaving enricher can neither
/// drop nor rewrite records. On error the input comes back unchanged.
pub async fn enrich_best_effort(enricher: &dyn Enricher, customers: Vec<Customer>) -> Vec<Customer> {
    if !customers.iter().any(Customer::needs_map_url) {
        return customers;
    }

    let mut original = customers.clone();
    let enriched = match enricher.enrich(customers).await {
        Ok(enriched) => enriched,
        Err(e) => {
            warn!(error = %e, "Enrichment failed, keeping records without map links");
            return original;
        }
    };

    let found: HashMap<CustomerId, Customer> = enriched
        .into_iter()
        .filter(|c| !c.needs_map_url())
        .map(|c| (c.id.clone(), c))
        .collect();

    for customer in original.iter_mut().filter(|c| c.needs_map_url()) {
        if let Some(match_) = found.get(&customer.id) {
            customer.map_url.clone_from(&match_.map_url);
            customer.lat = customer.lat.or(match_.lat);
            customer.lng = customer.lng.or(match_.lng);
        }
    }

    original
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingEnricher;

    #[async_trait]
    impl Enricher for FailingEnricher {
        async fn enrich(&self, _: Vec<Customer>) -> Result<Vec<Customer>, EnrichmentError> {
            Err(EnrichmentError::InvalidReply("boom".to_string()))
        }
    }

    /// Links everything, drops the last record and renames the rest.
    struct SloppyEnricher;

    #[async_trait]
    impl Enricher for SloppyEnricher {
        async fn enrich(
            &self,
            mut customers: Vec<Customer>,
        ) -> Result<Vec<Customer>, EnrichmentError> {
            customers.pop();
            for c in &mut customers {
                c.name = "rewritten".to_string();
                c.map_url = Some(format!("https://maps.example/{}", c.id));
            }
            Ok(customers)
        }
    }

    #[tokio::test]
    async fn test_failure_returns_input_unchanged() {
        let input = vec![Customer::new("1", "Lin", "", "Taipei")];
        let output = enrich_best_effort(&FailingEnricher, input.clone()).await;
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn test_misbehaving_enricher_cannot_drop_or_rewrite() {
        let input = vec![
            Customer::new("1", "Lin", "", "Taipei"),
            Customer::new("2", "Wu", "", "Tainan"),
        ];

        let output = enrich_best_effort(&SloppyEnricher, input).await;

        assert_eq!(output.len(), 2);
        assert_eq!(output[0].name, "Lin");
        assert_eq!(
            output[0].map_url.as_deref(),
            Some("https://maps.example/1")
        );
        assert!(output[1].map_url.is_none());
    }

    #[tokio::test]
    async fn test_skips_call_when_nothing_needs_links() {
        let mut linked = Customer::new("1", "", "", "");
        linked.map_url = Some("https://maps.example/1".to_string());
        let output = enrich_best_effort(&FailingEnricher, vec![linked.clone()]).await;
        assert_eq!(output, vec![linked]);
    }
}
