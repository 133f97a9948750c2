//! Customer extraction through Claude.

use async_trait::async_trait;
use customer_atlas_core::{Customer, CustomerId};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::claude::{ClaudeClient, ContentBlock, Message, StopReason};

use super::Extractor;
use super::error::ExtractionError;
use super::input::ExtractionInput;

const EXTRACTION_SYSTEM_PROMPT: &str = "You read customer lists from spreadsheets. \
Return every customer row as a JSON array of objects with exactly these string fields: \
\"id\", \"name\", \"address\", \"city\". Copy values as written, do not translate or \
normalize them. Skip header rows, totals and blank rows. If no customer rows are \
present return []. Answer with the JSON array only.";

const IMAGE_INSTRUCTION: &str =
    "Extract the customer records from this spreadsheet photo.";
const CSV_INSTRUCTION: &str = "Extract the customer records from this CSV file:";

/// Extraction gateway backed by the Claude Messages API.
#[derive(Debug, Clone)]
pub struct ClaudeExtractor {
    client: ClaudeClient,
}

impl ClaudeExtractor {
    #[must_use]
    pub const fn new(client: ClaudeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Extractor for ClaudeExtractor {
    #[instrument(skip(self, input), fields(kind = input.kind()))]
    async fn extract(&self, input: &ExtractionInput) -> Result<Vec<Customer>, ExtractionError> {
        let blocks = match input {
            ExtractionInput::Image { media_type, data } => vec![
                ContentBlock::image(media_type.clone(), data.clone()),
                ContentBlock::text(IMAGE_INSTRUCTION),
            ],
            ExtractionInput::Csv(text) => {
                vec![ContentBlock::text(format!("{CSV_INSTRUCTION}\n\n{text}"))]
            }
        };

        let response = self
            .client
            .chat(
                vec![Message::user(blocks)],
                Some(EXTRACTION_SYSTEM_PROMPT.to_string()),
            )
            .await?;

        if response.stop_reason == Some(StopReason::MaxTokens) {
            warn!("Extraction reply was truncated at the token limit");
        }

        let customers = parse_customer_reply(&response.text())?;
        debug!(count = customers.len(), "Extracted customer records");
        Ok(customers)
    }
}

#[derive(Debug, Deserialize)]
struct ExtractedRow {
    id: CustomerId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    city: String,
}

/// Parse the model's reply into customer records.
///
/// Tolerates a Markdown code fence or prose around the array. Rows with a
/// blank id are dropped because they cannot be de-duplicated.
///
/// # Errors
///
/// Returns `ExtractionError::InvalidReply` if no JSON array of records can be
/// found in the reply.
pub fn parse_customer_reply(reply: &str) -> Result<Vec<Customer>, ExtractionError> {
    let json = json_array_slice(reply)
        .ok_or_else(|| ExtractionError::InvalidReply(truncate(reply, 200)))?;

    let rows: Vec<ExtractedRow> = serde_json::from_str(json)
        .map_err(|e| ExtractionError::InvalidReply(e.to_string()))?;

    let total = rows.len();
    let customers: Vec<Customer> = rows
        .into_iter()
        .filter(|row| !row.id.is_blank())
        .map(|row| {
            Customer::new(
                CustomerId::new(row.id.as_str().trim()),
                row.name.trim(),
                row.address.trim(),
                row.city.trim(),
            )
        })
        .collect();

    if customers.len() < total {
        warn!(
            dropped = total - customers.len(),
            "Dropped extracted rows without an id"
        );
    }

    Ok(customers)
}

/// The outermost `[...]` in `text`, if any.
pub(crate) fn json_array_slice(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    text.get(start..=end).filter(|_| start < end)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_array() {
        let reply = r#"[{"id":"1","name":"Lin","address":"5 Zhongshan Rd","city":"Taipei"}]"#;
        let customers = parse_customer_reply(reply).expect("parse");
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].city, "Taipei");
        assert!(customers[0].created_at.is_none());
        assert!(customers[0].sync_status.is_none());
    }

    #[test]
    fn test_parse_fenced_reply_with_prose() {
        let reply = "Here are the customers:\n```json\n[\n  {\"id\": 17, \"name\": \"Wu\", \"address\": \"\", \"city\": \"Tainan\"}\n]\n```";
        let customers = parse_customer_reply(reply).expect("parse");
        assert_eq!(customers[0].id.as_str(), "17");
    }

    #[test]
    fn test_parse_empty_array_is_not_an_error() {
        let customers = parse_customer_reply("[]").expect("parse");
        assert!(customers.is_empty());
    }

    #[test]
    fn test_parse_trims_and_drops_blank_ids() {
        let reply = r#"[{"id":"  ","name":"Nobody"},{"id":" 8 ","name":" Ko ","city":"Keelung "}]"#;
        let customers = parse_customer_reply(reply).expect("parse");
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].id.as_str(), "8");
        assert_eq!(customers[0].name, "Ko");
        assert_eq!(customers[0].city, "Keelung");
    }

    #[test]
    fn test_parse_rejects_reply_without_array() {
        let result = parse_customer_reply("I could not read this image.");
        assert!(matches!(result, Err(ExtractionError::InvalidReply(_))));
    }

    #[test]
    fn test_parse_rejects_rows_without_id() {
        let result = parse_customer_reply(r#"[{"name":"Lin"}]"#);
        assert!(matches!(result, Err(ExtractionError::InvalidReply(_))));
    }

    #[test]
    fn test_truncate_long_reply() {
        let long = "x".repeat(300);
        assert_eq!(truncate(&long, 10), "xxxxxxxxxx...");
        assert_eq!(truncate("short", 10), "short");
    }
}
