//! Claude API integration.
//!
//! Both gateways talk to the Anthropic Messages API through [`ClaudeClient`]:
//! extraction sends a spreadsheet photo or CSV text and asks for customer
//! records, enrichment asks for map links. Requests are non-streaming and
//! run at temperature 0 so repeated imports of the same file agree.

mod client;
mod error;
mod types;

pub use client::ClaudeClient;
pub use error::{ApiError, ApiErrorResponse, ClaudeError};
pub use types::{ChatRequest, ChatResponse, ContentBlock, ImageSource, Message, StopReason, Usage};
