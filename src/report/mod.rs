//! Report rendering.
//!
//! JSON documents for HTTP consumers and peers, plus the plain-text
//! summary printed by the one-shot CLI.

pub mod analytics;
pub mod generator;

pub use analytics::{AnalyticsResponse, ResultsResponse};
pub use generator::{generate_json_report, generate_text_report, write_report};
