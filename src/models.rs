use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const UNKNOWN_SENDER: &str = "unknown";
pub const NO_SUBJECT: &str = "(no subject)";

pub const SUMMARY_LABEL: &str = "summary";
pub const CATEGORY_LABEL: &str = "category";
pub const SENTIMENT_LABEL: &str = "sentiment";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub is_read: bool,
}

/// Labels recovered from one language model response.
///
/// Keys are kept verbatim, so labels the archive does not consume survive
/// here as well. A label that never appeared is absent; the caller picks
/// the default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub fields: HashMap<String, String>,
}

impl Classification {
    /// The result used when classification is disabled: every consumed
    /// label present with an empty value.
    pub fn empty() -> Self {
        let fields = [SUMMARY_LABEL, CATEGORY_LABEL, SENTIMENT_LABEL]
            .into_iter()
            .map(|label| (label.to_string(), String::new()))
            .collect();
        Self { fields }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.fields.get(label).map(String::as_str)
    }

    pub fn summary(&self) -> &str {
        self.get(SUMMARY_LABEL).unwrap_or_default()
    }

    pub fn category(&self) -> Option<&str> {
        self.get(CATEGORY_LABEL)
    }

    pub fn sentiment(&self) -> &str {
        self.get(SENTIMENT_LABEL).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub title: String,
    pub sender: String,
    pub summary: String,
    pub category: String,
    pub sentiment: String,
}

impl ArchiveRecord {
    /// Builds the record for a message. A missing or blank category falls
    /// back to `fallback_category`.
    pub fn new(message: &Message, classification: &Classification, fallback_category: &str) -> Self {
        let category = classification
            .category()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(fallback_category);

        Self {
            title: message.subject.clone(),
            sender: message.sender.clone(),
            summary: classification.summary().to_string(),
            category: category.to_string(),
            sentiment: classification.sentiment().to_string(),
        }
    }
}
