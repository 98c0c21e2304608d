use crate::config::{ArchiveConfig, ArchiveTarget, PropertyNames};
use crate::error::ArchiveError;
use crate::models::ArchiveRecord;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;

/// Notion rejects text objects longer than this.
pub const MAX_TEXT_LEN: usize = 2000;

#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Durably creates one record. Once this returns `Ok`, the record exists.
    async fn create_record(&self, record: &ArchiveRecord) -> Result<(), ArchiveError>;
}

fn clamp(text: &str) -> String {
    text.chars().take(MAX_TEXT_LEN).collect()
}

fn rich_text(text: &str) -> Value {
    json!({ "rich_text": [{ "text": { "content": clamp(text) } }] })
}

/// Maps a record onto page properties. Column names are not checked against
/// the database schema; a mismatch comes back as a provider error.
pub fn page_properties(record: &ArchiveRecord, names: &PropertyNames) -> Value {
    let mut props = serde_json::Map::new();
    props.insert(
        names.title.clone(),
        json!({ "title": [{ "text": { "content": clamp(&record.title) } }] }),
    );
    props.insert(names.sender.clone(), rich_text(&record.sender));
    props.insert(names.summary.clone(), rich_text(&record.summary));
    props.insert(
        names.category.clone(),
        json!({ "select": { "name": record.category } }),
    );
    props.insert(names.sentiment.clone(), rich_text(&record.sentiment));
    Value::Object(props)
}

pub struct NotionSink {
    client: reqwest::Client,
    token: SecretString,
    database_id: String,
    endpoint: String,
    notion_version: String,
    properties: PropertyNames,
}

impl NotionSink {
    pub fn new(config: &ArchiveConfig, target: ArchiveTarget) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: target.token,
            database_id: target.database_id,
            endpoint: config.endpoint.clone(),
            notion_version: config.notion_version.clone(),
            properties: config.properties.clone(),
        }
    }

    fn page(&self, record: &ArchiveRecord) -> Value {
        json!({
            "parent": { "database_id": self.database_id },
            "properties": page_properties(record, &self.properties),
        })
    }
}

#[async_trait]
impl ArchiveSink for NotionSink {
    async fn create_record(&self, record: &ArchiveRecord) -> Result<(), ArchiveError> {
        debug!(title = %record.title, "Creating archive page");
        let res = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.token.expose_secret())
            .header("Notion-Version", &self.notion_version)
            .json(&self.page(record))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ArchiveError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
