use crate::body::PartData;
use crate::error::MailError;
use crate::models::{Message, NO_SUBJECT, UNKNOWN_SENDER};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, error, warn};

pub const DEFAULT_QUERY: &str = "is:unread";
pub const UNREAD_LABEL: &str = "UNREAD";

/// A message as the provider returns it, before any field extraction.
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    pub id: String,
    pub headers: Vec<(String, String)>,
    /// Content of the top-level payload body, used when the message has no parts.
    pub payload_data: Option<PartData>,
    pub parts: Vec<RawPart>,
    pub label_ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RawPart {
    pub mime_type: Option<String>,
    pub data: Option<PartData>,
}

/// Provider operations the mail source needs.
#[async_trait]
pub trait MailApi: Send + Sync {
    async fn list_message_ids(&self, query: &str) -> Result<Vec<String>, MailError>;
    async fn get_message(&self, id: &str) -> Result<RawMessage, MailError>;
    async fn remove_label(&self, id: &str, label: &str) -> Result<(), MailError>;
}

pub struct MailSource<A> {
    api: A,
}

impl<A: MailApi> MailSource<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Lists the messages matching `query` with full detail.
    ///
    /// Any provider failure yields an empty list; the error is only logged,
    /// so an outage reads as "nothing new this round".
    pub async fn list_unread(&self, query: &str) -> Vec<RawMessage> {
        match self.fetch_all(query).await {
            Ok(messages) => messages,
            Err(e) => {
                error!(query, error = %e, "Listing unread messages failed");
                Vec::new()
            }
        }
    }

    async fn fetch_all(&self, query: &str) -> Result<Vec<RawMessage>, MailError> {
        let ids = self.api.list_message_ids(query).await?;
        debug!(count = ids.len(), query, "Listed messages");

        let mut detailed = Vec::with_capacity(ids.len());
        for id in &ids {
            detailed.push(self.api.get_message(id).await?);
        }
        Ok(detailed)
    }

    /// Clears the unread flag. Returns `false` on failure; the message then
    /// stays unread and is picked up again on the next run.
    pub async fn mark_read(&self, message_id: &str) -> bool {
        match self.api.remove_label(message_id, UNREAD_LABEL).await {
            Ok(()) => true,
            Err(e) => {
                warn!(id = %message_id, error = %e, "Failed to mark message as read");
                false
            }
        }
    }
}

/// Pulls sender, subject and body text out of a raw message.
///
/// Missing headers get placeholder values. The body comes from the first
/// part only, or from the payload body when there are no parts.
pub fn extract(raw: &RawMessage) -> Message {
    let headers: HashMap<&str, &str> = raw
        .headers
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();

    let sender = headers.get("From").copied().unwrap_or(UNKNOWN_SENDER);
    let subject = headers.get("Subject").copied().unwrap_or(NO_SUBJECT);

    let data = match raw.parts.first() {
        Some(part) => part.data.as_ref(),
        None => raw.payload_data.as_ref(),
    };
    let body = data.map(PartData::text).unwrap_or_default();

    Message {
        id: raw.id.clone(),
        sender: sender.to_string(),
        subject: subject.to_string(),
        body,
        is_read: !raw.label_ids.iter().any(|l| l == UNREAD_LABEL),
    }
}
