use crate::body::PartData;
use crate::error::MailError;
use crate::mail::{MailApi, RawMessage, RawPart};
use anyhow::{Context, Result};
use async_trait::async_trait;
use google_gmail1::Gmail;
use google_gmail1::api::ModifyMessageRequest;
use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;
use tracing::debug;

pub type GmailHub = Gmail<HttpsConnector<HttpConnector>>;

const USER_ID: &str = "me";

#[derive(Clone)]
pub struct GmailClient {
    hub: GmailHub,
}

impl GmailClient {
    pub fn new(hub: GmailHub) -> Self {
        Self { hub }
    }

    /// Collects every message id matching `query`, following page tokens.
    pub async fn list_messages(&self, query: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self.hub.users().messages_list(USER_ID).q(query);
            if let Some(token) = &page_token {
                req = req.page_token(token);
            }

            let (_, message_list) = req.doit().await.context("Failed to list messages")?;

            ids.extend(
                message_list
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id),
            );

            match message_list.next_page_token {
                Some(token) if !token.is_empty() => {
                    debug!(fetched = ids.len(), "Following next page of message list");
                    page_token = Some(token);
                }
                _ => break,
            }
        }

        Ok(ids)
    }

    pub async fn get_message(&self, id: &str) -> Result<RawMessage> {
        let (_, msg) = self
            .hub
            .users()
            .messages_get(USER_ID, id)
            .format("full")
            .doit()
            .await
            .context(format!("Failed to get message {}", id))?;

        let mut headers = Vec::new();
        let mut payload_data = None;
        let mut parts = Vec::new();

        if let Some(payload) = msg.payload {
            for header in payload.headers.unwrap_or_default() {
                if let (Some(name), Some(value)) = (header.name, header.value) {
                    headers.push((name, value));
                }
            }
            payload_data = payload.body.and_then(|b| b.data).map(PartData::Decoded);
            parts = payload
                .parts
                .unwrap_or_default()
                .into_iter()
                .map(|p| RawPart {
                    mime_type: p.mime_type,
                    data: p.body.and_then(|b| b.data).map(PartData::Decoded),
                })
                .collect();
        }

        Ok(RawMessage {
            id: msg.id.unwrap_or_else(|| id.to_string()),
            headers,
            payload_data,
            parts,
            label_ids: msg.label_ids.unwrap_or_default(),
        })
    }

    pub async fn remove_label(&self, id: &str, label: &str) -> Result<()> {
        debug!(id, label, "Removing label");
        let req = ModifyMessageRequest {
            add_label_ids: None,
            remove_label_ids: Some(vec![label.to_string()]),
        };
        self.hub
            .users()
            .messages_modify(req, USER_ID, id)
            .doit()
            .await
            .context(format!("Failed to remove label {} from message {}", label, id))?;
        Ok(())
    }
}

#[async_trait]
impl MailApi for GmailClient {
    async fn list_message_ids(&self, query: &str) -> Result<Vec<String>, MailError> {
        self.list_messages(query)
            .await
            .map_err(|e| MailError::List(format!("{:#}", e)))
    }

    async fn get_message(&self, id: &str) -> Result<RawMessage, MailError> {
        GmailClient::get_message(self, id)
            .await
            .map_err(|e| MailError::Fetch {
                id: id.to_string(),
                reason: format!("{:#}", e),
            })
    }

    async fn remove_label(&self, id: &str, label: &str) -> Result<(), MailError> {
        GmailClient::remove_label(self, id, label)
            .await
            .map_err(|e| MailError::Modify {
                id: id.to_string(),
                reason: format!("{:#}", e),
            })
    }
}
