//! Gmail API client
//!
//! [`MailboxClient`] is the only surface the rest of the crate talks to, so
//! the executor, pager and label directory can be driven by a mock in tests.
//! Every call made by [`ProductionGmailClient`] is a single attempt; retry
//! policy belongs to the caller.

use async_trait::async_trait;
use google_gmail1::{
    api::{BatchModifyMessagesRequest, Label as GmailLabel, Message},
    hyper_rustls, hyper_util, Gmail,
};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{GmailError, Result};
use crate::models::{Header, Label, MessageFilter, MessageMetadata, MessagePage};

/// Full mailbox scope; permanent deletion is not available under gmail.modify
pub const MAIL_SCOPE: &str = "https://mail.google.com/";

/// Trait defining the remote mailbox operations the cleaner needs
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// Fetch one page of message ids matching `filter`
    async fn list_messages(
        &self,
        filter: &MessageFilter,
        page_token: Option<String>,
    ) -> Result<MessagePage>;

    /// Fetch the `From` header of a single message
    async fn get_message_metadata(&self, id: &str) -> Result<MessageMetadata>;

    /// Add labels to every message in `ids` with one batchModify call
    async fn batch_modify(&self, ids: &[String], add_label_ids: &[String]) -> Result<()>;

    /// Permanently delete a message, bypassing trash
    async fn delete_message(&self, id: &str) -> Result<()>;

    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<Label>>;

    /// Create a new user label
    async fn create_label(&self, name: &str) -> Result<Label>;
}

pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Production client backed by the generated Gmail hub
pub struct ProductionGmailClient {
    hub: GmailHub,
    user_id: String,
    page_size: u32,
    request_timeout: Duration,
}

impl ProductionGmailClient {
    /// # Arguments
    /// * `hub` - Gmail API hub instance
    /// * `user_id` - mailbox owner, usually `me`
    /// * `page_size` - ids requested per `messages.list` call (max 500)
    /// * `request_timeout` - upper bound on a single API call
    pub fn new(hub: GmailHub, user_id: impl Into<String>, page_size: u32, request_timeout: Duration) -> Self {
        Self {
            hub,
            user_id: user_id.into(),
            page_size,
            request_timeout,
        }
    }
}

/// Bound a hub call by `timeout` and convert its error. A call that runs
/// out of time is reported as a (terminal) network error.
async fn with_timeout<T, F>(operation_name: &str, timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, google_gmail1::Error>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(GmailError::from),
        Err(_) => {
            warn!("Gmail API {} call timed out after {:?}", operation_name, timeout);
            Err(GmailError::NetworkError(format!(
                "{} timed out after {:?}",
                operation_name, timeout
            )))
        }
    }
}

/// Convert a `format=metadata` response into our header view
fn parse_message_metadata(msg: Message) -> Result<MessageMetadata> {
    let id = msg
        .id
        .ok_or_else(|| GmailError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let headers = msg.payload.and_then(|p| p.headers).map(|headers| {
        headers
            .into_iter()
            .filter_map(|h| match (h.name, h.value) {
                (Some(name), Some(value)) => Some(Header { name, value }),
                _ => None,
            })
            .collect()
    });

    Ok(MessageMetadata { id, headers })
}

#[async_trait]
impl MailboxClient for ProductionGmailClient {
    async fn list_messages(
        &self,
        filter: &MessageFilter,
        page_token: Option<String>,
    ) -> Result<MessagePage> {
        let mut call = self
            .hub
            .users()
            .messages_list(&self.user_id)
            .max_results(self.page_size);

        match filter {
            MessageFilter::All => {}
            MessageFilter::Query(q) => call = call.q(q),
            MessageFilter::Label(label_id) => call = call.add_label_ids(label_id),
        }

        if let Some(token) = page_token.as_deref() {
            call = call.page_token(token);
        }

        let call = call.add_scope(MAIL_SCOPE).doit();
        let (_, response) = with_timeout("messages.list", self.request_timeout, call).await?;

        let ids = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect::<Vec<_>>();

        debug!("Listed {} messages for {}", ids.len(), filter);

        Ok(MessagePage {
            ids,
            next_page_token: response.next_page_token,
        })
    }

    async fn get_message_metadata(&self, id: &str) -> Result<MessageMetadata> {
        let call = self
            .hub
            .users()
            .messages_get(&self.user_id, id)
            .format("metadata")
            .add_metadata_headers("From")
            .add_scope(MAIL_SCOPE)
            .doit();

        let (_, msg) = with_timeout("messages.get", self.request_timeout, call).await?;
        parse_message_metadata(msg)
    }

    async fn batch_modify(&self, ids: &[String], add_label_ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let request = BatchModifyMessagesRequest {
            ids: Some(ids.to_vec()),
            add_label_ids: Some(add_label_ids.to_vec()),
            remove_label_ids: None,
        };

        let call = self
            .hub
            .users()
            .messages_batch_modify(request, &self.user_id)
            .add_scope(MAIL_SCOPE)
            .doit();

        with_timeout("messages.batchModify", self.request_timeout, call).await?;
        debug!("Batch modified {} messages (+{:?})", ids.len(), add_label_ids);
        Ok(())
    }

    async fn delete_message(&self, id: &str) -> Result<()> {
        let call = self
            .hub
            .users()
            .messages_delete(&self.user_id, id)
            .add_scope(MAIL_SCOPE)
            .doit();

        with_timeout("messages.delete", self.request_timeout, call).await?;
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<Label>> {
        debug!("Calling Gmail API to list labels...");
        let call = self
            .hub
            .users()
            .labels_list(&self.user_id)
            .add_scope(MAIL_SCOPE)
            .doit();

        let (_, response) = with_timeout("labels.list", self.request_timeout, call).await?;

        let labels: Vec<Label> = response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| match (label.id, label.name) {
                (Some(id), Some(name)) => Some(Label { id, name }),
                _ => None,
            })
            .collect();

        debug!("Successfully parsed {} labels", labels.len());
        Ok(labels)
    }

    async fn create_label(&self, name: &str) -> Result<Label> {
        let label = GmailLabel {
            name: Some(name.to_string()),
            message_list_visibility: Some("show".to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            type_: Some("user".to_string()),
            ..Default::default()
        };

        let call = self
            .hub
            .users()
            .labels_create(label, &self.user_id)
            .add_scope(MAIL_SCOPE)
            .doit();

        let (_, created) = with_timeout("labels.create", self.request_timeout, call).await?;

        let id = created
            .id
            .ok_or_else(|| GmailError::LabelError("Created label has no ID".to_string()))?;

        Ok(Label {
            id,
            name: created.name.unwrap_or_else(|| name.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_gmail1::api::{MessagePart, MessagePartHeader};

    fn header(name: &str, value: &str) -> MessagePartHeader {
        MessagePartHeader {
            name: Some(name.to_string()),
            value: Some(value.to_string()),
        }
    }

    #[test]
    fn test_parse_message_metadata() {
        let msg = Message {
            id: Some("msg1".to_string()),
            payload: Some(MessagePart {
                headers: Some(vec![
                    header("From", "Alice <alice@example.com>"),
                    MessagePartHeader {
                        name: Some("X-Empty".to_string()),
                        value: None,
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let metadata = parse_message_metadata(msg).unwrap();
        assert_eq!(metadata.id, "msg1");
        assert_eq!(metadata.headers.as_ref().map(Vec::len), Some(1));
        assert_eq!(metadata.header("from"), Some("Alice <alice@example.com>"));
    }

    #[test]
    fn test_parse_message_without_headers() {
        let msg = Message {
            id: Some("msg2".to_string()),
            ..Default::default()
        };

        let metadata = parse_message_metadata(msg).unwrap();
        assert!(metadata.headers.is_none());
    }

    #[test]
    fn test_parse_message_without_id() {
        let result = parse_message_metadata(Message::default());
        assert!(matches!(result, Err(GmailError::InvalidMessageFormat(_))));
    }

    #[tokio::test]
    async fn test_slow_call_times_out_as_network_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<u32, google_gmail1::Error>(1)
        };

        let result = with_timeout("messages.get", Duration::from_millis(20), slow).await;
        match result {
            Err(GmailError::NetworkError(msg)) => assert!(msg.contains("messages.get timed out")),
            other => panic!("expected a network error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let fast = async { Ok::<u32, google_gmail1::Error>(7) };
        let result = with_timeout("labels.list", Duration::from_secs(5), fast).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_json_error_response_keeps_its_status() {
        let rate_limited = async {
            Err::<(), _>(google_gmail1::Error::BadRequest(serde_json::json!({
                "error": {"code": 429, "message": "Too many concurrent requests for user"}
            })))
        };

        let error = with_timeout("messages.batchModify", Duration::from_secs(5), rate_limited)
            .await
            .unwrap_err();
        assert!(matches!(error, GmailError::RateLimited(_)));
        assert!(error.is_retryable());
    }
}
