//! Common test utilities and fixtures
#![allow(dead_code)]

use gmail_cleaner::client::MailboxClient;
use gmail_cleaner::error::{GmailError, Result};
use gmail_cleaner::models::{Header, Label, MessageFilter, MessageId, MessageMetadata, MessagePage};
use mockall::mock;

/// `n` distinct message ids
pub fn ids(n: usize) -> Vec<MessageId> {
    (0..n).map(|i| format!("msg{}", i)).collect()
}

/// A listing page
pub fn page(ids: &[&str], next_page_token: Option<&str>) -> MessagePage {
    MessagePage {
        ids: ids.iter().map(|s| s.to_string()).collect(),
        next_page_token: next_page_token.map(str::to_string),
    }
}

/// A single page holding `ids` with no continuation
pub fn last_page(ids: Vec<MessageId>) -> MessagePage {
    MessagePage {
        ids,
        next_page_token: None,
    }
}

/// Metadata response carrying a `From` header
pub fn metadata_from(id: &str, from: &str) -> MessageMetadata {
    MessageMetadata {
        id: id.to_string(),
        headers: Some(vec![Header {
            name: "From".to_string(),
            value: from.to_string(),
        }]),
    }
}

/// Metadata response with no header block at all
pub fn metadata_without_headers(id: &str) -> MessageMetadata {
    MessageMetadata {
        id: id.to_string(),
        headers: None,
    }
}

pub fn label(id: &str, name: &str) -> Label {
    Label {
        id: id.to_string(),
        name: name.to_string(),
    }
}

pub fn rate_limited() -> GmailError {
    GmailError::RateLimited("HTTP 429: Too Many Requests".to_string())
}

pub fn server_error() -> GmailError {
    GmailError::ServerError {
        status: 503,
        message: "HTTP 503: Service Unavailable".to_string(),
    }
}

pub fn bad_request() -> GmailError {
    GmailError::BadRequest("HTTP 400: Bad Request".to_string())
}

// Mock implementation of MailboxClient for testing
mock! {
    pub MailboxClient {}

    #[async_trait::async_trait]
    impl MailboxClient for MailboxClient {
        async fn list_messages(
            &self,
            filter: &MessageFilter,
            page_token: Option<String>,
        ) -> Result<MessagePage>;
        async fn get_message_metadata(&self, id: &str) -> Result<MessageMetadata>;
        async fn batch_modify(&self, ids: &[String], add_label_ids: &[String]) -> Result<()>;
        async fn delete_message(&self, id: &str) -> Result<()>;
        async fn list_labels(&self) -> Result<Vec<Label>>;
        async fn create_label(&self, name: &str) -> Result<Label>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_distinct() {
        let ids = ids(3);
        assert_eq!(ids, vec!["msg0", "msg1", "msg2"]);
    }

    #[test]
    fn test_metadata_from() {
        let metadata = metadata_from("m1", "Alice <alice@example.com>");
        assert_eq!(metadata.header("From"), Some("Alice <alice@example.com>"));
        assert_eq!(metadata_without_headers("m2").header("From"), None);
    }

    #[test]
    fn test_error_fixtures_classification() {
        assert!(rate_limited().is_retryable());
        assert!(server_error().is_retryable());
        assert!(!bad_request().is_retryable());
    }
}
