//! Label lookup and creation
use tracing::{debug, info};

use crate::client::MailboxClient;
use crate::error::{GmailError, Result};
use crate::interrupt::Interrupt;
use crate::models::Label;
use crate::retry::RetryPolicy;

/// A label ready to be applied, and whether it had to be created first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLabel {
    pub label: Label,
    pub created: bool,
}

/// Thin helper over the label endpoints.
///
/// Names are compared exactly. Uniqueness is only checked, never enforced:
/// if two labels share a name the first one listed wins.
pub struct LabelDirectory<'a> {
    client: &'a dyn MailboxClient,
    retry: &'a RetryPolicy,
    interrupt: &'a Interrupt,
}

impl<'a> LabelDirectory<'a> {
    pub fn new(client: &'a dyn MailboxClient, retry: &'a RetryPolicy, interrupt: &'a Interrupt) -> Self {
        Self {
            client,
            retry,
            interrupt,
        }
    }

    /// All labels in the account, system labels included
    pub async fn list(&self) -> Result<Vec<Label>> {
        let labels = self
            .retry
            .with_retry("labels.list", self.interrupt, || self.client.list_labels())
            .await?;
        debug!("Loaded {} existing labels", labels.len());
        Ok(labels)
    }

    pub fn exists(labels: &[Label], name: &str) -> bool {
        Self::find(labels, name).is_some()
    }

    pub fn find<'l>(labels: &'l [Label], name: &str) -> Option<&'l Label> {
        labels.iter().find(|label| label.name == name)
    }

    /// Create `name`. A failed creation is returned as-is; it is not retried.
    pub async fn create(&self, name: &str) -> Result<Label> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GmailError::LabelError("Label name cannot be empty".to_string()));
        }

        info!("Creating label: {}", name);
        self.client.create_label(name).await.map_err(|e| match e {
            GmailError::LabelError(_) => e,
            other => GmailError::LabelError(format!("Failed to create label '{}': {}", name, other)),
        })
    }

    /// Look `name` up, creating it when missing
    pub async fn resolve(&self, name: &str) -> Result<ResolvedLabel> {
        let labels = self.list().await?;

        if let Some(label) = Self::find(&labels, name) {
            debug!("Label '{}' already exists with id {}", name, label.id);
            return Ok(ResolvedLabel {
                label: label.clone(),
                created: false,
            });
        }

        let label = self.create(name).await?;
        info!("Created label '{}' with id {}", label.name, label.id);
        Ok(ResolvedLabel {
            label,
            created: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(id: &str, name: &str) -> Label {
        Label {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_exists_is_exact() {
        let labels = vec![label("INBOX", "INBOX"), label("Label_1", "Receipts")];

        assert!(LabelDirectory::exists(&labels, "Receipts"));
        assert!(!LabelDirectory::exists(&labels, "receipts"));
        assert!(!LabelDirectory::exists(&labels, "Receipts/2024"));
        assert!(!LabelDirectory::exists(&[], "INBOX"));
    }

    #[test]
    fn test_find_returns_first_match() {
        let labels = vec![label("Label_1", "Dup"), label("Label_2", "Dup")];
        assert_eq!(LabelDirectory::find(&labels, "Dup").map(|l| l.id.as_str()), Some("Label_1"));
    }
}
