use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::quota::OperationKind;

/// Opaque Gmail message identifier
pub type MessageId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Headers-only view of a message. `headers` is `None` when the response
/// carried no payload header block at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub id: MessageId,
    pub headers: Option<Vec<Header>>,
}

impl MessageMetadata {
    /// First header value whose name matches case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .as_ref()?
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// One page of a `messages.list` response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub ids: Vec<MessageId>,
    pub next_page_token: Option<String>,
}

/// Which messages a listing call should return
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFilter {
    /// The whole mailbox
    All,
    /// A Gmail search expression, passed through untouched
    Query(String),
    /// Messages carrying the given label id
    Label(String),
}

impl MessageFilter {
    pub fn from_sender(sender: &str) -> Self {
        MessageFilter::Query(format!("from:{}", sender))
    }
}

impl fmt::Display for MessageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageFilter::All => write!(f, "all messages"),
            MessageFilter::Query(q) => write!(f, "query '{}'", q),
            MessageFilter::Label(id) => write!(f, "label '{}'", id),
        }
    }
}

/// Outcome of one user-invoked mailbox action
#[derive(Debug, Clone)]
pub struct ActionReport {
    pub kind: OperationKind,
    pub target: String,
    /// Messages the listing returned
    pub matched: usize,
    /// Messages the executor confirmed; a lower bound on applied changes
    pub processed: usize,
    pub abandoned_chunks: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ActionReport {
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.processed == self.matched
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}

/// Per-action running totals shown to the user.
///
/// An action zeroes its own counter with [`Counters::begin`] and credits
/// confirmed items afterwards, so repeating an action never accumulates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    pub moved_to_trash: usize,
    pub moved_to_spam: usize,
    pub labels_applied: usize,
    pub deleted: usize,
    pub total_messages: usize,
    pub total_from_users: usize,
}

impl Counters {
    fn slot(&mut self, kind: OperationKind) -> &mut usize {
        match kind {
            OperationKind::Trash => &mut self.moved_to_trash,
            OperationKind::Spam => &mut self.moved_to_spam,
            OperationKind::Label => &mut self.labels_applied,
            OperationKind::Delete => &mut self.deleted,
            OperationKind::FetchMetadata => &mut self.total_from_users,
        }
    }

    pub fn begin(&mut self, kind: OperationKind) {
        *self.slot(kind) = 0;
    }

    pub fn credit(&mut self, kind: OperationKind, items: usize) {
        *self.slot(kind) += items;
    }

    pub fn get(&self, kind: OperationKind) -> usize {
        match kind {
            OperationKind::Trash => self.moved_to_trash,
            OperationKind::Spam => self.moved_to_spam,
            OperationKind::Label => self.labels_applied,
            OperationKind::Delete => self.deleted,
            OperationKind::FetchMetadata => self.total_from_users,
        }
    }
}
