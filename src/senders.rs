//! Sender frequency aggregation over fetched message metadata

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::warn;

use crate::error::Result;
use crate::executor::ItemResponse;

static ANGLE_ADDRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(.*)>").unwrap());

/// Bare address of a `From` value: the text inside `<...>` when present,
/// otherwise the raw string
pub fn display_address(sender: &str) -> &str {
    ANGLE_ADDRESS
        .captures(sender)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(sender)
}

/// Collects `From` header values from FetchMetadata results.
///
/// Values are kept verbatim, display name included, in arrival order.
/// Duplicate message ids are not filtered.
#[derive(Debug, Default, Clone)]
pub struct SenderAggregator {
    senders: Vec<String>,
    skipped: usize,
}

impl SenderAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fan-out callback: returns whether a sender was recorded for `id`
    pub fn record(&mut self, id: &str, result: Result<ItemResponse>) -> bool {
        let metadata = match result {
            Ok(ItemResponse::Metadata(metadata)) => metadata,
            Ok(other) => {
                warn!("Unexpected response {:?} for message {}", other, id);
                self.skipped += 1;
                return false;
            }
            Err(e) => {
                warn!("An error occurred fetching message {}: {}", id, e);
                self.skipped += 1;
                return false;
            }
        };

        if metadata.headers.is_none() {
            warn!("Missing expected headers in response for message {}", id);
            self.skipped += 1;
            return false;
        }

        match metadata.header("From") {
            Some(from) => {
                self.senders.push(from.to_string());
                true
            }
            None => {
                warn!("Message {} has no From header", id);
                self.skipped += 1;
                false
            }
        }
    }

    pub fn senders(&self) -> &[String] {
        &self.senders
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn into_table(self) -> SenderFrequencyTable {
        SenderFrequencyTable::from_senders(self.senders)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderCount {
    pub sender: String,
    pub count: usize,
}

impl SenderCount {
    pub fn display(&self) -> &str {
        display_address(&self.sender)
    }
}

/// Identical sender strings grouped into counts
#[derive(Debug, Default, Clone)]
pub struct SenderFrequencyTable {
    // first-seen order, used to break ties
    order: Vec<String>,
    counts: HashMap<String, usize>,
}

impl SenderFrequencyTable {
    pub fn from_senders<I>(senders: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut table = Self::default();
        for sender in senders {
            match table.counts.get_mut(&sender) {
                Some(count) => *count += 1,
                None => {
                    table.counts.insert(sender.clone(), 1);
                    table.order.push(sender);
                }
            }
        }
        table
    }

    /// Distinct senders
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn count(&self, sender: &str) -> usize {
        self.counts.get(sender).copied().unwrap_or(0)
    }

    /// All senders, most frequent first; ties keep first-seen order
    pub fn most_common(&self) -> Vec<SenderCount> {
        let mut entries: Vec<SenderCount> = self
            .order
            .iter()
            .map(|sender| SenderCount {
                sender: sender.clone(),
                count: self.counts[sender],
            })
            .collect();
        // stable sort keeps insertion order among equal counts
        entries.sort_by(|a, b| b.count.cmp(&a.count));
        entries
    }

    pub fn top(&self, n: usize) -> Vec<SenderCount> {
        let mut entries = self.most_common();
        entries.truncate(n);
        entries
    }
}
