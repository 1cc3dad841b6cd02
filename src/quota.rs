//! Gmail API quota table
//!
//! Every Gmail method is charged a fixed number of quota units per call
//! (https://developers.google.com/gmail/api/reference/quota). The executor
//! sizes each chunk so that one chunk never spends more than
//! [`CHUNK_QUOTA_BUDGET`] units:
//! - messages.batchModify: 5 units per message id
//! - messages.get: 5 units
//! - messages.list: 5 units
//! - messages.delete: 10 units
//!
//! These sizes are correctness bounds. Larger chunks risk provider-side
//! rejection, so they are constants rather than configuration.

use std::fmt;

/// Units one chunk may consume
pub const CHUNK_QUOTA_BUDGET: u32 = 100;

/// Quota cost of a single remote call, per message it touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCost {
    /// messages.get, messages.list, messages.batchModify (per id)
    Read,
    /// messages.delete
    Delete,
}

impl QuotaCost {
    pub const fn units(&self) -> u32 {
        match self {
            QuotaCost::Read => 5,
            QuotaCost::Delete => 10,
        }
    }

    /// Largest chunk whose total cost fits the per-chunk budget
    pub const fn batch_size(&self) -> usize {
        let units = self.units();
        if units >= CHUNK_QUOTA_BUDGET {
            return 1;
        }
        (CHUNK_QUOTA_BUDGET / units) as usize
    }
}

/// How the executor issues the calls for one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One batchModify call carrying every id in the chunk
    BulkModify,
    /// One call per id, all in flight together, each resolved on its own
    FanOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Trash,
    Spam,
    Label,
    FetchMetadata,
    Delete,
}

/// Fixed execution parameters of an operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    pub batch_size: usize,
    pub mode: ExecutionMode,
    pub cost: QuotaCost,
    pub description: &'static str,
}

impl OperationKind {
    pub const fn spec(self) -> OperationSpec {
        let (mode, cost, description) = match self {
            OperationKind::Trash => (ExecutionMode::BulkModify, QuotaCost::Read, "Moving to trash"),
            OperationKind::Spam => (ExecutionMode::BulkModify, QuotaCost::Read, "Moving to spam"),
            OperationKind::Label => (ExecutionMode::BulkModify, QuotaCost::Read, "Applying label"),
            OperationKind::FetchMetadata => {
                (ExecutionMode::FanOut, QuotaCost::Read, "Getting messages")
            }
            OperationKind::Delete => {
                (ExecutionMode::FanOut, QuotaCost::Delete, "Deleting permanently")
            }
        };

        OperationSpec {
            batch_size: cost.batch_size(),
            mode,
            cost,
            description,
        }
    }

    pub const fn batch_size(self) -> usize {
        self.spec().batch_size
    }

    pub const fn mode(self) -> ExecutionMode {
        self.spec().mode
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Trash => "trash",
            OperationKind::Spam => "spam",
            OperationKind::Label => "label",
            OperationKind::FetchMetadata => "get",
            OperationKind::Delete => "delete",
        };
        f.write_str(name)
    }
}
