//! Batched execution of mailbox operations with per-chunk retry
//!
//! The executor takes an arbitrary list of message ids and an [`Operation`],
//! splits the list into chunks sized by the operation's quota cost, and runs
//! the chunks strictly one after another. That sequential loop, together with
//! the backoff sleeps inside it, is what keeps a run under the Gmail quota.
//!
//! Failures never escape a chunk:
//! - rate limits and 5xx responses retry the chunk (bulk mode) or the chunk's
//!   still-unresolved items (fan-out mode), up to the policy's retry budget
//! - any other failure abandons the chunk, or resolves the single item, at once
//! - an exhausted budget abandons whatever is left of the chunk
//!
//! The returned [`BatchReport::processed`] is therefore a lower bound on the
//! work requested, never an error.

use futures::future::join_all;
use std::slice::Chunks;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::MailboxClient;
use crate::error::{GmailError, Result};
use crate::interrupt::Interrupt;
use crate::models::{MessageId, MessageMetadata};
use crate::quota::{ExecutionMode, OperationKind};
use crate::retry::RetryPolicy;

pub const TRASH_LABEL: &str = "TRASH";
pub const SPAM_LABEL: &str = "SPAM";

/// Progress callback, invoked with the size of every finished chunk
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// An operation kind together with the data it needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Trash,
    Spam,
    /// Apply an existing label, addressed by id
    Label { label_id: String },
    FetchMetadata,
    Delete,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Trash => OperationKind::Trash,
            Operation::Spam => OperationKind::Spam,
            Operation::Label { .. } => OperationKind::Label,
            Operation::FetchMetadata => OperationKind::FetchMetadata,
            Operation::Delete => OperationKind::Delete,
        }
    }

    /// Label ids a batchModify call for this operation adds
    pub fn add_label_ids(&self) -> Vec<String> {
        match self {
            Operation::Trash => vec![TRASH_LABEL.to_string()],
            Operation::Spam => vec![SPAM_LABEL.to_string()],
            Operation::Label { label_id } => vec![label_id.clone()],
            Operation::FetchMetadata | Operation::Delete => Vec::new(),
        }
    }
}

/// What a single per-item call returned
#[derive(Debug, Clone)]
pub enum ItemResponse {
    Metadata(MessageMetadata),
    Deleted,
}

/// Split `items` into contiguous chunks of at most `batch_size`, in order
pub fn partition(items: &[MessageId], batch_size: usize) -> Chunks<'_, MessageId> {
    items.chunks(batch_size.max(1))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub kind: OperationKind,
    pub requested: usize,
    /// Items confirmed by the remote side (bulk) or accepted by the callback (fan-out)
    pub processed: usize,
    /// Chunks started
    pub chunks: usize,
    pub abandoned_chunks: usize,
    /// Remote call rounds issued across all chunks
    pub attempts: usize,
    pub cancelled: bool,
}

impl BatchReport {
    fn new(kind: OperationKind, requested: usize) -> Self {
        Self {
            kind,
            requested,
            processed: 0,
            chunks: 0,
            abandoned_chunks: 0,
            attempts: 0,
            cancelled: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.processed == self.requested
    }

    pub fn unprocessed(&self) -> usize {
        self.requested.saturating_sub(self.processed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkStatus {
    Completed,
    Abandoned,
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
struct ChunkOutcome {
    status: ChunkStatus,
    processed: usize,
    attempts: usize,
}

/// Runs operations chunk by chunk against a [`MailboxClient`]
pub struct BatchExecutor<'a> {
    client: &'a dyn MailboxClient,
    retry: &'a RetryPolicy,
    interrupt: &'a Interrupt,
    progress: Option<ProgressCallback>,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(client: &'a dyn MailboxClient, retry: &'a RetryPolicy, interrupt: &'a Interrupt) -> Self {
        Self {
            client,
            retry,
            interrupt,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Execute `operation`, counting every successful item
    pub async fn run(&self, items: &[MessageId], operation: &Operation) -> BatchReport {
        self.execute(items, operation, |_, result| result.is_ok()).await
    }

    /// Execute `operation` over `items`.
    ///
    /// In fan-out mode `on_item` is called exactly once per item with its
    /// final result and decides whether the item counts as processed. Bulk
    /// mode has no per-item results, so the callback is not used there and a
    /// confirmed chunk counts in full.
    pub async fn execute<F>(&self, items: &[MessageId], operation: &Operation, mut on_item: F) -> BatchReport
    where
        F: FnMut(&str, Result<ItemResponse>) -> bool,
    {
        let kind = operation.kind();
        let spec = kind.spec();
        let mut report = BatchReport::new(kind, items.len());

        debug!(
            "{}: {} items in chunks of {} ({:?})",
            spec.description,
            items.len(),
            spec.batch_size,
            spec.mode
        );

        for (index, chunk) in partition(items, spec.batch_size).enumerate() {
            if self.interrupt.is_set() {
                info!("{} interrupted before chunk {}", spec.description, index + 1);
                report.cancelled = true;
                break;
            }

            report.chunks += 1;
            let outcome = match spec.mode {
                ExecutionMode::BulkModify => self.run_bulk(index, chunk, operation).await,
                ExecutionMode::FanOut => self.run_fan_out(index, chunk, operation, &mut on_item).await,
            };

            report.processed += outcome.processed;
            report.attempts += outcome.attempts;

            if let Some(progress) = &self.progress {
                progress(chunk.len() as u64);
            }

            match outcome.status {
                ChunkStatus::Completed => {}
                ChunkStatus::Abandoned => report.abandoned_chunks += 1,
                ChunkStatus::Cancelled => {
                    info!("{} interrupted during chunk {}", spec.description, index + 1);
                    report.cancelled = true;
                    break;
                }
            }
        }

        info!(
            "{}: {} of {} messages processed in {} chunks ({} abandoned)",
            spec.description,
            report.processed,
            report.requested,
            report.chunks,
            report.abandoned_chunks
        );

        report
    }

    /// One batchModify call for the whole chunk, retried as a unit
    async fn run_bulk(&self, index: usize, chunk: &[MessageId], operation: &Operation) -> ChunkOutcome {
        let add_label_ids = operation.add_label_ids();
        let mut state = self.retry.start();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let error = match self.client.batch_modify(chunk, &add_label_ids).await {
                Ok(()) => {
                    debug!("Chunk {} ({} messages) applied", index + 1, chunk.len());
                    return ChunkOutcome {
                        status: ChunkStatus::Completed,
                        processed: chunk.len(),
                        attempts,
                    };
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                warn!(
                    "Error during {} for chunk {}: {}. Skipping {} messages",
                    operation.kind(),
                    index + 1,
                    error,
                    chunk.len()
                );
                return ChunkOutcome {
                    status: ChunkStatus::Abandoned,
                    processed: 0,
                    attempts,
                };
            }

            let Some(delay) = state.next_delay() else {
                warn!(
                    "Maximum retries exceeded for chunk {} ({}): {}",
                    index + 1,
                    operation.kind(),
                    error
                );
                return ChunkOutcome {
                    status: ChunkStatus::Abandoned,
                    processed: 0,
                    attempts,
                };
            };

            warn!(
                "{}, retrying chunk {} in {:.2?} (attempt {}/{})",
                error,
                index + 1,
                delay,
                state.retries(),
                state.max_retries()
            );

            if !self.interrupt.sleep(delay).await {
                return ChunkOutcome {
                    status: ChunkStatus::Cancelled,
                    processed: 0,
                    attempts,
                };
            }
        }
    }

    /// One concurrent call per item; only items that hit a retryable error
    /// are re-issued, so no item is resolved twice
    async fn run_fan_out<F>(
        &self,
        index: usize,
        chunk: &[MessageId],
        operation: &Operation,
        on_item: &mut F,
    ) -> ChunkOutcome
    where
        F: FnMut(&str, Result<ItemResponse>) -> bool,
    {
        let mut state = self.retry.start();
        let mut pending: Vec<&MessageId> = chunk.iter().collect();
        let mut processed = 0;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let results = join_all(pending.iter().map(|id| self.call_item(id.as_str(), operation))).await;

            let mut retryable: Vec<(&MessageId, GmailError)> = Vec::new();
            for (id, result) in pending.into_iter().zip(results) {
                match result {
                    Err(e) if e.is_retryable() => retryable.push((id, e)),
                    resolved => {
                        if let Err(e) = &resolved {
                            debug!("Error during {} for message {}: {}", operation.kind(), id, e);
                        }
                        if on_item(id.as_str(), resolved) {
                            processed += 1;
                        }
                    }
                }
            }

            if retryable.is_empty() {
                return ChunkOutcome {
                    status: ChunkStatus::Completed,
                    processed,
                    attempts,
                };
            }

            let Some(delay) = state.next_delay() else {
                warn!(
                    "Maximum retries exceeded for chunk {} ({}): {} messages unresolved",
                    index + 1,
                    operation.kind(),
                    retryable.len()
                );
                for (id, e) in retryable {
                    if on_item(id.as_str(), Err(e)) {
                        processed += 1;
                    }
                }
                return ChunkOutcome {
                    status: ChunkStatus::Abandoned,
                    processed,
                    attempts,
                };
            };

            warn!(
                "{} of {} messages in chunk {} rate limited or failed server-side, retrying in {:.2?} (attempt {}/{})",
                retryable.len(),
                chunk.len(),
                index + 1,
                delay,
                state.retries(),
                state.max_retries()
            );

            if !self.interrupt.sleep(delay).await {
                for (id, _) in retryable {
                    let cancelled = GmailError::OperationCancelled(format!("{} for message {}", operation.kind(), id));
                    if on_item(id.as_str(), Err(cancelled)) {
                        processed += 1;
                    }
                }
                return ChunkOutcome {
                    status: ChunkStatus::Cancelled,
                    processed,
                    attempts,
                };
            }

            pending = retryable.into_iter().map(|(id, _)| id).collect();
        }
    }

    async fn call_item(&self, id: &str, operation: &Operation) -> Result<ItemResponse> {
        match operation {
            Operation::FetchMetadata => self
                .client
                .get_message_metadata(id)
                .await
                .map(ItemResponse::Metadata),
            Operation::Delete => self.client.delete_message(id).await.map(|()| ItemResponse::Deleted),
            Operation::Trash | Operation::Spam | Operation::Label { .. } => Err(GmailError::Unknown(format!(
                "{} is applied with one batchModify per chunk, not per message",
                operation.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(n: usize) -> Vec<MessageId> {
        (0..n).map(|i| format!("msg{}", i)).collect()
    }

    #[test]
    fn test_partition_shorter_than_batch() {
        let items = ids(3);
        let chunks: Vec<_> = partition(&items, 20).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], &items[..]);
    }

    #[test]
    fn test_partition_last_chunk_shorter() {
        let items = ids(25);
        let sizes: Vec<_> = partition(&items, 20).map(|c| c.len()).collect();
        assert_eq!(sizes, vec![20, 5]);
    }

    #[test]
    fn test_partition_empty() {
        assert_eq!(partition(&[], 20).count(), 0);
    }

    #[test]
    fn test_operation_labels() {
        assert_eq!(Operation::Trash.add_label_ids(), vec!["TRASH"]);
        assert_eq!(Operation::Spam.add_label_ids(), vec!["SPAM"]);
        assert_eq!(
            Operation::Label {
                label_id: "Label_7".to_string()
            }
            .add_label_ids(),
            vec!["Label_7"]
        );
        assert!(Operation::FetchMetadata.add_label_ids().is_empty());
        assert_eq!(Operation::Delete.kind(), OperationKind::Delete);
    }

    /// A client that must never be reached
    struct NoCalls;

    #[async_trait::async_trait]
    impl MailboxClient for NoCalls {
        async fn list_messages(
            &self,
            _: &crate::models::MessageFilter,
            _: Option<String>,
        ) -> Result<crate::models::MessagePage> {
            panic!("unexpected messages.list")
        }
        async fn get_message_metadata(&self, _: &str) -> Result<MessageMetadata> {
            panic!("unexpected messages.get")
        }
        async fn batch_modify(&self, _: &[String], _: &[String]) -> Result<()> {
            panic!("unexpected messages.batchModify")
        }
        async fn delete_message(&self, _: &str) -> Result<()> {
            panic!("unexpected messages.delete")
        }
        async fn list_labels(&self) -> Result<Vec<crate::models::Label>> {
            panic!("unexpected labels.list")
        }
        async fn create_label(&self, _: &str) -> Result<crate::models::Label> {
            panic!("unexpected labels.create")
        }
    }

    #[tokio::test]
    async fn test_bulk_operations_have_no_per_message_call() {
        let retry = RetryPolicy::immediate(0);
        let interrupt = Interrupt::never();
        let executor = BatchExecutor::new(&NoCalls, &retry, &interrupt);

        let bulk = [
            Operation::Trash,
            Operation::Spam,
            Operation::Label {
                label_id: "Label_1".to_string(),
            },
        ];
        for operation in bulk {
            let result = executor.call_item("msg1", &operation).await;
            assert!(matches!(result, Err(GmailError::Unknown(_))), "{:?}", operation);
        }
    }

    proptest! {
        #[test]
        fn prop_partition_covers_every_item_once(n in 0usize..500, batch in 1usize..64) {
            let items = ids(n);
            let chunks: Vec<_> = partition(&items, batch).collect();

            prop_assert_eq!(chunks.len(), (n + batch - 1) / batch);
            prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= batch));

            let flattened: Vec<MessageId> = chunks.concat();
            prop_assert_eq!(flattened, items);
        }
    }
}
