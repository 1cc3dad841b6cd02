//! Mailbox actions
//!
//! Each public method is one user-facing action: it zeroes its own counter,
//! lists the target messages, hands them to the batch executor and returns a
//! report. Nothing here retries or interprets remote failures; that is the
//! pager's and executor's job.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::client::MailboxClient;
use crate::error::{GmailError, Result};
use crate::executor::{BatchExecutor, Operation, ProgressCallback, SPAM_LABEL, TRASH_LABEL};
use crate::interrupt::Interrupt;
use crate::labels::{LabelDirectory, ResolvedLabel};
use crate::models::{ActionReport, Counters, Label, MessageFilter};
use crate::pager::Pager;
use crate::quota::OperationKind;
use crate::retry::RetryPolicy;
use crate::senders::{SenderAggregator, SenderCount, SenderFrequencyTable};

/// Receives progress for the running action, typically a terminal progress bar
pub trait ActionProgress: Send + Sync {
    fn start(&self, description: &str, total: u64);
    fn advance(&self, items: u64);
    fn finish(&self);
}

/// Result of the "top senders" action
#[derive(Debug, Clone)]
pub struct TopSenders {
    pub entries: Vec<SenderCount>,
    /// Messages covered by `entries`
    pub total_from_users: usize,
    /// Messages in the mailbox when it was last listed
    pub total_messages: usize,
    pub distinct_senders: usize,
    /// Messages whose sender could not be read
    pub skipped: usize,
    pub cancelled: bool,
}

/// Result of labelling a sender's messages
#[derive(Debug, Clone)]
pub struct LabelAction {
    pub label: ResolvedLabel,
    pub report: ActionReport,
}

pub struct Cleaner {
    client: Arc<dyn MailboxClient>,
    retry: RetryPolicy,
    counters: Counters,
    sender_table: Option<SenderFrequencyTable>,
    sender_skipped: usize,
    progress: Option<Arc<dyn ActionProgress>>,
}

impl Cleaner {
    pub fn new(client: Arc<dyn MailboxClient>, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            counters: Counters::default(),
            sender_table: None,
            sender_skipped: 0,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ActionProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Forget the cached sender table so the next ranking re-reads the mailbox
    pub fn clear_sender_cache(&mut self) {
        self.sender_table = None;
        self.sender_skipped = 0;
    }

    fn executor<'a>(&'a self, interrupt: &'a Interrupt, description: &str, total: usize) -> BatchExecutor<'a> {
        let executor = BatchExecutor::new(&*self.client, &self.retry, interrupt);
        match &self.progress {
            Some(progress) => {
                progress.start(description, total as u64);
                let sink = Arc::clone(progress);
                let callback: ProgressCallback = Arc::new(move |items| sink.advance(items));
                executor.with_progress(callback)
            }
            None => executor,
        }
    }

    fn finish_progress(&self) {
        if let Some(progress) = &self.progress {
            progress.finish();
        }
    }

    /// Rank senders by message count and return the first `n`.
    ///
    /// The whole mailbox is listed and its metadata fetched once per session;
    /// later calls reuse the table until a mutation or
    /// [`Cleaner::clear_sender_cache`] invalidates it.
    pub async fn top_senders(&mut self, n: usize, interrupt: &Interrupt) -> Result<TopSenders> {
        if n == 0 {
            return Err(GmailError::InvalidInput(
                "Number of senders must be greater than 0".to_string(),
            ));
        }

        let mut cancelled = false;
        let fresh = match self.sender_table.take() {
            Some(table) => {
                debug!("Using cached sender table ({} senders)", table.len());
                table
            }
            None => {
                let listing = Pager::new(&*self.client, &self.retry, interrupt)
                    .list(&MessageFilter::All)
                    .await?;
                if listing.counts_toward_total() {
                    self.counters.total_messages = listing.len();
                }

                let mut aggregator = SenderAggregator::new();
                let report = if listing.interrupted {
                    None
                } else {
                    let executor = self.executor(interrupt, "Getting messages", listing.len());
                    let report = executor
                        .execute(&listing.ids, &Operation::FetchMetadata, |id, result| {
                            aggregator.record(id, result)
                        })
                        .await;
                    self.finish_progress();
                    Some(report)
                };

                cancelled = listing.interrupted || report.map_or(false, |r| r.cancelled);
                self.sender_skipped = aggregator.skipped();
                aggregator.into_table()
            }
        };

        self.counters.begin(OperationKind::FetchMetadata);
        let entries = fresh.top(n);
        let total_from_users = entries.iter().map(|e| e.count).sum();
        self.counters.credit(OperationKind::FetchMetadata, total_from_users);

        let result = TopSenders {
            entries,
            total_from_users,
            total_messages: self.counters.total_messages,
            distinct_senders: fresh.len(),
            skipped: self.sender_skipped,
            cancelled,
        };

        // a partial table would under-report on the next call
        if !cancelled {
            self.sender_table = Some(fresh);
        }

        Ok(result)
    }

    /// Move every message from `sender` to the trash
    pub async fn trash_from_sender(&mut self, sender: &str, interrupt: &Interrupt) -> Result<ActionReport> {
        let filter = MessageFilter::from_sender(require("Sender", sender)?);
        self.apply(filter, Operation::Trash, interrupt).await
    }

    /// Move every message from `sender` to spam
    pub async fn spam_from_sender(&mut self, sender: &str, interrupt: &Interrupt) -> Result<ActionReport> {
        let filter = MessageFilter::from_sender(require("Sender", sender)?);
        self.apply(filter, Operation::Spam, interrupt).await
    }

    /// Move everything in the spam folder to the trash
    pub async fn empty_spam(&mut self, interrupt: &Interrupt) -> Result<ActionReport> {
        self.apply(MessageFilter::Label(SPAM_LABEL.to_string()), Operation::Trash, interrupt)
            .await
    }

    /// Move every message carrying `label_id` to the trash
    pub async fn trash_label(&mut self, label_id: &str, interrupt: &Interrupt) -> Result<ActionReport> {
        let label_id = require("Label ID", label_id)?;
        self.apply(MessageFilter::Label(label_id.to_string()), Operation::Trash, interrupt)
            .await
    }

    /// Apply `label_name` to every message from `sender`, creating the label if needed.
    /// A failed label creation aborts the action before anything is listed.
    pub async fn label_from_sender(
        &mut self,
        label_name: &str,
        sender: &str,
        interrupt: &Interrupt,
    ) -> Result<LabelAction> {
        let label_name = require("Label name", label_name)?;
        let sender = require("Sender", sender)?;

        let label = LabelDirectory::new(&*self.client, &self.retry, interrupt)
            .resolve(label_name)
            .await?;

        let operation = Operation::Label {
            label_id: label.label.id.clone(),
        };
        let report = self
            .apply(MessageFilter::from_sender(sender), operation, interrupt)
            .await?;

        Ok(LabelAction { label, report })
    }

    /// Permanently delete everything in the trash. Irreversible; callers confirm first.
    pub async fn empty_trash(&mut self, interrupt: &Interrupt) -> Result<ActionReport> {
        self.apply(MessageFilter::Label(TRASH_LABEL.to_string()), Operation::Delete, interrupt)
            .await
    }

    /// Every label in the account. Runs outside any action, so it cannot be interrupted.
    pub async fn labels(&self) -> Result<Vec<Label>> {
        let interrupt = Interrupt::never();
        LabelDirectory::new(&*self.client, &self.retry, &interrupt).list().await
    }

    async fn apply(
        &mut self,
        filter: MessageFilter,
        operation: Operation,
        interrupt: &Interrupt,
    ) -> Result<ActionReport> {
        let kind = operation.kind();
        let started_at = Utc::now();
        self.counters.begin(kind);

        let listing = Pager::new(&*self.client, &self.retry, interrupt)
            .list(&filter)
            .await?;
        if listing.counts_toward_total() {
            self.counters.total_messages = listing.len();
        }

        let mut report = ActionReport {
            kind,
            target: filter.to_string(),
            matched: listing.len(),
            processed: 0,
            abandoned_chunks: 0,
            cancelled: listing.interrupted,
            started_at,
            finished_at: started_at,
        };

        if listing.is_empty() {
            info!("No messages found for {}", filter);
        } else if !listing.interrupted {
            let batch = self
                .executor(interrupt, kind.spec().description, listing.len())
                .run(&listing.ids, &operation)
                .await;
            self.finish_progress();

            report.processed = batch.processed;
            report.abandoned_chunks = batch.abandoned_chunks;
            report.cancelled = batch.cancelled;
        }

        self.counters.credit(kind, report.processed);
        if report.processed > 0 {
            self.clear_sender_cache();
        }

        report.finished_at = Utc::now();
        info!(
            "{} for {}: {} of {} messages in {}s",
            kind.spec().description,
            report.target,
            report.processed,
            report.matched,
            report.duration_seconds()
        );
        Ok(report)
    }
}

fn require<'v>(what: &str, value: &'v str) -> Result<&'v str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GmailError::InvalidInput(format!("{} cannot be empty", what)));
    }
    Ok(trimmed)
}
