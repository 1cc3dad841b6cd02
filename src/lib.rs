//! Gmail Mailbox Cleaner
//!
//! Bulk-cleans a Gmail mailbox: ranks senders by volume, moves a sender's
//! mail to trash or spam, labels it, and empties spam or trash.
//!
//! # Overview
//!
//! Every action follows the same shape:
//! - **Listing**: the [`pager`] drains `messages.list` into a flat id list
//! - **Execution**: the [`executor`] splits the ids into quota-sized chunks and
//!   runs them one after another, retrying rate limits and 5xx responses with
//!   exponential backoff and skipping chunks that fail for any other reason
//! - **Reporting**: the [`cleaner`] turns the outcome into an [`ActionReport`]
//!   and keeps per-action counters
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_cleaner::{auth, client::ProductionGmailClient, config::Config};
//! use gmail_cleaner::{interrupt, Cleaner, RetryPolicy};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".gmail-cleaner/token.json".as_ref(),
//!     )
//!     .await?;
//!     let client = ProductionGmailClient::new(
//!         hub,
//!         config.mailbox.user_id.clone(),
//!         config.mailbox.page_size,
//!         Duration::from_secs(config.mailbox.request_timeout_secs),
//!     );
//!
//!     let mut cleaner = Cleaner::new(Arc::new(client), RetryPolicy::from_config(&config.retry));
//!     let (_handle, interrupt) = interrupt::channel();
//!     let report = cleaner.trash_from_sender("newsletter@example.com", &interrupt).await?;
//!     println!("{} of {} messages moved to trash", report.processed, report.matched);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`client`] - Mailbox client trait and its Gmail implementation
//! - [`cleaner`] - The user-facing actions
//! - [`cli`] - Command-line interface and interactive menu
//! - [`config`] - Configuration management
//! - [`error`] - Error types and failure classification
//! - [`executor`] - Chunked execution with retry and backoff
//! - [`interrupt`] - Ctrl-C propagation into running actions
//! - [`labels`] - Label lookup and creation
//! - [`models`] - Core data structures
//! - [`pager`] - Paginated listing
//! - [`quota`] - Per-operation quota costs and batch sizes
//! - [`retry`] - Backoff policy
//! - [`senders`] - Sender frequency ranking

pub mod auth;
pub mod cleaner;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod interrupt;
pub mod labels;
pub mod models;
pub mod pager;
pub mod quota;
pub mod retry;
pub mod senders;

// Re-export commonly used types for convenience
pub use error::{FailureClass, GmailError, Result};

pub use cleaner::{ActionProgress, Cleaner, TopSenders};
pub use client::{MailboxClient, ProductionGmailClient};
pub use executor::{BatchExecutor, BatchReport, Operation};
pub use interrupt::{Interrupt, InterruptHandle};
pub use models::{ActionReport, Counters, Label, MessageFilter, MessageId};
pub use quota::OperationKind;
pub use retry::RetryPolicy;
