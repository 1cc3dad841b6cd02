//! Command-line interface and interactive menu

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use inquire::validator::Validation;
use inquire::{CustomUserError, InquireError};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::cleaner::{ActionProgress, Cleaner, TopSenders};
use crate::error::{GmailError, Result};
use crate::interrupt::{self, Interrupt};
use crate::models::{ActionReport, Label};
use crate::quota::OperationKind;

#[derive(Parser, Debug)]
#[command(name = "gmail-cleaner")]
#[command(version)]
#[command(about = "Bulk-clean a Gmail mailbox by sender, label or folder", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-cleaner/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Defaults to the interactive menu
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Interactive menu
    Menu,

    /// Show the senders with the most messages
    TopSenders {
        /// Number of senders to show (defaults to display.default_top_senders)
        n: Option<usize>,
    },

    /// Move every message from a sender to the trash
    TrashSender { sender: String },

    /// Move every message from a sender to spam
    SpamSender { sender: String },

    /// Move everything in spam to the trash
    EmptySpam,

    /// Move every message with a label to the trash
    TrashLabel {
        /// Label ID, see the `labels` command
        label_id: String,
    },

    /// Apply a label to every message from a sender, creating the label if needed
    LabelSender { label: String, sender: String },

    /// Permanently delete everything in the trash
    EmptyTrash {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// List labels and their IDs
    Labels,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress reporter using indicatif
#[derive(Clone)]
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap()
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        println!("  ✓ {}", msg);
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }
}

/// One progress bar per executor run
pub struct BarProgress {
    reporter: ProgressReporter,
    bar: Mutex<Option<ProgressBar>>,
}

impl BarProgress {
    pub fn new(reporter: ProgressReporter) -> Self {
        Self {
            reporter,
            bar: Mutex::new(None),
        }
    }
}

impl ActionProgress for BarProgress {
    fn start(&self, description: &str, total: u64) {
        if let Ok(mut bar) = self.bar.lock() {
            if let Some(previous) = bar.take() {
                previous.finish_and_clear();
            }
            *bar = Some(self.reporter.add_progress_bar(total, description));
        }
    }

    fn advance(&self, items: u64) {
        if let Ok(bar) = self.bar.lock() {
            if let Some(bar) = bar.as_ref() {
                bar.inc(items);
            }
        }
    }

    fn finish(&self) {
        if let Ok(mut bar) = self.bar.lock() {
            if let Some(bar) = bar.take() {
                bar.finish_and_clear();
            }
        }
    }
}

/// One user-facing action with its inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    TopSenders(usize),
    TrashSender(String),
    SpamSender(String),
    EmptySpam,
    TrashLabel(String),
    LabelSender { label: String, sender: String },
    EmptyTrash,
}

const MENU_ITEMS: [&str; 8] = [
    "1. Show top senders",
    "2. Move all messages from a sender to trash",
    "3. Mark all messages from a sender as spam",
    "4. Empty spam (move to trash)",
    "5. Move all messages with a label to trash",
    "6. Label all messages from a sender",
    "7. Empty trash (permanent)",
    "8. Exit",
];

/// Map a menu entry back to its number
fn menu_choice(selected: &str) -> Option<u8> {
    MENU_ITEMS
        .iter()
        .position(|item| *item == selected)
        .and_then(|index| u8::try_from(index + 1).ok())
}

/// Escape or Ctrl-C at a prompt means "back", not failure
fn answered<T>(result: std::result::Result<T, InquireError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(InquireError::OperationCanceled) | Err(InquireError::OperationInterrupted) => Ok(None),
        Err(e) => Err(GmailError::Unknown(format!("Prompt failed: {}", e))),
    }
}

/// Drives a [`Cleaner`] from subcommands or the interactive menu
pub struct Session {
    cleaner: Cleaner,
    default_top_senders: usize,
}

impl Session {
    pub fn new(cleaner: Cleaner, default_top_senders: usize) -> Self {
        Self {
            cleaner,
            default_top_senders,
        }
    }

    pub fn default_top_senders(&self) -> usize {
        self.default_top_senders
    }

    /// Run one action with Ctrl-C wired to its interrupt
    pub async fn run_action(&mut self, action: Action) -> Result<()> {
        let (handle, interrupt) = interrupt::channel();
        let watcher = handle.watch_ctrl_c();
        let result = self.perform(action, &interrupt).await;
        watcher.abort();
        result
    }

    async fn perform(&mut self, action: Action, interrupt: &Interrupt) -> Result<()> {
        debug!("Running {:?}", action);
        match action {
            Action::TopSenders(n) => {
                let top = self.cleaner.top_senders(n, interrupt).await?;
                print_top_senders(&top);
            }
            Action::TrashSender(sender) => {
                let report = self.cleaner.trash_from_sender(&sender, interrupt).await?;
                print_report(&report);
            }
            Action::SpamSender(sender) => {
                let report = self.cleaner.spam_from_sender(&sender, interrupt).await?;
                print_report(&report);
            }
            Action::EmptySpam => {
                let report = self.cleaner.empty_spam(interrupt).await?;
                print_report(&report);
            }
            Action::TrashLabel(label_id) => {
                let report = self.cleaner.trash_label(&label_id, interrupt).await?;
                print_report(&report);
            }
            Action::LabelSender { label, sender } => {
                let outcome = self.cleaner.label_from_sender(&label, &sender, interrupt).await?;
                if outcome.label.created {
                    println!("Created label '{}' ({})", outcome.label.label.name, outcome.label.label.id);
                }
                print_report(&outcome.report);
            }
            Action::EmptyTrash => {
                let report = self.cleaner.empty_trash(interrupt).await?;
                print_report(&report);
            }
        }
        Ok(())
    }

    pub async fn print_labels(&self) -> Result<()> {
        let labels = self.cleaner.labels().await?;
        print_labels(&labels);
        Ok(())
    }

    /// Numbered menu loop; returns when the user picks exit or cancels the menu.
    /// A failed action is printed and the menu shown again.
    pub async fn run_menu(&mut self) -> Result<()> {
        loop {
            println!();
            let selected = answered(
                inquire::Select::new("What would you like to do?", MENU_ITEMS.to_vec())
                    .with_page_size(MENU_ITEMS.len())
                    .prompt(),
            )?;

            let choice = match selected.and_then(menu_choice) {
                Some(8) | None => {
                    info!("Leaving menu");
                    return Ok(());
                }
                Some(choice) => choice,
            };

            let action = match self.prompt_action(choice).await {
                Ok(Some(action)) => action,
                Ok(None) => continue,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    continue;
                }
            };

            if let Err(e) = self.run_action(action).await {
                eprintln!("Error: {}", e);
            }
        }
    }

    /// Gather the inputs for menu entry `choice`; `None` means back to the menu
    async fn prompt_action(&self, choice: u8) -> Result<Option<Action>> {
        let action = match choice {
            1 => answered(
                inquire::CustomType::<usize>::new("How many senders?")
                    .with_default(self.default_top_senders)
                    .with_error_message("Please enter a positive number")
                    .with_validator(positive)
                    .prompt(),
            )?
            .map(Action::TopSenders),
            2 => prompt_sender()?.map(Action::TrashSender),
            3 => prompt_sender()?.map(Action::SpamSender),
            4 => Some(Action::EmptySpam),
            5 => self.prompt_label_id().await?.map(Action::TrashLabel),
            6 => {
                let Some(label) = answered(
                    inquire::Text::new("Label name:")
                        .with_validator(inquire::required!("Label name cannot be empty"))
                        .prompt(),
                )?
                else {
                    return Ok(None);
                };
                prompt_sender()?.map(|sender| Action::LabelSender { label, sender })
            }
            7 => confirm_empty_trash()?.then_some(Action::EmptyTrash),
            _ => None,
        };
        Ok(action)
    }

    async fn prompt_label_id(&self) -> Result<Option<String>> {
        let labels = self.cleaner.labels().await?;
        if labels.is_empty() {
            println!("No labels found");
            return Ok(None);
        }

        let options: Vec<String> = labels.iter().map(label_option).collect();
        let selected = answered(
            inquire::Select::new("Select label:", options.clone())
                .with_page_size(10)
                .prompt(),
        )?;

        Ok(selected.and_then(|choice| {
            options
                .iter()
                .position(|option| *option == choice)
                .map(|index| labels[index].id.clone())
        }))
    }
}

fn positive(n: &usize) -> std::result::Result<Validation, CustomUserError> {
    Ok(if *n > 0 {
        Validation::Valid
    } else {
        Validation::Invalid("Must be greater than 0".into())
    })
}

fn prompt_sender() -> Result<Option<String>> {
    answered(
        inquire::Text::new("Sender email address:")
            .with_validator(inquire::required!("Sender cannot be empty"))
            .prompt(),
    )
}

/// Ask before deleting anything permanently
pub fn confirm_empty_trash() -> Result<bool> {
    let confirmed = answered(
        inquire::Confirm::new("Permanently delete every message in the trash? This cannot be undone.")
            .with_default(false)
            .prompt(),
    )?;
    Ok(confirmed.unwrap_or(false))
}

fn label_option(label: &Label) -> String {
    format!("{} ({})", label.name, label.id)
}

fn action_verb(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Trash => "Moved to trash",
        OperationKind::Spam => "Marked as spam",
        OperationKind::Label => "Labelled",
        OperationKind::FetchMetadata => "Fetched",
        OperationKind::Delete => "Permanently deleted",
    }
}

pub fn print_report(report: &ActionReport) {
    if report.matched == 0 {
        if report.cancelled {
            println!("Interrupted before any messages were found for {}", report.target);
        } else {
            println!("No messages found for {}", report.target);
        }
        return;
    }

    println!(
        "{} {} of {} messages ({}) in {}s",
        action_verb(report.kind),
        report.processed,
        report.matched,
        report.target,
        report.duration_seconds()
    );
    if report.abandoned_chunks > 0 {
        println!(
            "  {} batch(es) could not be processed, see warnings above",
            report.abandoned_chunks
        );
    }
    if report.cancelled {
        println!("  Interrupted: remaining messages were left untouched");
    }
}

pub fn print_top_senders(top: &TopSenders) {
    if top.entries.is_empty() {
        println!("No senders found");
        return;
    }

    println!(
        "\nTop {} senders ({} of {} messages, {} distinct senders):",
        top.entries.len(),
        top.total_from_users,
        top.total_messages,
        top.distinct_senders
    );
    for (rank, entry) in top.entries.iter().enumerate() {
        println!(
            "{:>4}. {:<50} {:>7}",
            rank + 1,
            truncate_string(entry.display(), 50),
            entry.count
        );
    }
    if top.skipped > 0 {
        println!("  {} messages skipped (sender unreadable)", top.skipped);
    }
    if top.cancelled {
        println!("  Interrupted: counts cover only the messages read so far");
    }
}

pub fn print_labels(labels: &[Label]) {
    if labels.is_empty() {
        println!("No labels found");
        return;
    }
    println!("{:<40} ID", "NAME");
    for label in labels {
        println!("{:<40} {}", truncate_string(&label.name, 40), label.id);
    }
}
