use anyhow::Result;
use clap::Parser;
use gmail_cleaner::cli::{self, Action, BarProgress, Cli, Commands, ProgressReporter, Session};
use gmail_cleaner::client::{ProductionGmailClient, MAIL_SCOPE};
use gmail_cleaner::config::Config;
use gmail_cleaner::error::GmailError;
use gmail_cleaner::retry::RetryPolicy;
use gmail_cleaner::Cleaner;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: MultiProgress,
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self.buffer.lock().unwrap();
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: MultiProgress,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(self.multi.clone())
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        eprintln!("\nFor help, run: gmail-cleaner --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Several dependencies pull in rustls; pick the provider explicitly.
    // aws-lc-rs everywhere except Windows, where ring avoids the NASM/CMake toolchain.
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let mut cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_cleaner=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_cleaner=info,warn,error"))
    };

    // Log lines print above progress bars
    let multi_progress = MultiProgress::new();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(MultiProgressMakeWriter {
            multi: multi_progress.clone(),
        })
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let reporter = ProgressReporter::with_multi_progress(multi_progress);

    match cli.command.take() {
        Some(Commands::InitConfig { output, force }) => {
            tracing::info!("Generating example configuration file");

            if output.exists() && !force {
                return Err(GmailError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(&output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nKey settings to review:");
            println!("  - mailbox.page_size: ids fetched per listing call (max 500)");
            println!("  - retry.max_retries: attempts per batch before it is skipped");
            println!("  - display.default_top_senders: senders shown by default");
            Ok(())
        }

        Some(Commands::Auth { force }) => {
            tracing::info!("Authenticating with Gmail API...");

            if force && cli.token_cache.exists() {
                tokio::fs::remove_file(&cli.token_cache).await?;
                tracing::info!("Removed existing token cache");
            }

            let config = Config::load(&cli.config).await?;
            let spinner = reporter.add_spinner("Waiting for authorization...");
            let hub = gmail_cleaner::auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
            reporter.finish_spinner(&spinner, "Authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            // Same scope as every other call, so the cached token is reused
            let (_, profile) = hub
                .users()
                .get_profile(&config.mailbox.user_id)
                .add_scope(MAIL_SCOPE)
                .doit()
                .await
                .map_err(GmailError::from)?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );
            Ok(())
        }

        Some(Commands::EmptyTrash { yes: false }) if !cli::confirm_empty_trash()? => {
            println!("Cancelled, trash left untouched");
            Ok(())
        }

        command => {
            let config = Config::load(&cli.config).await?;
            let mut session = connect(&cli, &config, &reporter).await?;
            let default_n = session.default_top_senders();

            let action = match command {
                None | Some(Commands::Menu) => return Ok(session.run_menu().await?),
                Some(Commands::Labels) => return Ok(session.print_labels().await?),
                Some(Commands::TopSenders { n }) => Action::TopSenders(n.unwrap_or(default_n)),
                Some(Commands::TrashSender { sender }) => Action::TrashSender(sender),
                Some(Commands::SpamSender { sender }) => Action::SpamSender(sender),
                Some(Commands::EmptySpam) => Action::EmptySpam,
                Some(Commands::TrashLabel { label_id }) => Action::TrashLabel(label_id),
                Some(Commands::LabelSender { label, sender }) => Action::LabelSender { label, sender },
                Some(Commands::EmptyTrash { .. }) => Action::EmptyTrash,
                Some(Commands::Auth { .. }) | Some(Commands::InitConfig { .. }) => return Ok(()),
            };

            session.run_action(action).await?;
            Ok(())
        }
    }
}

/// Authenticate and build a session over the production client
async fn connect(cli: &Cli, config: &Config, reporter: &ProgressReporter) -> Result<Session> {
    let hub = gmail_cleaner::auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
    let client = ProductionGmailClient::new(
        hub,
        config.mailbox.user_id.clone(),
        config.mailbox.page_size,
        Duration::from_secs(config.mailbox.request_timeout_secs),
    );

    let cleaner = Cleaner::new(Arc::new(client), RetryPolicy::from_config(&config.retry))
        .with_progress(Arc::new(BarProgress::new(reporter.clone())));

    Ok(Session::new(cleaner, config.display.default_top_senders))
}
