//! Search-Trawl main entry point
//!
//! This is the command-line interface for the Search-Trawl search scraper.

use anyhow::{bail, Context};
use clap::Parser;
use search_trawl::api::HttpSearchApi;
use search_trawl::config::{load_config_with_hash, Config, RetryPolicy};
use search_trawl::observer::{RunObserver, TracingObserver};
use search_trawl::output::{generate_markdown_summary, SqliteTableSink};
use search_trawl::prompt::{AccountRotation, ConsolePrompt, CredentialPrompt};
use search_trawl::run::{ResumeOutcome, RunDependencies, RunHandle, RunOutcome};
use search_trawl::scrape::plan_windows;
use search_trawl::session::SessionStore;
use search_trawl::storage::{open_storage, RunJournal};
use search_trawl::{Checkpoint, RunCoordinator, RunEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{BufReader, Stdin};
use tracing_subscriber::EnvFilter;

type Console = ConsolePrompt<BufReader<Stdin>>;

/// Search-Trawl: a resumable search scraper
///
/// Search-Trawl walks a keyword search over a time range in fixed windows,
/// rotating accounts when sessions die, and appends every new post to an
/// SQLite table. Interrupted runs pick up where they stopped.
#[derive(Parser, Debug)]
#[command(name = "search-trawl")]
#[command(version)]
#[command(about = "A resumable search scraper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an unfinished run with the same query (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh run, ignoring previous progress
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and print the window plan without searching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the run journal and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Read commands from stdin while running (pause, resume, stop, switch, save, status)
    #[arg(short, long)]
    interactive: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, query_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("cannot load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (query hash: {})", query_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_run(config, query_hash, cli.fresh, cli.interactive).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("search_trawl=info,warn"),
            1 => EnvFilter::new("search_trawl=debug,info"),
            2 => EnvFilter::new("search_trawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and prints the window plan
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let params = config.query_parameters()?;
    let windows = plan_windows(params.start, params.end, params.window);

    println!("=== Search-Trawl Dry Run ===\n");

    println!("Query:");
    println!("  Keywords: {}", params.keywords);
    println!("  Language: {}", params.lang);
    println!("  Ranking: {}", params.ranking.as_str());
    println!("  Range: {} to {}", params.start, params.end);
    println!(
        "  Per window: {} posts, {} per page, at most {} pages",
        params.target_per_window,
        params.page_size,
        params.page_ceiling()
    );

    println!("\nOutput:");
    println!("  Table: {}", config.output.destination);
    println!("  Journal: {}", config.output.state_path);
    println!("  Sessions: {}", config.output.sessions_dir);

    println!("\nAccounts ({}):", config.accounts.len());
    for account in &config.accounts {
        println!("  - {}", account.username);
    }

    println!("\nWindows ({}):", windows.len());
    for window in &windows {
        println!("  - {}", window);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the run journal
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use search_trawl::output::{load_statistics, print_statistics};

    println!("Journal: {}\n", config.output.state_path);

    let storage = open_storage(Path::new(&config.output.state_path))
        .context("cannot open run journal")?;
    let stats = load_statistics(&storage, Path::new(&config.output.destination))?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main run
async fn handle_run(
    config: Config,
    query_hash: String,
    fresh: bool,
    interactive: bool,
) -> anyhow::Result<()> {
    let params = config.query_parameters()?;
    let policy = RetryPolicy::from(&config.retry);

    if fresh {
        tracing::info!("Starting fresh run (ignoring previous progress)");
    }

    // Open the run journal, resuming if possible
    let storage = open_storage(Path::new(&config.output.state_path))
        .context("cannot open run journal")?;
    let (journal, resume) =
        RunJournal::open(storage, &query_hash, fresh).context("cannot resume run journal")?;
    if let Some(checkpoint) = &resume.checkpoint {
        tracing::info!(
            "Resuming run {} ({} posts already seen): {}",
            journal.run_id(),
            resume.ledger.len(),
            checkpoint
        );
    }

    let observer: Arc<dyn RunObserver> = Arc::new(TracingObserver);
    let deps = RunDependencies {
        api: Arc::new(HttpSearchApi::new(&config.api)?),
        session_store: SessionStore::new(&config.output.sessions_dir),
        sink: Box::new(SqliteTableSink::open(&config.output.destination)),
        journal: Box::new(journal),
        observer,
        resume,
    };

    let mut rotation = AccountRotation::from_accounts(&config.accounts);
    let mut console: Option<Console> =
        interactive.then(|| ConsolePrompt::new(BufReader::new(tokio::io::stdin())));

    let first = rotation.next_account();
    if first.is_none() {
        tracing::info!("No accounts configured, starting with a guest session");
    }

    let mut coordinator = RunCoordinator::new(params, policy, deps);
    coordinator.start(first)?;
    let handle = coordinator.handle();

    loop {
        tokio::select! {
            event = coordinator.next_event() => match event {
                Some(RunEvent::Finished(_)) | None => break,
                Some(RunEvent::CredentialsNeeded { checkpoint, reason }) => {
                    tracing::warn!("Account needs replacing: {}", reason);
                    supply_credentials(&handle, &mut rotation, console.as_mut(), checkpoint.as_ref()).await;
                }
                Some(RunEvent::SwitchFailed { identifier }) => {
                    tracing::warn!("Could not switch to {}", identifier);
                    let checkpoint = handle.checkpoint();
                    supply_credentials(&handle, &mut rotation, console.as_mut(), checkpoint.as_ref()).await;
                }
                Some(RunEvent::AccountSwitched { identifier }) => {
                    tracing::info!("Continuing as {}", identifier);
                }
            },
            line = next_console_line(&mut console) => match line {
                Some(line) => handle_command(&line, &handle, &mut console).await,
                None => {
                    tracing::debug!("Console input closed");
                    console = None;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, stopping after the current page");
                if let Err(e) = handle.stop() {
                    tracing::debug!("Stop ignored: {}", e);
                }
            }
        }
    }

    let report = tokio::task::spawn_blocking(move || coordinator.join()).await??;

    if let Some(summary_path) = &config.output.summary_path {
        generate_markdown_summary(&report, Path::new(summary_path))
            .with_context(|| format!("cannot write summary to {}", summary_path))?;
        println!("✓ Summary written to: {}", summary_path);
    }

    println!(
        "Run {}: {} windows, {} new posts, {} rows in {}",
        report.outcome,
        report.windows_completed,
        report.posts_collected,
        report.rows_written,
        report.destination.display()
    );

    if report.outcome == RunOutcome::Failed {
        bail!("run failed: no session could be established");
    }
    Ok(())
}

/// Hands the next account to the run, or stops it when none is left
async fn supply_credentials(
    handle: &RunHandle,
    rotation: &mut AccountRotation,
    console: Option<&mut Console>,
    context: Option<&Checkpoint>,
) {
    let mut next = rotation.request_credentials(context).await;
    if next.is_none() {
        if let Some(console) = console {
            next = console.request_credentials(context).await;
        }
    }

    let result = match next {
        Some(credentials) => {
            tracing::info!("Switching to {}", credentials.identifier);
            handle.switch_account(Some(credentials))
        }
        None => {
            tracing::warn!("No more accounts available, stopping");
            handle.stop()
        }
    };
    if let Err(e) = result {
        tracing::debug!("Request ignored: {}", e);
    }
}

async fn next_console_line(console: &mut Option<Console>) -> Option<String> {
    match console {
        Some(console) => console.next_line().await,
        None => std::future::pending().await,
    }
}

/// Applies one console command
async fn handle_command(line: &str, handle: &RunHandle, console: &mut Option<Console>) {
    let result = match line {
        "" => Ok(()),
        "pause" => handle.pause(),
        "resume" => handle.resume().map(|outcome| {
            if outcome == ResumeOutcome::AwaitingAccount {
                println!("No active session; use `switch` first");
            }
        }),
        "stop" => handle.stop(),
        "save" => handle.save_now(),
        "status" => {
            match handle.checkpoint() {
                Some(checkpoint) => println!("{}: {}", handle.phase(), checkpoint),
                None => println!("{}", handle.phase()),
            }
            Ok(())
        }
        "switch" => {
            let context = handle.checkpoint();
            let credentials = match console {
                Some(console) => console.request_credentials(context.as_ref()).await,
                None => None,
            };
            match credentials {
                Some(credentials) => handle.switch_account(Some(credentials)),
                None => {
                    println!("Switch cancelled");
                    Ok(())
                }
            }
        }
        other => {
            println!(
                "Unknown command '{}' (pause, resume, stop, switch, save, status)",
                other
            );
            Ok(())
        }
    };

    if let Err(e) = result {
        println!("{}", e);
    }
}
