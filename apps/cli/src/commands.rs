//! CLI command definitions, routing, and tracing setup.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use coursefeedback_core::{
    HttpFeedbackClient, MutationBatch, PassObserver, PassOutcome, Reconciler, handle_message,
};
use coursefeedback_dom::{HtmlPage, SiteVariant, scrape};
use coursefeedback_shared::{AppConfig, ReconcilerConfig, init_config, load_config};
use indicatif::{ProgressBar, ProgressStyle};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// CourseFeedback: course evaluation data on course search results.
#[derive(Parser)]
#[command(
    name = "coursefeedback",
    version,
    about = "Annotate course search result pages with course feedback.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Print the course rows found on a saved page as JSON.
    Scrape {
        /// Saved HTML page.
        #[arg(short, long)]
        input: PathBuf,

        /// URL the page was served from (selects the site layout).
        #[arg(short, long)]
        url: String,
    },

    /// Run one reconciliation pass and write the annotated page.
    Annotate {
        /// Saved HTML page.
        #[arg(short, long)]
        input: PathBuf,

        /// URL the page was served from (selects the site layout).
        #[arg(short, long)]
        url: String,

        /// Output file (defaults to stdout).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Feedback service endpoint (overrides config).
        #[arg(long, env = "COURSEFEEDBACK_ENDPOINT")]
        endpoint: Option<String>,
    },

    /// Watch a saved page and re-annotate it after every change.
    Watch {
        /// Saved HTML page to watch.
        #[arg(short, long)]
        input: PathBuf,

        /// URL the page was served from (selects the site layout).
        #[arg(short, long)]
        url: String,

        /// Output file, rewritten after every pass.
        #[arg(short, long)]
        out: PathBuf,

        /// Feedback service endpoint (overrides config).
        #[arg(long, env = "COURSEFEEDBACK_ENDPOINT")]
        endpoint: Option<String>,
    },

    /// Answer relay messages read from stdin, one JSON object per line.
    Relay,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so page and
/// JSON output on stdout stay clean.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "coursefeedback=info",
        1 => "coursefeedback=debug",
        _ => "coursefeedback=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Scrape { input, url } => cmd_scrape(&input, &url).await,
        Command::Annotate {
            input,
            url,
            out,
            endpoint,
        } => cmd_annotate(&input, &url, out.as_deref(), endpoint).await,
        Command::Watch {
            input,
            url,
            out,
            endpoint,
        } => cmd_watch(&input, &url, &out, endpoint).await,
        Command::Relay => cmd_relay().await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn read_page(input: &Path, url: &str) -> Result<HtmlPage> {
    let url = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    let html = std::fs::read_to_string(input)
        .map_err(|e| eyre!("cannot read '{}': {e}", input.display()))?;
    Ok(HtmlPage::parse(&html, url))
}

fn write_page(out: &Path, page: &HtmlPage) -> Result<()> {
    std::fs::write(out, page.to_html())
        .map_err(|e| eyre!("cannot write '{}': {e}", out.display()))
}

/// Load config and apply a command-line endpoint override.
fn resolve_config(endpoint: Option<String>) -> Result<AppConfig> {
    let mut config = load_config()?;
    if let Some(endpoint) = endpoint {
        config.feedback.endpoint = endpoint;
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_scrape(input: &Path, url: &str) -> Result<()> {
    let config = load_config()?;
    let page = read_page(input, url)?;
    let variant = SiteVariant::detect(page.url(), &config.sites)?;

    let courses = scrape(page.document(), variant.layout());
    info!(variant = %variant, courses = courses.len(), "scraped page");

    println!("{}", serde_json::to_string_pretty(&courses)?);
    Ok(())
}

async fn cmd_annotate(
    input: &Path,
    url: &str,
    out: Option<&Path>,
    endpoint: Option<String>,
) -> Result<()> {
    let config = resolve_config(endpoint)?;
    let page = read_page(input, url)?;
    let variant = SiteVariant::detect(page.url(), &config.sites)?;
    let client = HttpFeedbackClient::from_config(&config)?;

    info!(
        input = %input.display(),
        variant = %variant,
        endpoint = %client.endpoint(),
        "annotating page"
    );

    let page = Rc::new(RefCell::new(page));
    let progress = CliProgress::new();
    progress.spinner.set_message(format!("Looking up feedback for {url}"));

    let mut reconciler = Reconciler::new(
        page.clone(),
        variant.layout(),
        client,
        &ReconcilerConfig::from(&config),
    )
    .with_observer(progress);

    let outcome = reconciler.reconcile_now().await;
    let report = match outcome {
        PassOutcome::NoCourses => {
            warn!("no course rows found on page");
            None
        }
        PassOutcome::Rendered { report, .. } => Some(report),
        PassOutcome::Failed { error, .. } => {
            return Err(eyre!("feedback lookup failed: {error}"));
        }
    };

    match out {
        Some(path) => {
            write_page(path, &page.borrow())?;

            println!();
            println!("  Page annotated!");
            if let Some(report) = report {
                println!("  Widgets:     {}", report.rendered);
                println!("  No feedback: {}", report.without_feedback);
            }
            println!("  Output:      {}", path.display());
            println!();
        }
        None => println!("{}", page.borrow().to_html()),
    }

    Ok(())
}

async fn cmd_watch(input: &Path, url: &str, out: &Path, endpoint: Option<String>) -> Result<()> {
    let config = resolve_config(endpoint)?;
    let page = read_page(input, url)?;
    let variant = SiteVariant::detect(page.url(), &config.sites)?;
    let client = HttpFeedbackClient::from_config(&config)?;

    let input = std::fs::canonicalize(input)
        .map_err(|e| eyre!("cannot resolve '{}': {e}", input.display()))?;
    let watch_dir = input
        .parent()
        .ok_or_else(|| eyre!("'{}' has no parent directory", input.display()))?
        .to_path_buf();
    let out = resolve_watch_output(&input, out)?;

    let (fs_tx, mut fs_rx) = mpsc::channel::<notify::Result<Event>>(100);
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = fs_tx.blocking_send(res);
        },
        Config::default(),
    )
    .map_err(|e| eyre!("failed to create file watcher: {e}"))?;
    watcher
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .map_err(|e| eyre!("failed to watch '{}': {e}", watch_dir.display()))?;

    let page = Rc::new(RefCell::new(page));
    let (mutation_tx, mutation_rx) = mpsc::unbounded_channel();
    let reconciler = Reconciler::new(
        page.clone(),
        variant.layout(),
        client,
        &ReconcilerConfig::from(&config),
    )
    .with_observer(OutputWriter { out: out.clone() });

    info!(
        input = %input.display(),
        out = %out.display(),
        variant = %variant,
        "watching page, press Ctrl-C to stop"
    );

    // The freshly loaded page counts as one change.
    mutation_tx.send(MutationBatch::new(1))?;

    let host = async move {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                event = fs_rx.recv() => match event {
                    Some(Ok(event)) if touches(&event, &input) => {
                        match std::fs::read_to_string(&input) {
                            Ok(html) => {
                                page.borrow_mut().replace_document(&html);
                                debug!(kind = ?event.kind, "page reloaded");
                                if mutation_tx.send(MutationBatch::new(1)).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, "failed to reload page"),
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => warn!(error = %e, "file watcher error"),
                    None => break,
                },
                _ = &mut ctrl_c => {
                    info!("interrupted, shutting down");
                    break;
                }
            }
        }
        drop(watcher);
    };

    let (stats, ()) = tokio::join!(reconciler.run(mutation_rx), host);

    println!();
    println!("  Watch stopped.");
    println!("  Passes:   {}", stats.passes);
    println!("  Requests: {}", stats.requests);
    println!("  Failures: {}", stats.failures);
    println!("  Widgets:  {}", stats.widgets_rendered);
    println!();

    Ok(())
}

/// Resolve `out` against the filesystem and refuse the watched input itself,
/// since every write would trigger another reload.
fn resolve_watch_output(input: &Path, out: &Path) -> Result<PathBuf> {
    let name = out
        .file_name()
        .ok_or_else(|| eyre!("'{}' is not a file path", out.display()))?;
    let parent = match out.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let parent = std::fs::canonicalize(parent)
        .map_err(|e| eyre!("cannot resolve '{}': {e}", parent.display()))?;

    let joined = parent.join(name);
    let resolved = std::fs::canonicalize(&joined).unwrap_or(joined);
    if resolved == input {
        return Err(eyre!(
            "--out must differ from --input ('{}')",
            input.display()
        ));
    }
    Ok(resolved)
}

/// Whether `event` is a content change to `path`.
fn touches(event: &Event, path: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|p| p == path)
}

async fn cmd_relay() -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message: serde_json::Value = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "skipping malformed relay message");
                continue;
            }
        };
        if let Some(reply) = handle_message(&message) {
            println!("{}", serde_json::to_string(&reply)?);
        }
    }

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Pass observers
// ---------------------------------------------------------------------------

/// Spinner shown while a one-shot pass runs.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl PassObserver for CliProgress {
    fn pass_finished(&self, _outcome: &PassOutcome, _page: &HtmlPage) {
        self.spinner.finish_and_clear();
    }
}

/// Rewrites the output file after every pass.
struct OutputWriter {
    out: PathBuf,
}

impl PassObserver for OutputWriter {
    fn pass_finished(&self, outcome: &PassOutcome, page: &HtmlPage) {
        match write_page(&self.out, page) {
            Ok(()) => debug!(out = %self.out.display(), ?outcome, "annotated page written"),
            Err(e) => warn!(error = %e, "failed to write annotated page"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("coursefeedback-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::canonicalize(&dir).unwrap()
    }

    #[test]
    fn watch_output_may_not_be_the_input() {
        let dir = scratch_dir("same-output");
        let input = dir.join("page.html");
        std::fs::write(&input, "<html></html>").unwrap();

        let err = resolve_watch_output(&input, &dir.join(".").join("page.html")).unwrap_err();
        assert!(err.to_string().contains("--out must differ"));

        let out = resolve_watch_output(&input, &dir.join("annotated.html")).unwrap();
        assert_eq!(out, dir.join("annotated.html"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
