//! bsl-launcher - Entry Point
//!
//! Resolves the BSL Language Server runtime, reports the cache state, or
//! starts a server session for a one-off query.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lsp_types::{DocumentSymbol, DocumentSymbolResponse};
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use bsl_launcher::config::{self, BslSettings};
use bsl_launcher::deps::{
    CacheLayout, DependencyResolver, HttpFetcher, PlatformId, ReleaseResolver, UpdateStager,
    find_exec_jars,
};
use bsl_launcher::lsp::types::symbol_kind_to_string;
use bsl_launcher::lsp::{BslClient, LaunchSpec};

/// Installs, updates and launches BSL Language Server.
#[derive(Parser, Debug)]
#[command(name = "bsl-launcher")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Root of the dependency cache. Defaults to the user data directory.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// JSON settings file with `memory`, `jvm_options` and `version`.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// JVM heap cap, e.g. `8G`.
    #[arg(long, global = true)]
    memory: Option<String>,

    /// Extra JVM flags, whitespace separated.
    #[arg(long, global = true, allow_hyphen_values = true)]
    jvm_options: Option<String>,

    /// Pin the server version. Disables automatic updates.
    #[arg(long, global = true)]
    version_pin: Option<String>,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Make sure Java and the server JAR are installed and print the launch command.
    Resolve {
        /// Workspace root the server would be started in.
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,

        /// Wait for the update check instead of running it in the background.
        #[arg(long)]
        check_updates: bool,
    },
    /// Show the version ledger and cached artifacts.
    Status,
    /// Start the server and print the symbols of a module.
    Symbols {
        /// Workspace root.
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,

        /// BSL or OneScript file.
        file: PathBuf,
    },
}

impl Args {
    /// Parses the log level string into a tracing Level.
    fn parse_log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            other => anyhow::bail!("invalid log level: {other}"),
        }
    }

    /// Settings file merged with command-line overrides.
    fn settings(&self) -> Result<BslSettings> {
        let base = match &self.settings {
            Some(path) => BslSettings::load(path)?,
            None => BslSettings::default(),
        };
        Ok(base.merge(BslSettings {
            memory: self.memory.clone(),
            jvm_options: self.jvm_options.clone(),
            version: self.version_pin.clone(),
        }))
    }

    fn layout(&self) -> Result<CacheLayout> {
        let root = match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => config::default_cache_root()?,
        };
        Ok(CacheLayout::new(&root))
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(level: Level) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("bsl_launcher={level},async_lsp={level}"))
    });

    // stdout carries command output only
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false),
        )
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    Ok(())
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")
}

fn build_resolver(
    layout: CacheLayout,
    settings: &BslSettings,
    client: &reqwest::Client,
) -> DependencyResolver {
    DependencyResolver::new(
        layout,
        ReleaseResolver::github(client.clone()),
        Arc::new(HttpFetcher::new(client.clone())),
    )
    .pinned_version(settings.pinned_version())
}

fn canonical_workspace(workspace: &Path) -> Result<PathBuf> {
    workspace.canonicalize().with_context(|| {
        format!(
            "failed to canonicalize workspace path: {}",
            workspace.display()
        )
    })
}

async fn run_resolve(args: &Args, workspace: &Path, check_updates: bool) -> Result<()> {
    let settings = args.settings()?;
    let workspace = canonical_workspace(workspace)?;
    let client = http_client()?;
    let resolver =
        build_resolver(args.layout()?, &settings, &client).background_updates(!check_updates);

    let deps = resolver
        .resolve()
        .await
        .context("failed to resolve BSL Language Server dependencies")?;
    info!(version = ?deps.version, jar = %deps.jar_path.display(), "dependencies ready");

    if check_updates && settings.pinned_version().is_none() {
        UpdateStager::new(
            resolver.layout().clone(),
            ReleaseResolver::github(client.clone()),
            Arc::new(HttpFetcher::new(client)),
        )
        .check_and_stage(deps.version.as_deref())
        .await;
    }

    println!("{}", LaunchSpec::new(&deps, &settings, &workspace).display());
    Ok(())
}

fn run_status(args: &Args) -> Result<()> {
    let layout = args.layout()?;
    let info = layout.ledger().read();

    match PlatformId::current() {
        Ok(platform) => println!("platform:   {platform}"),
        Err(e) => println!("platform:   {e}"),
    }
    println!("cache:      {}", layout.deps_dir().display());
    println!("current:    {}", info.current.as_deref().unwrap_or("-"));
    println!("staged:     {}", info.staged.as_deref().unwrap_or("-"));
    println!("pinned:     {}", info.pinned.as_deref().unwrap_or("-"));
    println!("last check: {}", info.last_check.as_deref().unwrap_or("never"));
    for jar in find_exec_jars(layout.artifact_dir()) {
        println!("active jar: {}", jar.display());
    }
    for jar in find_exec_jars(&layout.staged_dir()) {
        println!("staged jar: {}", jar.display());
    }
    Ok(())
}

async fn run_symbols(args: &Args, workspace: &Path, file: &Path) -> Result<()> {
    let settings = args.settings()?;
    let workspace = canonical_workspace(workspace)?;
    let deps = build_resolver(args.layout()?, &settings, &http_client()?)
        .resolve()
        .await
        .context("failed to resolve BSL Language Server dependencies")?;

    let client = BslClient::builder(LaunchSpec::new(&deps, &settings, &workspace))
        .build()
        .await
        .context("failed to start BSL Language Server")?;

    let symbols = client.document_symbols(&workspace.join(file)).await;
    client.shutdown().await.context("failed to shut down server")?;

    match symbols.context("documentSymbol request failed")? {
        DocumentSymbolResponse::Nested(symbols) => print_nested(&symbols, 0),
        DocumentSymbolResponse::Flat(symbols) => {
            for symbol in symbols {
                println!(
                    "{} {} :{}",
                    symbol_kind_to_string(symbol.kind),
                    symbol.name,
                    symbol.location.range.start.line + 1
                );
            }
        }
    }
    Ok(())
}

fn print_nested(symbols: &[DocumentSymbol], depth: usize) {
    for symbol in symbols {
        println!(
            "{}{} {} :{}",
            "  ".repeat(depth),
            symbol_kind_to_string(symbol.kind),
            symbol.name,
            symbol.range.start.line + 1
        );
        if let Some(children) = &symbol.children {
            print_nested(children, depth + 1);
        }
    }
}

/// Main entry point.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.parse_log_level()?)?;

    match &args.command {
        Command::Resolve {
            workspace,
            check_updates,
        } => run_resolve(&args, workspace, *check_updates).await,
        Command::Status => run_status(&args),
        Command::Symbols { workspace, file } => run_symbols(&args, workspace, file).await,
    }
}
