//! Stackform CLI entrypoint.
//!
//! This is the main entrypoint for the stackform command-line tool.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use stackform::cli::{Cli, Commands, OutputFormatter, StateCommands};
use stackform::document::{find_document_file, DocumentParser, StackDocument};
use stackform::engine::Engine;
use stackform::error::{DocumentError, Result, StackformError};
use stackform::executor::RunStatus;
use stackform::graph::GraphBuilder;
use stackform::provider::HttpProvider;
use stackform::state::StateStore;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Environment variable for the provider endpoint.
const ENDPOINT_ENV: &str = "STACKFORM_ENDPOINT";

/// Default environment variable holding the provider API token.
const DEFAULT_TOKEN_ENV: &str = "STACKFORM_API_TOKEN";

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Load .env if present
    dotenvy::dotenv().ok();

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate => cmd_validate(cli.config.as_ref()),
        Commands::Plan { detailed } => cmd_plan(cli.config.as_ref(), detailed, &formatter).await,
        Commands::Apply { yes, concurrency } => {
            cmd_apply(cli.config.as_ref(), yes, concurrency, &formatter).await
        }
        Commands::Destroy { yes, concurrency } => {
            cmd_destroy(cli.config.as_ref(), yes, concurrency, &formatter).await
        }
        Commands::State { command } => cmd_state(cli.config.as_ref(), command, &formatter).await,
    }
}

/// Initialize a new project.
fn cmd_init(path: &PathBuf, force: bool) -> Result<()> {
    info!("Initializing new stack project in: {}", path.display());

    let document_path = path.join("stack.yaml");
    let gitignore_path = path.join(".gitignore");

    if !force && document_path.exists() {
        eprintln!("Stack document already exists: {}", document_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    let document_template = include_str!("../templates/stack.yaml");
    std::fs::write(&document_path, document_template)?;
    eprintln!("Created: {}", document_path.display());

    let gitignore_content = ".env\n.stackform/\n";
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        if !existing.contains(".stackform") {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n.stackform/")?;
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, gitignore_content)?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Edit stack.yaml with your resource declarations");
    eprintln!("  2. Set {DEFAULT_TOKEN_ENV} (and optionally {ENDPOINT_ENV})");
    eprintln!("  3. Run 'stackform validate' to check the document");
    eprintln!("  4. Run 'stackform plan' to see what would change");
    eprintln!("  5. Run 'stackform apply' to provision the stack");

    Ok(())
}

/// Validate the stack document and its graph.
fn cmd_validate(config_path: Option<&PathBuf>) -> Result<()> {
    let document = load_document(config_path)?;
    let graph = GraphBuilder::new().build(&document)?;

    eprintln!("Stack document is valid!");
    eprintln!("\nStack summary:");
    eprintln!("  Name: {}", document.stack.name);
    eprintln!("  Environment: {}", document.stack.environment);
    eprintln!("  Resources: {}", graph.len());
    for node in graph.nodes() {
        if node.depends_on.is_empty() {
            eprintln!("    {} ({})", node.id, node.kind);
        } else {
            eprintln!(
                "    {} ({}) <- {}",
                node.id,
                node.kind,
                node.depends_on.join(", ")
            );
        }
    }

    Ok(())
}

/// Show the execution plan.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let engine = build_engine(config_path, None)?;
    let plan = engine.plan().await?;

    eprintln!("{}", formatter.format_plan(&plan, detailed));
    Ok(())
}

/// Apply the execution plan.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    concurrency: usize,
    formatter: &OutputFormatter,
) -> Result<()> {
    let engine = build_engine(config_path, Some(concurrency))?;
    let plan = engine.plan().await?;

    eprintln!("{}", formatter.format_plan(&plan, false));

    if plan.is_converged() {
        return Ok(());
    }

    if !auto_approve && !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    cancel_on_ctrl_c(&engine);
    let report = engine.apply().await?;
    eprintln!("{}", formatter.format_report(&report));
    exit_status(report.status)
}

/// Destroy every resource recorded in state.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    concurrency: usize,
    formatter: &OutputFormatter,
) -> Result<()> {
    let engine = build_engine(config_path, Some(concurrency))?;
    let plan = engine.plan_destroy().await?;

    if plan.is_converged() {
        eprintln!("Nothing to destroy.");
        return Ok(());
    }

    eprintln!("{}", formatter.format_plan(&plan, false));

    if !auto_approve
        && !confirm(
            "\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ",
            "destroy",
        )?
    {
        eprintln!("Destruction cancelled.");
        return Ok(());
    }

    cancel_on_ctrl_c(&engine);
    let report = engine.destroy().await?;
    eprintln!("{}", formatter.format_report(&report));
    exit_status(report.status)
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&PathBuf>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let document = load_document(config_path)?;
    let store = Engine::store_for(&document)?;

    match command {
        StateCommands::Show => {
            if let Some(snapshot) = store.load().await? {
                eprintln!("{}", formatter.format_state(&snapshot));
            } else {
                eprintln!("No state found.");
            }
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                if let Some(lock_info) = store.get_lock_info().await? {
                    store.release_lock(&lock_info.lock_id).await?;
                    eprintln!("State forcefully unlocked.");
                } else {
                    eprintln!("State is not locked.");
                }
            } else if let Some(id) = lock_id {
                store.release_lock(&id).await?;
                eprintln!("State unlocked.");
            } else {
                eprintln!("Please provide --lock-id or use --force");
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves and loads the stack document.
fn load_document(config_path: Option<&PathBuf>) -> Result<StackDocument> {
    let document_file = match config_path {
        Some(path) => path.clone(),
        None => find_document_file(".").ok_or_else(|| {
            StackformError::Document(DocumentError::FileNotFound {
                path: PathBuf::from("stack.yaml"),
            })
        })?,
    };
    debug!("Loading stack document from: {}", document_file.display());

    DocumentParser::new().load_file(&document_file)
}

/// Builds an engine from the stack document and environment.
fn build_engine(config_path: Option<&PathBuf>, concurrency: Option<usize>) -> Result<Engine> {
    let document = load_document(config_path)?;
    let store = Engine::store_for(&document)?;
    let provider = create_provider(&document)?;

    let mut engine = Engine::new(document, Arc::new(provider), store);
    if let Some(concurrency) = concurrency {
        engine = engine.with_concurrency(concurrency);
    }
    Ok(engine)
}

/// Creates the HTTP provider from document and environment configuration.
fn create_provider(document: &StackDocument) -> Result<HttpProvider> {
    let provider_config = document.provider.as_ref();

    let endpoint = provider_config
        .and_then(|p| p.endpoint.clone())
        .or_else(|| std::env::var(ENDPOINT_ENV).ok())
        .ok_or_else(|| {
            StackformError::Document(DocumentError::validation(
                format!("No provider endpoint configured (set provider.endpoint or {ENDPOINT_ENV})"),
                "provider.endpoint",
            ))
        })?;

    let token_env = provider_config
        .and_then(|p| p.token_env.as_deref())
        .unwrap_or(DEFAULT_TOKEN_ENV);
    let token = std::env::var(token_env).map_err(|_| {
        StackformError::Document(DocumentError::MissingEnvVar {
            name: token_env.to_string(),
        })
    })?;

    HttpProvider::new(&endpoint, &token)
}

/// Prompts on stderr and reads one line from stdin.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Requests cancellation on Ctrl-C; in-flight operations still finish.
fn cancel_on_ctrl_c(engine: &Engine) {
    let cancel = engine.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancellation requested - waiting for in-flight operations...");
            cancel.cancel();
        }
    });
}

/// Maps the run status to the process result.
fn exit_status(status: RunStatus) -> Result<()> {
    match status {
        RunStatus::Succeeded => Ok(()),
        RunStatus::PartialFailure => Err(StackformError::internal(
            "some operations failed - state reflects the completed ones, re-run to continue",
        )),
        RunStatus::Failed => Err(StackformError::internal("no operation completed")),
    }
}
