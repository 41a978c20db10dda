//! Fleet CLI entrypoint.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use fleet_planner::cli::{Cli, Commands, OutputFormatter, StateCommands};
use fleet_planner::config::{ConfigParser, ConfigValidator, Deployment, DeploymentManifest, SpecHasher, find_config_file};
use fleet_planner::error::Result;
use fleet_planner::network::IpRepo;
use fleet_planner::planner::DefaultInstanceRepository;
use fleet_planner::reconciler::{ReconcileSummary, Reconciler};
use fleet_planner::state::{DeploymentState, LocalStateStore, StateHistoryEntry, StateOperation, StateStore};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

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
        EnvFilter::new("info")
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
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings, &formatter),
        Commands::Plan {
            detailed,
            recreate,
            reserve,
        } => {
            let options = PlanOptions {
                detailed,
                recreate,
                reserve,
            };
            cmd_plan(cli.config.as_ref(), cli.state.as_ref(), options, &formatter).await
        }
        Commands::State { command } => cmd_state(cli.config.as_ref(), cli.state.as_ref(), command, &formatter).await,
    }
}

/// Flags of the `plan` command.
#[derive(Debug, Clone, Copy)]
struct PlanOptions {
    detailed: bool,
    recreate: bool,
    reserve: bool,
}

/// Validate the manifest.
fn cmd_validate(config_path: Option<&PathBuf>, warnings: bool, formatter: &OutputFormatter) -> Result<()> {
    let (manifest, _) = load_manifest(config_path)?;

    let validator = ConfigValidator::new();
    let result = validator.check(&manifest);
    emit(&formatter.format_validation(&result, warnings))?;

    validator.validate(&manifest)?;
    Ok(())
}

/// Compute the deployment plan.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    state_path: Option<&PathBuf>,
    options: PlanOptions,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (mut manifest, config_file) = load_manifest(config_path)?;
    ConfigValidator::new().validate(&manifest)?;
    if options.recreate {
        info!("Planning with recreate forced on");
        manifest.recreate = true;
    }

    let store = state_store(state_path, Some(&config_file))?;
    debug!("Using {} state at {}", store.backend_type(), store.state_path().display());
    let mut state = store
        .load()
        .await?
        .unwrap_or_else(|| DeploymentState::new(&manifest.name));
    if state.deployment != manifest.name {
        warn!(
            "State belongs to deployment '{}', planning '{}'",
            state.deployment, manifest.name
        );
    }

    let repo = Arc::new(state.ip_repo());
    let deployment = Deployment::from_manifest(&manifest, Arc::clone(&repo) as Arc<dyn IpRepo>)?;
    let manifest_hash = SpecHasher::new().hash_manifest(&manifest)?;
    let dns = state.dns_store();
    let repository = DefaultInstanceRepository::new();

    let plan = Reconciler::new(&deployment, &repository).plan(
        state.instances.clone(),
        &state.agent_states,
        &dns,
        &manifest_hash,
    )?;
    let summary = ReconcileSummary::new(&plan.instance_plans);
    debug!("{summary}");

    emit(&formatter.format_plan(&plan, &summary, options.detailed))?;

    if options.reserve {
        let resources: Vec<String> = plan
            .entries
            .iter()
            .flat_map(|entry| entry.networks.iter().map(move |n| format!("{} {n}", entry.instance)))
            .collect();

        state.set_ip_addresses(repo.records());
        state.spec_hash = Some(manifest_hash.clone());
        state.add_history(StateHistoryEntry::new(StateOperation::Reserve, &manifest_hash, resources));
        store.save(&state).await?;
        info!("Wrote {} reservations to {}", state.ip_addresses.len(), store.state_path().display());
    }

    Ok(())
}

/// Inspect the state file.
async fn cmd_state(
    config_path: Option<&PathBuf>,
    state_path: Option<&PathBuf>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config_file = match state_path {
        Some(_) => None,
        None => resolve_config_path(config_path).ok(),
    };
    let store = state_store(state_path, config_file.as_deref())?;

    match command {
        StateCommands::Show => {
            if !store.exists().await? {
                eprintln!("No state found at {}.", store.state_path().display());
                return Ok(());
            }
            if let Some(state) = store.load().await? {
                emit(&formatter.format_state(&state))?;
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the manifest path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads the manifest with `.env` and environment overrides applied.
fn load_manifest(config_path: Option<&PathBuf>) -> Result<(DeploymentManifest, PathBuf)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading manifest from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_dir(&config_file));
    parser.load_dotenv()?;

    let manifest = parser.load_with_env(&config_file)?;
    Ok((manifest, config_file))
}

/// Picks the state file: the explicit path, or `.fleet/` next to the manifest.
fn state_store(state_path: Option<&PathBuf>, config_file: Option<&Path>) -> Result<LocalStateStore> {
    match (state_path, config_file) {
        (Some(path), _) => Ok(LocalStateStore::with_state_path(path)),
        (None, Some(config)) => Ok(LocalStateStore::with_base_dir(config_dir(config).join(".fleet"))),
        (None, None) => LocalStateStore::new(),
    }
}

fn config_dir(config_file: &Path) -> &Path {
    config_file.parent().unwrap_or_else(|| Path::new("."))
}

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
