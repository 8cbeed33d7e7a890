//! Stepline - sequential CI workflow runner
//!
//! The `stepline` command runs a workflow against a workspace and records
//! each run into a local ledger.
//!
//! ## Commands
//!
//! - `run`: Run the workflow for a push / pull-request event
//! - `validate`: Parse a workflow file and list its steps
//! - `init`: Write the default Rust workflow
//! - `runs`: List or show recorded runs
//! - `gate`: Re-evaluate a recorded run

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn, Level};

use stepline_core::report::{render_outcome, render_verdict};
use stepline_core::{
    git, obs, EventKind, Gate, Pipeline, PipelineOutcome, PipelineStatus, ProcessExecutor,
    RunIdentity, TriggerEvent, Workflow, DEFAULT_BRANCH, DEFAULT_WORKFLOW_FILE,
};
use stepline_state::{FsRunLedger, RunId, RunLedger, RunRecord};

/// Ledger location relative to the workspace.
const DEFAULT_LEDGER_DIR: &str = ".stepline/runs";

/// Placeholder recorded when git or rustup can't be queried.
const UNKNOWN: &str = "unknown";

#[derive(Parser)]
#[command(name = "stepline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sequential CI workflow runner", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the workflow and record the run
    Run(RunArgs),

    /// Parse and validate a workflow file
    Validate {
        /// Workflow file (default: ./stepline.toml)
        #[arg(short, long, env = "STEPLINE_WORKFLOW")]
        workflow: Option<PathBuf>,
    },

    /// Write the default Rust workflow
    Init {
        /// Branch that triggers the workflow
        #[arg(short, long, default_value = DEFAULT_BRANCH)]
        branch: String,

        /// Output path
        #[arg(short, long, default_value = DEFAULT_WORKFLOW_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Inspect recorded runs
    Runs {
        /// Workspace whose default ledger is read
        #[arg(short, long, default_value = ".", env = "STEPLINE_WORKSPACE")]
        workspace: PathBuf,

        /// Ledger directory (default: <workspace>/.stepline/runs)
        #[arg(long, env = "STEPLINE_LEDGER_DIR")]
        ledger_dir: Option<PathBuf>,

        #[command(subcommand)]
        action: RunsAction,
    },

    /// Re-evaluate the gate over a recorded run
    Gate {
        /// Run ID
        run_id: String,

        /// Workspace whose default ledger is read
        #[arg(short, long, default_value = ".", env = "STEPLINE_WORKSPACE")]
        workspace: PathBuf,

        /// Ledger directory (default: <workspace>/.stepline/runs)
        #[arg(long, env = "STEPLINE_LEDGER_DIR")]
        ledger_dir: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Workflow file (default: <workspace>/stepline.toml, or the built-in
    /// Rust workflow when that file doesn't exist)
    #[arg(short = 'f', long, env = "STEPLINE_WORKFLOW")]
    workflow: Option<PathBuf>,

    /// Workspace path
    #[arg(short, long, default_value = ".", env = "STEPLINE_WORKSPACE")]
    workspace: PathBuf,

    /// Event that triggered the run (push or pull-request)
    #[arg(short, long, default_value = "push")]
    event: EventKind,

    /// Pushed branch, or the base branch of the pull request
    /// (default: the workspace's current branch)
    #[arg(short, long)]
    branch: Option<String>,

    /// Commit to check out (default: stay on the branch; HEAD is recorded)
    #[arg(short, long)]
    commit: Option<String>,

    /// Ledger directory (default: <workspace>/.stepline/runs)
    #[arg(long, env = "STEPLINE_LEDGER_DIR")]
    ledger_dir: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum RunsAction {
    /// List recorded runs, oldest first
    List {
        /// Emit JSON instead of a table
        #[arg(long)]
        json_output: bool,
    },

    /// Show one run and its events as JSON
    Show {
        /// Run ID
        run_id: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    stepline_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => cmd_run(&args).await,
        Commands::Validate { workflow } => cmd_validate(workflow.as_deref()),
        Commands::Init {
            branch,
            path,
            force,
        } => cmd_init(&branch, &path, force),
        Commands::Runs {
            workspace,
            ledger_dir,
            action,
        } => {
            let ledger = open_ledger(ledger_dir.as_deref(), &workspace)?;
            match action {
                RunsAction::List { json_output } => cmd_runs_list(&ledger, json_output).await,
                RunsAction::Show { run_id } => cmd_runs_show(&ledger, &run_id).await,
            }
        }
        Commands::Gate {
            run_id,
            workspace,
            ledger_dir,
        } => {
            let ledger = open_ledger(ledger_dir.as_deref(), &workspace)?;
            cmd_gate(&ledger, &run_id).await
        }
    }
}

fn open_ledger(ledger_dir: Option<&Path>, workspace: &Path) -> Result<FsRunLedger> {
    let dir = ledger_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| workspace.join(DEFAULT_LEDGER_DIR));
    debug!(ledger_dir = %dir.display(), "Opening run ledger");
    FsRunLedger::open(&dir)
        .with_context(|| format!("Failed to open run ledger at {}", dir.display()))
}

/// Resolve the workflow for a workspace.
fn resolve_workflow(explicit: Option<&Path>, workspace: &Path) -> Result<Workflow> {
    if let Some(path) = explicit {
        return Workflow::load(path)
            .with_context(|| format!("Failed to load workflow {}", path.display()));
    }

    let path = workspace.join(DEFAULT_WORKFLOW_FILE);
    if path.exists() {
        Workflow::load(&path).with_context(|| format!("Failed to load workflow {}", path.display()))
    } else {
        info!(
            "No {} in workspace, using the built-in Rust workflow",
            DEFAULT_WORKFLOW_FILE
        );
        Ok(Workflow::rust_default(DEFAULT_BRANCH))
    }
}

/// Run the workflow and return its outcome without printing it.
async fn execute_run(args: &RunArgs) -> Result<(PipelineOutcome, Arc<FsRunLedger>, Workflow)> {
    let workspace = args
        .workspace
        .canonicalize()
        .with_context(|| format!("Workspace {} not found", args.workspace.display()))?;
    let workflow = resolve_workflow(args.workflow.as_deref(), &workspace)?;

    let branch = match &args.branch {
        Some(branch) => branch.clone(),
        None => {
            if !git::is_git_repo(&workspace) {
                anyhow::bail!(
                    "{} is not a git work tree; pass --branch",
                    workspace.display()
                );
            }
            git::current_branch(&workspace)
                .context("Could not detect the current branch; pass --branch")?
        }
    };

    // Only an explicit commit pins the checkout; otherwise HEAD is recorded.
    let mut event = TriggerEvent::new(args.event, branch);
    if let Some(sha) = &args.commit {
        event = event.with_commit(sha.clone());
    }
    let commit = args
        .commit
        .clone()
        .or_else(|| git::capture_head_sha(&workspace).ok());

    let toolchain = git::active_toolchain(&workspace).unwrap_or_else(|| {
        warn!("Could not determine the active toolchain");
        UNKNOWN.to_string()
    });
    let identity = RunIdentity::new(
        workspace.clone(),
        &workflow,
        commit.unwrap_or_else(|| UNKNOWN.to_string()),
        toolchain,
    );

    let ledger = Arc::new(open_ledger(args.ledger_dir.as_deref(), &workspace)?);
    let outcome = Pipeline::run(
        ledger.clone(),
        &ProcessExecutor,
        &workflow,
        &event,
        &identity,
    )
    .await
    .context("Pipeline failed to run")?;

    Ok((outcome, ledger, workflow))
}

async fn cmd_run(args: &RunArgs) -> Result<()> {
    let (outcome, ledger, workflow) = execute_run(args).await?;

    if outcome.status == PipelineStatus::NotTriggered {
        match args.output {
            OutputFormat::Text => print!("{}", render_outcome(&outcome)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        }
        return Ok(());
    }

    let run_id = outcome
        .run_id
        .clone()
        .context("Triggered run has no run ID")?;
    let events = ledger.get_events(&RunId(run_id.clone())).await?;
    let verdict = Gate::evaluate(&events, &workflow.step_names());
    obs::emit_gate_evaluated(&run_id, verdict.violations.len(), verdict.passed);

    match args.output {
        OutputFormat::Text => {
            print!("{}", render_outcome(&outcome));
            print!("{}", render_verdict(&verdict));
        }
        OutputFormat::Json => {
            let report = serde_json::json!({ "outcome": outcome, "gate": verdict });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    if outcome.success() && verdict.passed {
        if args.output == OutputFormat::Text {
            println!("\n✓ All steps passed!");
        }
        Ok(())
    } else {
        anyhow::bail!("Workflow '{}' failed", outcome.workflow)
    }
}

fn cmd_validate(workflow: Option<&Path>) -> Result<()> {
    let path = workflow
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKFLOW_FILE));
    let workflow = Workflow::load(&path)
        .with_context(|| format!("Invalid workflow {}", path.display()))?;

    println!("Workflow: {}", workflow.name);
    println!("Push branches: {}", workflow.on.push.join(", "));
    println!("Pull request branches: {}", workflow.on.pull_request.join(", "));
    println!("Steps:");
    for (index, step) in workflow.steps.iter().enumerate() {
        let command = step.resolve_command(&TriggerEvent::push(DEFAULT_BRANCH));
        let disabled = if step.enabled { "" } else { " (disabled)" };
        println!(
            "  {}. {}{}: {} [timeout {}s]",
            index + 1,
            step.name,
            disabled,
            command.join(" "),
            step.timeout_secs
        );
    }
    println!("\n✓ {} is valid", path.display());
    Ok(())
}

fn cmd_init(branch: &str, path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let workflow = Workflow::rust_default(branch);
    let toml = workflow.to_toml_string()?;
    std::fs::write(path, toml).with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = %path.display(), branch = %branch, "Wrote default workflow");
    println!("✓ Wrote {} (triggers on {})", path.display(), branch);
    Ok(())
}

#[derive(Serialize)]
struct RunRow {
    run_id: String,
    status: String,
    workflow: String,
    trigger: String,
    created_at: String,
    success: Option<bool>,
}

impl From<&RunRecord> for RunRow {
    fn from(run: &RunRecord) -> Self {
        Self {
            run_id: run.run_id.to_string(),
            status: format!("{:?}", run.status).to_lowercase(),
            workflow: run.metadata.workflow_name.clone(),
            trigger: run.metadata.trigger.clone(),
            created_at: run.created_at.to_rfc3339(),
            success: run.summary.as_ref().map(|s| s.success),
        }
    }
}

async fn cmd_runs_list(ledger: &dyn RunLedger, json_output: bool) -> Result<()> {
    let runs = ledger.list_runs(None).await?;
    let rows: Vec<RunRow> = runs.iter().map(RunRow::from).collect();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }
    for row in &rows {
        println!(
            "{}  {:<9}  {}  {}  {}",
            row.run_id, row.status, row.workflow, row.trigger, row.created_at
        );
    }
    Ok(())
}

async fn cmd_runs_show(ledger: &dyn RunLedger, run_id: &str) -> Result<()> {
    let run_id = RunId(run_id.to_string());
    let run = ledger
        .get_run(&run_id)
        .await
        .with_context(|| format!("Run {} not found", run_id))?;
    let events = ledger.get_events(&run_id).await?;

    let report = serde_json::json!({ "run": run, "events": events });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_gate(ledger: &dyn RunLedger, run_id: &str) -> Result<()> {
    let run_id = RunId(run_id.to_string());
    let run = ledger
        .get_run(&run_id)
        .await
        .with_context(|| format!("Run {} not found", run_id))?;
    let events = ledger.get_events(&run_id).await?;

    let expected: Vec<String> = serde_json::from_value(run.metadata.tags["steps"].clone())
        .unwrap_or_default();
    let verdict = Gate::evaluate(&events, &expected);
    obs::emit_gate_evaluated(&run_id.to_string(), verdict.violations.len(), verdict.passed);

    print!("{}", render_verdict(&verdict));
    if verdict.passed {
        Ok(())
    } else {
        anyhow::bail!("{}", verdict.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepline_core::StepConfig;

    fn write_workflow(dir: &Path, steps: Vec<StepConfig>) -> PathBuf {
        let mut workflow = Workflow::rust_default("main");
        workflow.name = "local".to_string();
        workflow.steps = steps;
        let path = dir.join(DEFAULT_WORKFLOW_FILE);
        std::fs::write(&path, workflow.to_toml_string().unwrap()).unwrap();
        path
    }

    fn run_args(workspace: &Path, branch: &str) -> RunArgs {
        RunArgs {
            workflow: None,
            workspace: workspace.to_path_buf(),
            event: EventKind::Push,
            branch: Some(branch.to_string()),
            commit: None,
            ledger_dir: Some(workspace.join("ledger")),
            output: OutputFormat::Text,
        }
    }

    fn run_git(repo: &Path, args: &[&str]) -> String {
        let output = std::process::Command::new("git")
            .args(args)
            .current_dir(repo)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["checkout", "-b", "main"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "stepline",
            "run",
            "--event",
            "pull-request",
            "--branch",
            "main",
            "--output",
            "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.event, EventKind::PullRequest);
                assert_eq!(args.branch.as_deref(), Some("main"));
                assert_eq!(args.output, OutputFormat::Json);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_init_writes_loadable_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stepline.toml");

        cmd_init("develop", &path, false).unwrap();
        let workflow = Workflow::load(&path).unwrap();
        assert_eq!(workflow, Workflow::rust_default("develop"));

        assert!(cmd_init("develop", &path, false).is_err());
        assert!(cmd_init("main", &path, true).is_ok());
    }

    #[tokio::test]
    async fn test_run_records_into_ledger() {
        let dir = tempfile::tempdir().unwrap();
        write_workflow(
            dir.path(),
            vec![
                StepConfig::run("hello", ["echo", "hello"]),
                StepConfig::run("world", ["echo", "world"]),
            ],
        );
        let args = run_args(dir.path(), "main");

        let (outcome, ledger, _) = execute_run(&args).await.unwrap();
        assert!(outcome.success());
        assert_eq!(ledger.list_runs(None).await.unwrap().len(), 1);

        let run_id = outcome.run_id.unwrap();
        assert!(cmd_gate(&*ledger, &run_id).await.is_ok());
        assert!(cmd_runs_show(&*ledger, &run_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_run_exits_with_error() {
        let dir = tempfile::tempdir().unwrap();
        write_workflow(
            dir.path(),
            vec![
                StepConfig::run("broken", ["false"]),
                StepConfig::run("never", ["echo", "never"]),
            ],
        );

        let result = cmd_run(&run_args(dir.path(), "main")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_other_branch_is_not_triggered() {
        let dir = tempfile::tempdir().unwrap();
        write_workflow(dir.path(), vec![StepConfig::run("broken", ["false"])]);
        let args = run_args(dir.path(), "feature/x");

        assert!(cmd_run(&args).await.is_ok());
        let ledger = open_ledger(args.ledger_dir.as_deref(), dir.path()).unwrap();
        assert!(ledger.list_runs(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_keeps_branch_across_runs() {
        let repo = make_git_repo();
        write_workflow(
            repo.path(),
            vec![
                StepConfig::checkout(),
                StepConfig::run("hello", ["echo", "hello"]),
            ],
        );
        let mut args = run_args(repo.path(), "main");
        args.branch = None;

        for _ in 0..2 {
            let (outcome, _, _) = execute_run(&args).await.unwrap();
            assert_eq!(outcome.status, PipelineStatus::Succeeded);
            assert_eq!(run_git(repo.path(), &["rev-parse", "--abbrev-ref", "HEAD"]), "main");
        }

        let ledger = open_ledger(args.ledger_dir.as_deref(), repo.path()).unwrap();
        let runs = ledger.list_runs(None).await.unwrap();
        assert_eq!(runs.len(), 2);
        let head = run_git(repo.path(), &["rev-parse", "HEAD"]);
        assert!(runs
            .iter()
            .all(|r| r.metadata.git_sha.as_deref() == Some(head.as_str())));
    }

    #[tokio::test]
    async fn test_detached_head_requires_branch() {
        let repo = make_git_repo();
        write_workflow(repo.path(), vec![StepConfig::run("hello", ["echo", "hello"])]);
        run_git(repo.path(), &["checkout", "--detach"]);

        let mut args = run_args(repo.path(), "main");
        args.branch = None;
        let err = execute_run(&args).await.unwrap_err();
        assert!(format!("{:#}", err).contains("pass --branch"));

        let ledger = open_ledger(args.ledger_dir.as_deref(), repo.path()).unwrap();
        assert!(ledger.list_runs(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_repo_requires_branch() {
        let dir = tempfile::tempdir().unwrap();
        write_workflow(dir.path(), vec![StepConfig::run("hello", ["echo", "hello"])]);
        let mut args = run_args(dir.path(), "main");
        args.branch = None;

        let err = execute_run(&args).await.unwrap_err();
        assert!(err.to_string().contains("not a git work tree"));
    }

    #[tokio::test]
    async fn test_runs_and_gate_use_workspace_ledger() {
        let dir = tempfile::tempdir().unwrap();
        write_workflow(dir.path(), vec![StepConfig::run("hello", ["echo", "hello"])]);
        let mut args = run_args(dir.path(), "main");
        args.ledger_dir = None;
        let (outcome, _, _) = execute_run(&args).await.unwrap();
        let run_id = outcome.run_id.unwrap();

        let workspace = dir.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(["stepline", "gate", &run_id, "--workspace", &workspace])
            .unwrap();
        let Commands::Gate {
            run_id: parsed,
            workspace,
            ledger_dir,
        } = cli.command
        else {
            panic!("expected gate command");
        };
        let ledger = open_ledger(ledger_dir.as_deref(), &workspace).unwrap();
        assert!(cmd_gate(&ledger, &parsed).await.is_ok());
        assert_eq!(ledger.list_runs(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_id_outside_ledger_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FsRunLedger::open(dir.path().join("runs")).unwrap();
        assert!(cmd_runs_show(&ledger, "../runs").await.is_err());
        assert!(cmd_gate(&ledger, "../../etc").await.is_err());
    }

    #[tokio::test]
    async fn test_gate_unknown_run() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FsRunLedger::open(dir.path()).unwrap();
        assert!(cmd_gate(&ledger, "missing").await.is_err());
    }
}
