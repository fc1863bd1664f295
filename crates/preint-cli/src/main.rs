//! Pretested Integration CLI
//!
//! The `preint` command integrates a verified branch of a local git clone
//! into its integration branch, one run per invocation.
//!
//! ## Commands
//!
//! - `integrate`: Run one integration for a triggered branch
//! - `audit`: List recorded audit records
//! - `strategies`: List available integration strategies

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

use preint_core::{
    AuditLog, AuditRecord, BuildResult, BuildRun, Environment, GitCli, GitClient,
    IntegrationConfig, IntegrationOrchestrator, IntegrationReport, LocalRun, RemoteConfig,
    Revision, StrategyRegistry, TriggeredChange,
};

#[derive(Parser)]
#[command(name = "preint")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pretested integration of verified branches", long_about = None)]
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
    /// Integrate a triggered branch into the integration branch
    ///
    /// Exit code 0 when integrated, 2 when there was nothing to do, 1 on failure.
    Integrate(IntegrateArgs),

    /// List recorded audit records (a JSON array with --json)
    Audit {
        /// JSON Lines audit log written by `integrate --audit-log`
        #[arg(long)]
        audit_log: PathBuf,
    },

    /// List available integration strategies
    Strategies,
}

#[derive(Args, Debug, Clone, Default)]
struct IntegrateArgs {
    /// Local clone to integrate in
    #[arg(long, default_value = ".")]
    repo_dir: PathBuf,

    /// Triggered branch, remote-qualified (e.g. origin/feature/x)
    #[arg(long)]
    branch: String,

    /// Tip of the triggered change (default: resolved from --branch after fetching)
    #[arg(long)]
    revision: Option<String>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Integration branch (overrides the config file)
    #[arg(long, env = "PREINT_INTEGRATION_BRANCH")]
    integration_branch: Option<String>,

    /// Integration repository, i.e. remote name (overrides the config file)
    #[arg(long, env = "PREINT_REPOSITORY")]
    repository: Option<String>,

    /// Integration strategy (overrides the config file)
    #[arg(long, env = "PREINT_STRATEGY")]
    strategy: Option<String>,

    /// Append the run's audit record to this JSON Lines file
    #[arg(long)]
    audit_log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    preint_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Integrate(args) => {
            let result = cmd_integrate(&args, Environment::from_process(), cli.verbose).await?;
            Ok(ExitCode::from(result.exit_code() as u8))
        }
        Commands::Audit { audit_log } => {
            cmd_audit(&audit_log, cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Strategies => {
            cmd_strategies();
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Merge the config file (if any) with command-line overrides.
fn build_config(args: &IntegrateArgs) -> Result<IntegrationConfig> {
    let mut config = match &args.config {
        Some(path) => IntegrationConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => IntegrationConfig::default(),
    };
    if let Some(branch) = &args.integration_branch {
        config.integration_branch = branch.clone();
    }
    if let Some(repository) = &args.repository {
        config.repository_name = repository.clone();
    }
    if let Some(strategy) = &args.strategy {
        config.strategy.name = strategy.clone();
    }
    Ok(config)
}

/// Run one integration and print its console output and resulting revision.
///
/// `environment` resolves placeholders in the configuration; with `echo`
/// console lines are also logged as the run progresses.
async fn cmd_integrate(
    args: &IntegrateArgs,
    environment: Environment,
    echo: bool,
) -> Result<BuildResult> {
    let git = GitCli::new(&args.repo_dir);
    let mut config = build_config(args)?;

    if config.remotes.is_empty() {
        let remotes = git
            .remotes()
            .await
            .with_context(|| format!("Failed to list remotes in {}", args.repo_dir.display()))?;
        for name in remotes {
            config = config.with_remote(RemoteConfig::named(name));
        }
    }

    let revision = match &args.revision {
        Some(rev) => Revision::new(rev.clone()),
        None => resolve_triggered_revision(&git, &config, &environment, &args.branch).await?,
    };
    let change = TriggeredChange::new(args.branch.clone(), revision);

    let registry = StrategyRegistry::with_defaults();
    let mut orchestrator =
        IntegrationOrchestrator::from_registry(config, &registry, Arc::new(git))
            .context("Failed to configure integration")?;
    if let Some(path) = &args.audit_log {
        orchestrator = orchestrator.with_audit_log(AuditLog::new(path));
    }
    info!(
        branch = %args.branch,
        strategy = orchestrator.strategy_name(),
        "integrating"
    );

    let mut run = LocalRun::new(environment);
    if echo {
        run = run.with_echo();
    }
    let report = orchestrator.decorate_revision_to_build(&mut run, &change).await;
    print_report(&run, &report);
    Ok(run.result().unwrap_or(BuildResult::Failure))
}

async fn resolve_triggered_revision(
    git: &GitCli,
    config: &IntegrationConfig,
    environment: &Environment,
    branch: &str,
) -> Result<Revision> {
    let repository = environment.expand(config.repository_name.trim());
    let branch = environment.expand(branch.trim());
    git.fetch(&repository)
        .await
        .with_context(|| format!("Failed to fetch {repository}"))?;
    git.rev_parse(&branch)
        .await
        .with_context(|| format!("Failed to resolve {branch}"))
}

fn print_report(run: &LocalRun, report: &IntegrationReport) {
    for line in run.console_lines() {
        println!("{line}");
    }
    println!("{}", report.resulting_revision);
}

#[derive(Serialize)]
struct AuditRow<'a> {
    digest: String,
    #[serde(flatten)]
    record: &'a AuditRecord,
}

/// List audit records, oldest first.
fn cmd_audit(path: &Path, as_json: bool) -> Result<()> {
    let records = AuditLog::new(path)
        .read_all()
        .with_context(|| format!("Failed to read audit log {}", path.display()))?;

    if as_json {
        let rows = records
            .iter()
            .map(|record| {
                Ok(AuditRow {
                    digest: record.digest()?,
                    record,
                })
            })
            .collect::<preint_core::Result<Vec<_>>>()?;
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No audit records in {}", path.display());
        return Ok(());
    }
    for record in &records {
        println!("{}", format_record(record)?);
    }
    Ok(())
}

fn format_record(record: &AuditRecord) -> Result<String> {
    let digest = record.digest()?;
    Ok(format!(
        "{} {} {:<27} {} -> {}/{} credentials={} digest={}",
        record.recorded_at().to_rfc3339(),
        record.run_id(),
        record.outcome(),
        record.triggered_branch(),
        record.repository_name(),
        record.integration_branch(),
        record.credentials_id().unwrap_or("-"),
        &digest[..12]
    ))
}

fn cmd_strategies() {
    for name in StrategyRegistry::with_defaults().names() {
        println!("{name}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
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

    /// Bare remote with master and feature/x, plus a work clone. Returns
    /// (tempdir, remote path, work path).
    fn setup_repos() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let remote = root.path().join("remote.git");
        std::fs::create_dir(&remote).unwrap();
        git(&remote, &["init", "-q", "--bare"]);
        git(&remote, &["symbolic-ref", "HEAD", "refs/heads/master"]);

        let seed = root.path().join("seed");
        git(root.path(), &["clone", "-q", remote.to_str().unwrap(), "seed"]);
        git(&seed, &["symbolic-ref", "HEAD", "refs/heads/master"]);
        git(&seed, &["config", "user.name", "dev"]);
        git(&seed, &["config", "user.email", "dev@example.com"]);
        std::fs::write(seed.join("README"), "base\n").unwrap();
        git(&seed, &["add", "README"]);
        git(&seed, &["commit", "-q", "-m", "initial"]);
        git(&seed, &["push", "-q", "origin", "master"]);
        git(&seed, &["checkout", "-q", "-b", "feature/x"]);
        std::fs::write(seed.join("a.txt"), "a\n").unwrap();
        git(&seed, &["add", "a.txt"]);
        git(&seed, &["commit", "-q", "-m", "add a"]);
        git(&seed, &["push", "-q", "origin", "feature/x"]);

        git(root.path(), &["clone", "-q", remote.to_str().unwrap(), "work"]);
        let work = root.path().join("work");
        git(&work, &["config", "user.name", "integrator"]);
        git(&work, &["config", "user.email", "integrator@example.com"]);
        (root, remote, work)
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preint.json");
        std::fs::write(
            &path,
            r#"{"integration_branch": "develop", "strategy": {"name": "accumulated"},
                "remotes": [{"name": "origin", "credentials_id": "bot"}]}"#,
        )
        .unwrap();

        let args = IntegrateArgs {
            config: Some(path),
            strategy: Some("squash".to_string()),
            ..IntegrateArgs::default()
        };
        let config = build_config(&args).unwrap();
        assert_eq!(config.integration_branch, "develop");
        assert_eq!(config.strategy.name, "squash");
        assert_eq!(config.credentials_for("origin").as_deref(), Some("bot"));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let args = IntegrateArgs {
            config: Some(PathBuf::from("/nonexistent/preint.json")),
            ..IntegrateArgs::default()
        };
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn cli_parses_integrate_flags() {
        let cli = Cli::try_parse_from([
            "preint",
            "--verbose",
            "integrate",
            "--repo-dir",
            "/tmp/work",
            "--branch",
            "origin/feature/x",
            "--strategy",
            "accumulated",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Integrate(args) => {
                assert_eq!(args.branch, "origin/feature/x");
                assert_eq!(args.strategy.as_deref(), Some("accumulated"));
            }
            _ => panic!("expected integrate"),
        }
    }

    #[tokio::test]
    async fn integrate_squashes_and_records_audit() {
        let (root, remote, work) = setup_repos();
        let audit_path = root.path().join("audit.jsonl");
        let args = IntegrateArgs {
            repo_dir: work,
            branch: "origin/feature/x".to_string(),
            audit_log: Some(audit_path.clone()),
            ..IntegrateArgs::default()
        };

        let result = cmd_integrate(&args, Environment::new(), false).await.unwrap();
        assert_eq!(result, BuildResult::Success);
        assert_eq!(git(&remote, &["show", "master:a.txt"]), "a");

        let records = AuditLog::new(&audit_path).read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome(), "Integrated");
        assert!(format_record(&records[0]).unwrap().contains("origin/feature/x -> origin/master"));
        cmd_audit(&audit_path, true).unwrap();
        cmd_audit(&audit_path, false).unwrap();
    }

    #[tokio::test]
    async fn integrate_unknown_branch_fails_to_resolve() {
        let (_root, _remote, work) = setup_repos();
        let args = IntegrateArgs {
            repo_dir: work,
            branch: "origin/feature/nope".to_string(),
            ..IntegrateArgs::default()
        };
        assert!(cmd_integrate(&args, Environment::new(), false).await.is_err());
    }

    #[tokio::test]
    async fn integrate_unrelated_branch_is_not_built() {
        let (_root, remote, work) = setup_repos();
        let before = git(&remote, &["rev-parse", "master"]);
        let args = IntegrateArgs {
            repo_dir: work,
            branch: "feature/y".to_string(),
            revision: Some(before.clone()),
            ..IntegrateArgs::default()
        };
        let result = cmd_integrate(&args, Environment::new(), false).await.unwrap();
        assert_eq!(result, BuildResult::NotBuilt);
        assert_eq!(git(&remote, &["rev-parse", "master"]), before);
    }

    #[tokio::test]
    async fn integrate_expands_repository_placeholder() {
        let (_root, remote, work) = setup_repos();
        let args = IntegrateArgs {
            repo_dir: work,
            branch: "${REPO}/feature/x".to_string(),
            repository: Some("${REPO}".to_string()),
            ..IntegrateArgs::default()
        };
        let environment = Environment::new().with("REPO", "origin");

        let result = cmd_integrate(&args, environment, true).await.unwrap();
        assert_eq!(result, BuildResult::Success);
        assert_eq!(git(&remote, &["show", "master:a.txt"]), "a");
    }

    #[tokio::test]
    async fn integrate_deleted_branch_with_explicit_revision_is_not_built() {
        let (root, remote, work) = setup_repos();
        let feature = git(&remote, &["rev-parse", "feature/x"]);
        let before = git(&remote, &["rev-parse", "master"]);
        git(&root.path().join("seed"), &["push", "-q", "origin", ":feature/x"]);
        let args = IntegrateArgs {
            repo_dir: work,
            branch: "origin/feature/x".to_string(),
            revision: Some(feature),
            ..IntegrateArgs::default()
        };

        let result = cmd_integrate(&args, Environment::new(), false).await.unwrap();
        assert_eq!(result, BuildResult::NotBuilt);
        assert_eq!(git(&remote, &["rev-parse", "master"]), before);
    }

    #[test]
    fn audit_of_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        cmd_audit(&dir.path().join("none.jsonl"), false).unwrap();
    }
}
