#![forbid(unsafe_code)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use bdk_config::settings::effective_jobs;
use bdk_config::{Repository, RepositoryStore, Rule, RuleKind, Settings};
use bdk_engine::{PipelineOutcome, RepositoryStats, ToolCollaborators};
use bdk_tools::ToolKind;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "bdk", about = "Build asset libraries from game packages")]
#[command(version)]
struct Cli {
    /// Show more log output (-v for progress, -vv for debug detail)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage registered repositories
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },
    /// Scan a repository and list its packages
    Scan {
        /// Repository id or name
        repository: String,
        /// Print packages as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export and build every stale package
    Build {
        /// Repository id or name
        repository: String,
        /// Concurrent jobs per batch (defaults to config, then CPU count)
        #[arg(long, short = 'j')]
        jobs: Option<usize>,
        /// Show what would be exported and built without running anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Force packages to be exported and built again
    Invalidate {
        /// Repository id or name
        repository: String,
        /// Keep the export and only rebuild assets
        #[arg(long)]
        assets: bool,
        /// Package paths or names
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Include packages in builds again
    Enable {
        /// Repository id or name
        repository: String,
        /// Package paths or names
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Leave packages out of builds
    Disable {
        /// Repository id or name
        repository: String,
        /// Package paths or names
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Manage include/exclude rules
    Rule {
        #[command(subcommand)]
        action: RuleAction,
    },
    /// Show package counts by status
    Stats {
        /// Repository id or name
        repository: String,
        /// Print counts as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a repository's manifest, exports, and assets
    Clean {
        /// Repository id or name
        repository: String,
    },
    /// Check configuration and external tools
    Doctor,
}

#[derive(Debug, Subcommand)]
enum RepoAction {
    /// Register a game installation
    Create {
        /// Display name
        name: String,
        /// Game installation directory
        #[arg(long)]
        game: PathBuf,
        /// Mod subdirectory inside the game directory
        #[arg(long = "mod")]
        mod_name: Option<String>,
        /// Cache directory (defaults to config, then <home>/cache)
        #[arg(long)]
        cache: Option<PathBuf>,
    },
    /// Register a repository from an exported document
    Link {
        /// Repository document written by `bdk repo export`
        file: PathBuf,
    },
    /// Forget a repository, keeping its cache
    Unlink {
        /// Repository id or name
        repository: String,
    },
    /// Forget a repository and delete its cache
    Delete {
        /// Repository id or name
        repository: String,
    },
    /// List registered repositories
    List,
    /// Write a repository document that can be linked elsewhere
    Export {
        /// Repository id or name
        repository: String,
        /// Destination file
        file: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum RuleAction {
    /// Append a rule
    Add {
        /// Repository id or name
        repository: String,
        /// include, exclude, or set-asset-directory
        kind: RuleKind,
        /// Glob matched against the package file name, then its path
        pattern: String,
        /// Output directory for set-asset-directory rules
        #[arg(long)]
        asset_directory: Option<String>,
    },
    /// Remove the rule at an index
    Remove {
        /// Repository id or name
        repository: String,
        index: usize,
    },
    /// Move a rule to a new position
    Move {
        /// Repository id or name
        repository: String,
        from: usize,
        to: usize,
    },
    /// Skip a rule during evaluation
    Mute {
        /// Repository id or name
        repository: String,
        index: usize,
    },
    /// Evaluate a muted rule again
    Unmute {
        /// Repository id or name
        repository: String,
        index: usize,
    },
    /// List rules in evaluation order
    List {
        /// Repository id or name
        repository: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Repo { action } => cmd_repo(action),
        Command::Scan { repository, json } => cmd_scan(&repository, json),
        Command::Build {
            repository,
            jobs,
            dry_run,
        } => cmd_build(&repository, jobs, dry_run),
        Command::Invalidate {
            repository,
            assets,
            packages,
        } => cmd_invalidate(&repository, assets, &packages),
        Command::Enable {
            repository,
            packages,
        } => cmd_set_enabled(&repository, &packages, true),
        Command::Disable {
            repository,
            packages,
        } => cmd_set_enabled(&repository, &packages, false),
        Command::Rule { action } => cmd_rule(action),
        Command::Stats { repository, json } => cmd_stats(&repository, json),
        Command::Clean { repository } => cmd_clean(&repository),
        Command::Doctor => cmd_doctor(),
    };

    if let Err(msg) = result {
        eprintln!("error: {msg}");
        process::exit(1);
    }
}

/// Default log directive for a `-v` count; `BDK_LOG` overrides it.
fn log_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_env("BDK_LOG")
        .unwrap_or_else(|_| EnvFilter::new(log_directive(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Home directory, settings, and the repository store.
struct Context {
    home: PathBuf,
    settings: Settings,
    store: RepositoryStore,
}

impl Context {
    fn load() -> Result<Self, Box<dyn Error>> {
        let home = bdk_util::fs::bdk_home()?;
        let settings = Settings::from_path(&home.join("config.toml"))?.with_env_overrides();
        let store = RepositoryStore::load(&home.join("repositories.json"))?;
        tracing::debug!(
            home = %home.display(),
            repositories = store.repositories().len(),
            "loaded context"
        );
        Ok(Self {
            home,
            settings,
            store,
        })
    }

    /// A working copy of a registered repository.
    fn repository(&self, id_or_name: &str) -> Result<Repository, Box<dyn Error>> {
        Ok(self.store.get(id_or_name)?.clone())
    }
}

fn cmd_repo(action: RepoAction) -> CliResult {
    let mut ctx = Context::load()?;
    match action {
        RepoAction::Create {
            name,
            game,
            mod_name,
            cache,
        } => {
            let cache = cache.unwrap_or_else(|| ctx.settings.cache_directory(&ctx.home));
            let repo = bdk_engine::repository::create_repository(
                &mut ctx.store,
                &name,
                &game,
                mod_name.as_deref(),
                &cache,
            )?;
            eprintln!("     Created repository {} ({})", repo.name, repo.id);
        }
        RepoAction::Link { file } => {
            let repo = bdk_engine::repository::link_repository(&mut ctx.store, &file)?;
            eprintln!("      Linked repository {} ({})", repo.name, repo.id);
        }
        RepoAction::Unlink { repository } => {
            let repo = bdk_engine::repository::unlink_repository(&mut ctx.store, &repository)?;
            eprintln!("    Unlinked repository {} ({})", repo.name, repo.id);
        }
        RepoAction::Delete { repository } => {
            let repo = bdk_engine::repository::delete_repository(&mut ctx.store, &repository)?;
            eprintln!("     Deleted repository {} ({})", repo.name, repo.id);
        }
        RepoAction::List => {
            if ctx.store.repositories().is_empty() {
                eprintln!("No repositories registered — run `bdk repo create`");
            }
            for repo in ctx.store.repositories() {
                let mod_suffix = repo
                    .mod_name
                    .as_deref()
                    .map(|m| format!(" [{m}]"))
                    .unwrap_or_default();
                println!(
                    "{}  {}{}  {}",
                    repo.id,
                    repo.name,
                    mod_suffix,
                    repo.game_directory.display()
                );
            }
        }
        RepoAction::Export { repository, file } => {
            bdk_engine::repository::export_repository(&ctx.store, &repository, &file)?;
            eprintln!("    Exported repository {repository} to {}", file.display());
        }
    }
    Ok(())
}

fn cmd_scan(repository: &str, json: bool) -> CliResult {
    let ctx = Context::load()?;
    let mut repo = ctx.repository(repository)?;
    let count = bdk_engine::scan_repository(&mut repo)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&repo.packages)?);
        return Ok(());
    }
    for package in &repo.packages {
        let flag = if !package.is_enabled {
            "disabled"
        } else if package.is_excluded_by_rule {
            "excluded"
        } else {
            ""
        };
        println!("{:<12} {:<8} {}", package.status.to_string(), flag, package.path);
    }
    eprintln!("     Scanned {count} packages");
    Ok(())
}

fn cmd_build(repository: &str, jobs: Option<usize>, dry_run: bool) -> CliResult {
    let ctx = Context::load()?;
    let mut repo = ctx.repository(repository)?;
    let jobs = effective_jobs(jobs.unwrap_or(ctx.settings.build.jobs));
    let tools = ToolCollaborators::new(&ctx.settings)?;

    if dry_run {
        let plan = bdk_engine::plan(&mut repo, &tools, jobs)?;
        if plan.is_empty() {
            eprintln!("    Fresh {} (nothing to do)", repo.name);
            return Ok(());
        }
        for path in &plan.to_export {
            println!("export   {path}");
        }
        for (index, level) in plan.levels.iter().enumerate() {
            for path in level {
                println!("build    {index:>3}  {path}");
            }
        }
        for (from, to) in &plan.removed_edges {
            eprintln!("     Warning dependency {from} -> {to} dropped to break a cycle");
        }
        eprintln!(
            "     Planned {} exports, {} builds in {} levels",
            plan.to_export.len(),
            plan.to_build.len(),
            plan.levels.len()
        );
        return Ok(());
    }

    eprintln!("    Building {} with {jobs} workers", repo.name);
    let report = bdk_engine::build_asset_library(&mut repo, (&tools).into(), jobs)?;
    for (from, to) in &report.removed_edges {
        eprintln!("     Warning dependency {from} -> {to} dropped to break a cycle");
    }
    if !report.exported.is_empty() {
        eprintln!("    Exported {} packages", report.exported.len());
    }
    if !report.built.is_empty() {
        eprintln!("       Built {} packages in {} levels", report.built.len(), report.levels);
    }

    match &report.outcome {
        PipelineOutcome::Completed => {
            eprintln!(
                "    Finished {} in {:.2}s ({})",
                repo.name,
                report.duration.as_secs_f64(),
                report.stats
            );
            Ok(())
        }
        PipelineOutcome::ExportFailed { failed } => {
            for path in failed {
                eprintln!("      Failed export {path}");
            }
            Err(format!("{} export(s) failed — nothing was built", failed.len()).into())
        }
        PipelineOutcome::BuildFailed { level, failed } => {
            for path in failed {
                eprintln!("      Failed build {path}");
            }
            Err(format!(
                "{} build(s) failed in level {level} — later levels were not started",
                failed.len()
            )
            .into())
        }
    }
}

fn cmd_invalidate(repository: &str, assets: bool, packages: &[String]) -> CliResult {
    let ctx = Context::load()?;
    let mut repo = ctx.repository(repository)?;
    let touched = if assets {
        bdk_engine::repository::invalidate_assets(&mut repo, packages)?
    } else {
        bdk_engine::repository::invalidate(&mut repo, packages)?
    };
    let what = if assets { "assets of" } else { "" };
    for path in &touched {
        eprintln!(" Invalidated {what} {path}");
    }
    Ok(())
}

fn cmd_set_enabled(repository: &str, packages: &[String], enabled: bool) -> CliResult {
    let ctx = Context::load()?;
    let mut repo = ctx.repository(repository)?;
    let touched = bdk_engine::repository::set_enabled(&mut repo, packages, enabled)?;
    let verb = if enabled { "Enabled" } else { "Disabled" };
    for path in &touched {
        eprintln!("{verb:>12} {path}");
    }
    Ok(())
}

fn cmd_rule(action: RuleAction) -> CliResult {
    let mut ctx = Context::load()?;
    match action {
        RuleAction::Add {
            repository,
            kind,
            pattern,
            asset_directory,
        } => {
            let rule = match kind {
                RuleKind::Include => Rule::include(&pattern),
                RuleKind::Exclude => Rule::exclude(&pattern),
                RuleKind::SetAssetDirectory => {
                    Rule::set_asset_directory(&pattern, asset_directory.as_deref().unwrap_or(""))
                }
            };
            ctx.store.get_mut(&repository)?.add_rule(rule)?;
            ctx.store.write()?;
            eprintln!("       Added {kind} rule `{pattern}`");
        }
        RuleAction::Remove { repository, index } => {
            let rule = ctx.store.get_mut(&repository)?.remove_rule(index)?;
            ctx.store.write()?;
            eprintln!("     Removed {} rule `{}`", rule.kind, rule.pattern);
        }
        RuleAction::Move {
            repository,
            from,
            to,
        } => {
            ctx.store.get_mut(&repository)?.move_rule(from, to)?;
            ctx.store.write()?;
            eprintln!("       Moved rule {from} to {to}");
        }
        RuleAction::Mute { repository, index } => {
            ctx.store.get_mut(&repository)?.set_rule_muted(index, true)?;
            ctx.store.write()?;
            eprintln!("       Muted rule {index}");
        }
        RuleAction::Unmute { repository, index } => {
            ctx.store.get_mut(&repository)?.set_rule_muted(index, false)?;
            ctx.store.write()?;
            eprintln!("     Unmuted rule {index}");
        }
        RuleAction::List { repository } => {
            let repo = ctx.store.get(&repository)?;
            if repo.rules.is_empty() {
                eprintln!("No rules — every package is included");
            }
            for (index, rule) in repo.rules.iter().enumerate() {
                println!("{}", format_rule(index, rule));
            }
        }
    }
    Ok(())
}

fn format_rule(index: usize, rule: &Rule) -> String {
    let mut line = format!("{index:>3}  {:<19} {}", rule.kind.to_string(), rule.pattern);
    if let Some(dir) = &rule.asset_directory {
        line.push_str(&format!(" -> {dir}"));
    }
    if rule.mute {
        line.push_str("  (muted)");
    }
    line
}

fn cmd_stats(repository: &str, json: bool) -> CliResult {
    let ctx = Context::load()?;
    let mut repo = ctx.repository(repository)?;
    let stats = bdk_engine::repository::stats(&mut repo)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{}: {stats}", repo.name);
        if let Some(hint) = pending_hint(repository, &stats) {
            eprintln!("{hint}");
        }
    }
    Ok(())
}

fn pending_hint(repository: &str, stats: &RepositoryStats) -> Option<String> {
    let pending = stats.pending();
    (pending > 0).then(|| format!("     Pending {pending} packages, run `bdk build {repository}`"))
}

fn cmd_clean(repository: &str) -> CliResult {
    let ctx = Context::load()?;
    let repo = ctx.store.get(repository)?;
    bdk_engine::repository::clean_cache(repo)?;
    eprintln!("     Cleaned {}", repo.cache_root().display());
    Ok(())
}

fn cmd_doctor() -> CliResult {
    eprintln!("Checking environment...");
    eprintln!();

    let mut issues = 0u32;

    let home = match bdk_util::fs::bdk_home() {
        Ok(home) => {
            eprintln!("  [ok] Home: {}", home.display());
            home
        }
        Err(e) => {
            eprintln!("  [!!] Home: {e}");
            return Err("1 issue(s) found".into());
        }
    };

    let settings = match Settings::from_path(&home.join("config.toml")) {
        Ok(settings) => {
            eprintln!("  [ok] Config: {}", home.join("config.toml").display());
            settings.with_env_overrides()
        }
        Err(e) => {
            eprintln!("  [!!] Config: {e}");
            issues = issues.saturating_add(1);
            Settings::default().with_env_overrides()
        }
    };

    match RepositoryStore::load(&home.join("repositories.json")) {
        Ok(store) => eprintln!("  [ok] Repositories: {}", store.repositories().len()),
        Err(e) => {
            eprintln!("  [!!] Repositories: {e}");
            issues = issues.saturating_add(1);
        }
    }

    let tools = [
        (ToolKind::Exporter, settings.tools.exporter.as_str()),
        (ToolKind::Builder, settings.tools.builder.as_str()),
        (ToolKind::DependencyReader, settings.tools.dependency_reader.as_str()),
    ];
    for (kind, spec) in tools {
        match bdk_tools::locate(kind, spec) {
            Ok(tool) => eprintln!("  [ok] {kind}: {}", tool.path.display()),
            Err(e) => {
                eprintln!("  [!!] {kind}: {e}");
                issues = issues.saturating_add(1);
            }
        }
    }

    if check_build_script(&settings.tools.build_script) {
        eprintln!("  [ok] Build script: {}", settings.tools.build_script.display());
    } else {
        eprintln!(
            "  [!!] Build script: {} not found — set tools.build_script in config.toml",
            settings.tools.build_script.display()
        );
        issues = issues.saturating_add(1);
    }

    eprintln!("  [--] Workers per batch: {}", settings.effective_jobs());

    eprintln!();
    if issues > 0 {
        eprintln!("{issues} issue(s) found — fix them before building");
        Err(format!("{issues} issue(s) found").into())
    } else {
        eprintln!("All checks passed");
        Ok(())
    }
}

fn check_build_script(path: &Path) -> bool {
    path.is_file()
}
