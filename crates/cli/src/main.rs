//! gitsync command-line tool.
//!
//! Thin front-end over the `gitsync-core` handlers: every subcommand builds a
//! handler, runs one operation on a blocking worker thread, renders the
//! result, and prints any diagnostics the handler collected, oldest first.
//! Ctrl+C asks the running operation to cancel.

mod progress_bar;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use dialoguer::{Confirm, Password};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use gitsync_core::config::AppConfig;
use gitsync_core::errors::SecretError;
use gitsync_core::handlers::{
    BranchHandler, CloneHandler, CommitHandler, ConfigHandler, FetchHandler, IndexHandler,
    InitHandler, PushHandler, RemoveVcsHandler, RevertHandler, StatusHandler,
};
use gitsync_core::models::{
    BranchResult, BranchScope, CloneResult, CommitResult, ConnectionType, FetchResult,
    FileStatusKind, Identity, InitResult, PullResult, PushResult, RemoteConfig,
};
use gitsync_core::secrets::{EnvSecretStore, MemorySecretStore, SecretStore};
use gitsync_core::{GitBackend, Git2Backend, HandlerCore, OperationHandler, RepositoryContext};

use progress_bar::BarSink;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// gitsync command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "gitsync",
    version,
    about = "Keep a local repository in sync with its remote"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Repository working directory (overrides the configured path).
    #[arg(short = 'C', long, global = true)]
    repo: Option<PathBuf>,

    /// Do not draw progress bars.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Always prompt for the remote password over HTTPS.
    #[arg(long, global = true)]
    ask_password: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clone a remote repository.
    Clone {
        /// Remote URL.
        url: String,
        /// Destination directory (defaults to the repository path).
        dest: Option<PathBuf>,
    },

    /// Create a repository, optionally wiring up a remote.
    Init {
        /// Remote URL to configure as origin.
        #[arg(long)]
        remote: Option<String>,
        /// Username for the remote.
        #[arg(long, default_value = "")]
        username: String,
        /// Private key to prefer for SSH remotes.
        #[arg(long)]
        ssh_key: Option<PathBuf>,
    },

    /// Fetch from the remote without touching the working tree.
    Fetch,

    /// Fetch, then fast-forward, merge or rebase the current branch.
    Pull,

    /// Push the current branch.
    Push,

    /// Commit files.
    Commit {
        /// Commit message.
        #[arg(short, long)]
        message: String,
        /// Author as "Name <email>".
        #[arg(long)]
        author: Option<String>,
        /// Files to include.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Show working-tree status.
    Status {
        /// Restrict to a file or directory.
        path: Option<PathBuf>,
        /// Mark files changed upstream or by unpushed commits.
        #[arg(long)]
        remote: bool,
        /// Include unchanged files.
        #[arg(long)]
        all: bool,
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Switch to a branch.
    Switch {
        /// Local or remote branch name.
        name: String,
    },

    /// Create a branch at HEAD.
    Branch {
        /// New branch name.
        name: String,
    },

    /// List branches.
    Branches {
        /// List remote-tracking branches instead of local ones.
        #[arg(short, long)]
        remote: bool,
    },

    /// Restore files to their committed state.
    Revert {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Add files to the index.
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Remove files from the index.
    Rm {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Read a repository configuration value.
    Config {
        /// Key such as `user.name` or `pull.rebase`.
        key: String,
        /// Interpret the value as a boolean.
        #[arg(long)]
        bool: bool,
    },

    /// Report whether the branch has unpushed commits.
    Ahead,

    /// List files changed on only one side of HEAD and its upstream.
    Diverged {
        /// Emit JSON instead of lists.
        #[arg(long)]
        json: bool,
    },

    /// Delete the repository metadata, leaving the working tree.
    RemoveVcs {
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            return ExitCode::FAILURE;
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    let session = Session::new(&config, &cli);

    match cli.command {
        Commands::Clone { url, dest } => {
            let dest = dest.unwrap_or_else(|| config.repository.path.clone());
            cmd_clone(&session, url, dest).await
        }
        Commands::Init {
            remote,
            username,
            ssh_key,
        } => cmd_init(&session, &config, remote, username, ssh_key),
        Commands::Fetch => cmd_fetch(&session).await,
        Commands::Pull => cmd_pull(&session).await,
        Commands::Push => cmd_push(&session).await,
        Commands::Commit {
            message,
            author,
            paths,
        } => cmd_commit(&session, message, author, paths).await,
        Commands::Status {
            path,
            remote,
            all,
            json,
        } => cmd_status(&session, path.as_deref(), remote, all, json),
        Commands::Switch { name } => cmd_switch(&session, &name),
        Commands::Branch { name } => cmd_branch(&session, &name),
        Commands::Branches { remote } => cmd_branches(&session, remote),
        Commands::Revert { paths } => cmd_revert(&session, paths),
        Commands::Add { paths } => cmd_index(&session, paths, IndexOp::Add),
        Commands::Rm { paths } => cmd_index(&session, paths, IndexOp::Remove),
        Commands::Config { key, bool } => cmd_config(&session, &key, bool),
        Commands::Ahead => cmd_ahead(&session),
        Commands::Diverged { json } => cmd_diverged(&session, json),
        Commands::RemoveVcs { yes } => cmd_remove_vcs(&session, yes),
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One repository context shared by every handler built for this invocation.
struct Session {
    ctx: Arc<RepositoryContext>,
    backend: Arc<dyn GitBackend>,
    secrets: Arc<CliSecretStore>,
    sink: Arc<BarSink>,
    ask_password: bool,
}

/// Passwords typed at the prompt, falling back to the configured environment
/// variable.
struct CliSecretStore {
    prompted: MemorySecretStore,
    env: EnvSecretStore,
}

impl CliSecretStore {
    fn new(password_env: Option<String>) -> Self {
        Self {
            prompted: MemorySecretStore::new(),
            env: EnvSecretStore::new(password_env),
        }
    }
}

impl SecretStore for CliSecretStore {
    fn get_secret(&self, remote: &str, username: &str) -> Result<Option<String>, SecretError> {
        match self.prompted.get_secret(remote, username)? {
            Some(secret) => Ok(Some(secret)),
            None => self.env.get_secret(remote, username),
        }
    }

    fn set_secret(&self, remote: &str, username: &str, secret: &str) -> Result<(), SecretError> {
        self.prompted.set_secret(remote, username, secret)
    }
}

impl Session {
    fn new(config: &AppConfig, cli: &Cli) -> Self {
        let secrets = Arc::new(CliSecretStore::new(config.remote.password_env.clone()));
        let ctx = Arc::new(RepositoryContext::from_config(config, secrets.clone()));
        let backend: Arc<dyn GitBackend> = Arc::new(Git2Backend::new());

        // An unconfigured remote URL falls back to the branch's tracking remote.
        if ctx.remote_url().is_empty() {
            if let Ok(Some(url)) = backend.tracking_remote_url(&ctx) {
                ctx.set_remote_url(&url);
            }
        }
        debug!(connection = %ctx.connection_type(), "session ready");

        let sink = if cli.quiet {
            BarSink::hidden()
        } else {
            BarSink::new()
        };
        Self {
            ctx,
            backend,
            secrets,
            sink: Arc::new(sink),
            ask_password: cli.ask_password,
        }
    }

    fn core(&self) -> HandlerCore {
        HandlerCore::new(Arc::clone(&self.ctx), Arc::clone(&self.backend))
            .with_progress_sink(self.sink.clone())
    }

    /// Prompt for the HTTPS password when nothing is stored for it.
    ///
    /// Must run before the first transport call: the context caches the
    /// first password it resolves.
    fn ensure_password(&self) -> Result<()> {
        if self.ctx.connection_type() != ConnectionType::Https {
            return Ok(());
        }
        let url = self.ctx.remote_url();
        let user = self.ctx.username();
        if !self.ask_password {
            match self.secrets.get_secret(&url, &user) {
                Ok(Some(secret)) if !secret.is_empty() => return Ok(()),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "secret lookup failed"),
            }
        }
        if !console::user_attended() {
            return Ok(());
        }

        let prompt = if user.is_empty() {
            format!("Password for {}", url)
        } else {
            format!("Password for {} at {}", user, url)
        };
        let password = Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .context("failed to read password")?;
        self.secrets
            .set_secret(&url, &user, &password)
            .context("failed to store password")?;
        Ok(())
    }
}

/// Run `job` on a blocking worker. Ctrl+C while it runs requests cancellation
/// and then waits for the operation to wind down.
async fn run_blocking<T, F>(ctx: &Arc<RepositoryContext>, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let mut task = tokio::task::spawn_blocking(job);
    tokio::select! {
        joined = &mut task => joined.context("operation thread panicked"),
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{}", style::warn("Cancelling..."));
            ctx.cancel();
            task.await.context("operation thread panicked")
        }
    }
}

/// Print the handler's diagnostics, oldest first.
fn report_errors(handler: &mut impl OperationHandler) {
    for message in handler.drain_errors() {
        eprintln!("{}", style::error(&message));
    }
}

fn busy() -> anyhow::Error {
    anyhow::anyhow!("another operation is already running on this repository")
}

// ---------------------------------------------------------------------------
// Network commands
// ---------------------------------------------------------------------------

async fn cmd_clone(session: &Session, url: String, dest: PathBuf) -> Result<()> {
    session.ctx.set_remote_url(&url);
    session.ensure_password()?;

    let mut handler = CloneHandler::new(session.core());
    let job_dest = dest.clone();
    let (result, mut handler) = run_blocking(&session.ctx, move || {
        let result = handler.clone_repository(&url, &job_dest);
        (result, handler)
    })
    .await?;
    report_errors(&mut handler);

    match result.ok_or_else(busy)? {
        CloneResult::Success => {
            println!(
                "{}",
                style::success(&format!("Cloned into {}", dest.display()))
            );
            Ok(())
        }
        CloneResult::Cancelled => bail!("clone cancelled"),
        CloneResult::Error => bail!("clone failed"),
    }
}

async fn cmd_fetch(session: &Session) -> Result<()> {
    session.ensure_password()?;

    let mut handler = FetchHandler::new(session.core());
    let (result, mut handler) = run_blocking(&session.ctx, move || {
        let result = handler.fetch();
        (result, handler)
    })
    .await?;
    report_errors(&mut handler);

    match result.ok_or_else(busy)? {
        FetchResult::Success => {
            println!("{}", style::success("Fetched"));
            Ok(())
        }
        FetchResult::Cancelled => bail!("fetch cancelled"),
        FetchResult::Error => bail!("fetch failed"),
    }
}

async fn cmd_pull(session: &Session) -> Result<()> {
    session.ensure_password()?;

    let mut handler = FetchHandler::new(session.core());
    let (result, mut handler) = run_blocking(&session.ctx, move || {
        let result = handler.pull();
        (result, handler)
    })
    .await?;
    report_errors(&mut handler);

    let result = result.ok_or_else(busy)?;
    match result {
        PullResult::FastForward => {
            println!("{}", style::success(&format!("Pull: {}", result)));
            for commit in handler.commit_log() {
                println!(
                    "  {} {} {}",
                    style::dim(style::short_sha(&commit.sha)),
                    commit.first_line,
                    style::dim(&format!("({}, {})", commit.author, commit.date))
                );
            }
        }
        PullResult::Success | PullResult::UpToDate => {
            println!("{}", style::success(&format!("Pull: {}", result)));
        }
        PullResult::MergeFailed => {
            for conflict in handler.conflicts() {
                println!(
                    "  {} {}",
                    style::file_status(FileStatusKind::Conflicted),
                    conflict.filename
                );
            }
            bail!("pull: {} (code {})", result, result.code());
        }
        PullResult::DirtyWorkdir | PullResult::ManualResolutionRequired | PullResult::Error => {
            bail!("pull: {} (code {})", result, result.code());
        }
    }
    Ok(())
}

async fn cmd_push(session: &Session) -> Result<()> {
    session.ensure_password()?;

    let mut handler = PushHandler::new(session.core());
    let (result, mut handler) = run_blocking(&session.ctx, move || {
        let result = handler.push();
        (result, handler)
    })
    .await?;
    report_errors(&mut handler);

    match result.ok_or_else(busy)? {
        PushResult::Success => {
            println!("{}", style::success("Pushed"));
            Ok(())
        }
        PushResult::Cancelled => bail!("push cancelled"),
        PushResult::Error => bail!("push failed"),
    }
}

// ---------------------------------------------------------------------------
// Local commands
// ---------------------------------------------------------------------------

fn cmd_init(
    session: &Session,
    config: &AppConfig,
    remote: Option<String>,
    username: String,
    ssh_key: Option<PathBuf>,
) -> Result<()> {
    let mut handler = InitHandler::new(session.core());
    let path = session
        .ctx
        .repo_path()
        .unwrap_or_else(|| config.repository.path.clone());

    let result = handler.init_repository(&path).ok_or_else(busy)?;
    report_errors(&mut handler);
    match result {
        InitResult::Success => println!(
            "{}",
            style::success(&format!("Initialized repository in {}", path.display()))
        ),
        InitResult::AlreadyExists => println!(
            "{}",
            style::warn(&format!("{} is already a repository", path.display()))
        ),
        InitResult::Error => bail!("init failed"),
    }

    let Some(url) = remote else {
        return Ok(());
    };
    let remote = RemoteConfig {
        url,
        username,
        ssh_key,
        ..Default::default()
    };
    let result = handler.setup_remote(remote).ok_or_else(busy)?;
    report_errors(&mut handler);
    match result {
        InitResult::Error => bail!("remote setup failed"),
        _ => {
            println!(
                "{}",
                style::success(&format!(
                    "Remote {} set to {} ({})",
                    session.ctx.remote_name(),
                    session.ctx.remote_url(),
                    session.ctx.connection_type()
                ))
            );
            Ok(())
        }
    }
}

async fn cmd_commit(
    session: &Session,
    message: String,
    author: Option<String>,
    paths: Vec<PathBuf>,
) -> Result<()> {
    let mut handler = CommitHandler::new(session.core());
    if let Some(author) = author {
        handler.set_author(parse_author(&author)?);
    }
    for path in paths {
        handler.add_file(path);
    }

    let (result, mut handler) = run_blocking(&session.ctx, move || {
        let result = handler.perform_commit(&message);
        (result, handler)
    })
    .await?;
    report_errors(&mut handler);

    match result.ok_or_else(busy)? {
        CommitResult::Success => {
            let sha = handler.last_commit().unwrap_or_default();
            println!(
                "{}",
                style::success(&format!("Committed {}", style::short_sha(sha)))
            );
            Ok(())
        }
        CommitResult::Cancelled => bail!("commit cancelled"),
        CommitResult::Error => bail!("commit failed"),
    }
}

fn cmd_status(
    session: &Session,
    path: Option<&Path>,
    remote: bool,
    all: bool,
    json: bool,
) -> Result<()> {
    let mut handler = StatusHandler::new(session.core());
    let filter = path.map(absolute);
    let statuses = if remote {
        handler.file_status_with_remote(filter.as_deref())
    } else {
        handler.file_status(filter.as_deref())
    };
    report_errors(&mut handler);

    let rows: Vec<_> = statuses
        .into_values()
        .filter(|s| all || s.status != FileStatusKind::Current)
        .collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).context("failed to encode status")?
        );
        return Ok(());
    }

    if rows.is_empty() {
        println!("{}", style::dim("Nothing to report"));
        return Ok(());
    }

    let root = session.ctx.project_root().unwrap_or_default();
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Status", "Path"]);
    for row in &rows {
        let shown = row.path.strip_prefix(&root).unwrap_or(&row.path);
        table.add_row(vec![
            style::file_status(row.status),
            shown.display().to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn cmd_switch(session: &Session, name: &str) -> Result<()> {
    let mut handler = BranchHandler::new(session.core());
    let result = handler.switch_branch(name).ok_or_else(busy)?;
    report_errors(&mut handler);
    match result {
        BranchResult::Success => {
            println!("{}", style::success(&format!("Switched to {}", name)));
            Ok(())
        }
        BranchResult::BranchNotFound => bail!("branch '{}' not found", name),
        BranchResult::CheckoutFailed => bail!("checkout of '{}' failed", name),
        BranchResult::Error => bail!("switch failed"),
    }
}

fn cmd_branch(session: &Session, name: &str) -> Result<()> {
    let mut handler = BranchHandler::new(session.core());
    let result = handler.create_branch(name).ok_or_else(busy)?;
    report_errors(&mut handler);
    match result {
        BranchResult::Success => {
            println!("{}", style::success(&format!("Created branch {}", name)));
            Ok(())
        }
        _ => bail!("could not create branch '{}'", name),
    }
}

fn cmd_branches(session: &Session, remote: bool) -> Result<()> {
    let mut handler = BranchHandler::new(session.core());
    let scope = if remote {
        BranchScope::Remote
    } else {
        BranchScope::Local
    };
    let branches = handler.list_branches(scope);
    let current = handler.current_branch();
    report_errors(&mut handler);

    for branch in branches {
        if current.as_deref() == Some(branch.as_str()) && !remote {
            println!("* {}", style::header(&branch));
        } else {
            println!("  {}", branch);
        }
    }
    Ok(())
}

fn cmd_revert(session: &Session, paths: Vec<PathBuf>) -> Result<()> {
    let mut handler = RevertHandler::new(session.core());
    for path in paths {
        handler.add_file(absolute(&path));
    }
    let ok = handler.perform_revert().ok_or_else(busy)?;
    report_errors(&mut handler);
    if !ok {
        for path in handler.failed_files() {
            eprintln!("  {}", style::dim(&path.display().to_string()));
        }
        bail!("revert failed");
    }
    println!("{}", style::success("Reverted"));
    Ok(())
}

enum IndexOp {
    Add,
    Remove,
}

fn cmd_index(session: &Session, paths: Vec<PathBuf>, op: IndexOp) -> Result<()> {
    let mut handler = IndexHandler::new(session.core());
    let mut queued = 0;
    for path in paths {
        let path = absolute(&path);
        let accepted = match op {
            IndexOp::Add => handler.add(&path),
            IndexOp::Remove => handler.remove(&path),
        };
        if accepted {
            queued += 1;
        }
    }
    if queued == 0 {
        report_errors(&mut handler);
        bail!("no files to update");
    }

    let ok = match op {
        IndexOp::Add => handler.perform_add(),
        IndexOp::Remove => handler.perform_remove(),
    }
    .ok_or_else(busy)?;
    report_errors(&mut handler);
    if !ok {
        bail!("{} file(s) could not be updated", handler.failed_files().len());
    }
    println!(
        "{}",
        style::success(&format!("Updated {} file(s) in the index", queued))
    );
    Ok(())
}

fn cmd_config(session: &Session, key: &str, as_bool: bool) -> Result<()> {
    let mut handler = ConfigHandler::new(session.core());
    let value = if as_bool {
        handler.get_bool(key).map(|b| b.to_string())
    } else {
        handler.get_string(key)
    };
    report_errors(&mut handler);
    match value {
        Some(v) => {
            println!("{v}");
            Ok(())
        }
        None => bail!("'{}' is not set", key),
    }
}

fn cmd_ahead(session: &Session) -> Result<()> {
    let mut handler = StatusHandler::new(session.core());
    let ahead = handler.has_local_commits();
    report_errors(&mut handler);
    if ahead {
        println!("{}", style::warn("Local commits not yet pushed"));
    } else {
        println!("{}", style::success("Nothing to push"));
    }
    Ok(())
}

fn cmd_diverged(session: &Session, json: bool) -> Result<()> {
    let mut handler = StatusHandler::new(session.core());
    let divergence = handler.different_files();
    report_errors(&mut handler);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&divergence).context("failed to encode divergence")?
        );
        return Ok(());
    }

    println!("{}", style::header("Changed locally"));
    for path in &divergence.local {
        println!("  {}", path);
    }
    println!("{}", style::header("Changed upstream"));
    for path in &divergence.remote {
        println!("  {}", path);
    }
    Ok(())
}

fn cmd_remove_vcs(session: &Session, yes: bool) -> Result<()> {
    if !yes {
        let path = session.ctx.repo_path().unwrap_or_default();
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete repository metadata in {}? The working tree is kept.",
                path.display()
            ))
            .default(false)
            .interact()
            .context("failed to read confirmation")?;
        if !confirmed {
            println!("{}", style::warn("Cancelled. Nothing was removed."));
            return Ok(());
        }
    }

    let mut handler = RemoveVcsHandler::new(session.core());
    let removed = handler.remove().ok_or_else(busy)?;
    report_errors(&mut handler);
    if !removed {
        bail!("could not remove repository metadata");
    }
    println!("{}", style::success("Repository metadata removed"));
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let path = cli.config.clone().or_else(default_config_path);
    let mut config = match path {
        Some(path) => AppConfig::load_and_validate(&path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => {
            let cwd = std::env::current_dir().context("failed to read current directory")?;
            AppConfig::for_repository(cwd)
        }
    };
    if let Some(repo) = &cli.repo {
        config.repository.path = absolute(repo);
    }
    Ok(config)
}

/// `~/.config/gitsync/config.toml`, when it exists.
fn default_config_path() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("gitsync").join("config.toml");
    path.is_file().then_some(path)
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Parse `Name <email>`.
fn parse_author(raw: &str) -> Result<Identity> {
    let (name, rest) = raw
        .split_once('<')
        .context("author must look like \"Name <email>\"")?;
    let email = rest
        .strip_suffix('>')
        .context("author email must end with '>'")?;
    let name = name.trim();
    if name.is_empty() || email.trim().is_empty() {
        bail!("author needs both a name and an email");
    }
    Ok(Identity::new(name, email.trim()))
}
