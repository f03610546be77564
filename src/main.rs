// src/main.rs

mod cli;
mod config;
mod cursor;
mod error;
mod history;
mod identity;
mod message;
mod model;
mod replay;
mod session;
mod source;
mod staging;
mod target;
mod tool;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{Args, CacheReuse};
use config::Config;
use history::HistoryCache;
use identity::IdentityMap;
use indicatif::{ProgressBar, ProgressStyle};
use model::StreamRef;
use replay::{ReplayOptions, Replayer};
use session::Session;
use source::AccuRev;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Instant;
use target::GitTarget;
use tracing::{debug, info};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let start_time = Instant::now();

    let mut config = Config::discover(args.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let identities = IdentityMap::load(&config.users_file)
        .with_context(|| format!("Failed to load users from {}", config.users_file.display()))?;
    let stream = StreamRef::new(&args.depot, &args.stream);
    let session = Session::new(
        stream,
        identities,
        config.default_git_user.as_deref(),
        config.fallback_email_domain.clone(),
    )?;

    fs::create_dir_all(&args.working_dir)
        .with_context(|| format!("Failed to create {}", args.working_dir.display()))?;
    fs::create_dir_all(&config.cache_dir)?;
    if same_dir(&config.cache_dir, &args.working_dir)? {
        bail!("The history cache directory must not be the working directory");
    }

    let source = AccuRev::new(&config.accurev_path, config.accurev_principal.as_deref(), &config.benign_errors);
    match (config.accurev_principal.as_deref(), args.password.as_deref()) {
        (Some(user), Some(password)) => source.login(user, password)?,
        (None, Some(_)) => bail!("A password was given but no AccuRev principal to log in as"),
        _ => {}
    }

    let cache = HistoryCache::for_stream(&config.cache_dir, &session.stream);
    debug!("History cache file: {}", cache.path().display());
    let reuse_cache = !args.resume && cache.exists() && should_reuse(args.reuse_cache)?;
    let options = ReplayOptions { start: args.start, resume: args.resume, reuse_cache };

    let target = GitTarget::open(&args.working_dir)?;
    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut replayer = Replayer::new(&session, &source, target, cache).with_progress(progress);
    let summary = replayer.run(&options)?;

    if summary.bootstrapped {
        info!("Created {} with the initial commit", args.working_dir.display());
    }

    match (summary.first, summary.last) {
        (Some(first), Some(last)) => info!(
            "Replayed {} transactions ({}..={}) in {:.2?}",
            summary.committed,
            first,
            last,
            start_time.elapsed()
        ),
        _ => info!("Nothing to replay; finished in {:.2?}", start_time.elapsed()),
    }
    debug!("Replay finished in state {:?}", replayer.state());
    Ok(())
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(path) = &args.accurev_path {
        config.accurev_path = path.clone();
    }
    if let Some(principal) = &args.principal {
        config.accurev_principal = Some(principal.clone());
    }
    if let Some(users) = &args.users {
        config.users_file = users.clone();
    }
    if let Some(user) = &args.default_user {
        config.default_git_user = Some(user.clone());
    }
    if let Some(dir) = &args.cache_dir {
        config.cache_dir = dir.clone();
    }
}

fn should_reuse(policy: CacheReuse) -> Result<bool> {
    match policy {
        CacheReuse::Always => Ok(true),
        CacheReuse::Never => Ok(false),
        CacheReuse::Ask => {
            print!("Existing history file found. Re-use it? [y|n] ");
            io::stdout().flush()?;
            let mut answer = String::new();
            io::stdin().lock().read_line(&mut answer)?;
            Ok(answer.trim().eq_ignore_ascii_case("y"))
        }
    }
}

fn same_dir(a: &Path, b: &Path) -> Result<bool> {
    Ok(fs::canonicalize(a)? == fs::canonicalize(b)?)
}
