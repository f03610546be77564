// src/replay.rs

//! The replay engine: turns the ordered transaction history into commits.
//!
//! A run moves through `Bootstrap` (fresh repositories only), `Replaying`
//! and `Done`; any error leaves it in `Failed`. Each transaction is staged,
//! committed and only then checkpointed, so the resume cursor never points
//! past a transaction whose commit does not exist.

use crate::error::{Error, Result};
use crate::history::{HistoryCache, HistoryDocument};
use crate::message;
use crate::model::{CommitMeta, Transaction, TransactionId};
use crate::session::Session;
use crate::source::SourceControl;
use crate::staging::WorkingTree;
use crate::target::TargetRepo;
use chrono::{TimeZone, Utc};
use indicatif::ProgressBar;
use std::fs;
use tracing::{debug, info, info_span, warn};

pub const BOOTSTRAP_MESSAGE: &str = "Initial git commit.";
const IGNORE_FILE: &str = ".gitignore";
const IGNORE_CONTENT: &str = "#empty";
/// The synthetic root commit predates the first transaction by this much
const BOOTSTRAP_OFFSET_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Idle,
    Bootstrap,
    Replaying,
    Done,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// First transaction to replay; everything before it is skipped
    pub start: Option<TransactionId>,
    /// Continue after the transaction recorded in the target repository
    pub resume: bool,
    /// Use an existing history cache file instead of fetching again
    pub reuse_cache: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub bootstrapped: bool,
    pub committed: usize,
    pub first: Option<TransactionId>,
    pub last: Option<TransactionId>,
}

impl ReplaySummary {
    fn record(&mut self, id: TransactionId) {
        self.committed += 1;
        self.first.get_or_insert(id);
        self.last = Some(id);
    }
}

struct Plan {
    history: HistoryDocument,
    start: TransactionId,
    bootstrap: bool,
}

pub struct Replayer<'a, T: TargetRepo> {
    session: &'a Session,
    source: &'a dyn SourceControl,
    target: T,
    tree: WorkingTree,
    cache: HistoryCache,
    progress: ProgressBar,
    state: ReplayState,
}

impl<'a, T: TargetRepo> Replayer<'a, T> {
    pub fn new(session: &'a Session, source: &'a dyn SourceControl, target: T, cache: HistoryCache) -> Self {
        let tree = WorkingTree::new(target.workdir());
        Self {
            session,
            source,
            target,
            tree,
            cache,
            progress: ProgressBar::hidden(),
            state: ReplayState::Idle,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    #[cfg(test)]
    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn run(&mut self, options: &ReplayOptions) -> Result<ReplaySummary> {
        let result = self.run_inner(options);
        match &result {
            Ok(_) => self.state = ReplayState::Done,
            Err(e) => {
                warn!("Replay stopped: {}", e);
                self.state = ReplayState::Failed;
            }
        }
        result
    }

    fn run_inner(&mut self, options: &ReplayOptions) -> Result<ReplaySummary> {
        let plan = self.plan(options)?;
        let mut summary = ReplaySummary::default();

        if plan.bootstrap {
            self.state = ReplayState::Bootstrap;
            summary.bootstrapped = self.bootstrap(&plan.history)?;
        } else if !self.target.exists() {
            return Err(Error::RepositoryMissing(self.target.workdir().to_path_buf()));
        }

        let pending: Vec<&Transaction> = plan.history.from_id(plan.start).collect();
        if pending.is_empty() {
            info!("No transactions at or after {}; nothing to do", plan.start);
            return Ok(summary);
        }

        self.state = ReplayState::Replaying;
        info!("Replaying {} transactions starting at {}", pending.len(), pending[0].id);
        self.progress.set_length(pending.len() as u64);

        for tx in pending {
            let span = info_span!("transaction", id = tx.id);
            let _guard = span.enter();
            self.progress.set_message(format!("transaction {}", tx.id));
            self.replay_one(tx)?;
            summary.record(tx.id);
            self.progress.inc(1);
        }
        self.progress.finish_with_message("Replay complete");
        Ok(summary)
    }

    fn plan(&self, options: &ReplayOptions) -> Result<Plan> {
        let stream = &self.session.stream;
        let cursor = self.target.read_cursor()?;

        if options.resume {
            let cursor = cursor.ok_or_else(|| Error::NothingToResume(self.target.workdir().to_path_buf()))?;
            info!("Resuming after transaction {}", cursor);
            let history = self.cache.load_since(self.source, stream, cursor)?;
            return Ok(Plan { history, start: cursor + 1, bootstrap: false });
        }

        let needs_root = options.start.is_none() && cursor.is_none() && !self.target.has_commits()?;
        if needs_root && self.session.default_user.is_none() {
            return Err(Error::NoDefaultUser);
        }

        let history = self.cache.load_full(self.source, stream, options.reuse_cache)?;
        let (start, bootstrap) = match (options.start, cursor) {
            (Some(start), Some(cursor)) if start <= cursor => {
                return Err(Error::StartBeforeCursor { start, cursor });
            }
            (Some(start), _) => (start, false),
            (None, Some(cursor)) => {
                info!("Repository already holds transactions up to {}; continuing after it", cursor);
                (cursor + 1, false)
            }
            (None, None) => (0, true),
        };
        Ok(Plan { history, start, bootstrap })
    }

    /// Creates the repository with its synthetic root commit. Returns false
    /// when an earlier run already got that far.
    fn bootstrap(&mut self, history: &HistoryDocument) -> Result<bool> {
        let earliest = history.first().ok_or(Error::EmptyHistory)?;
        if self.target.exists() && self.target.has_commits()? {
            info!("Repository already initialized; skipping the initial commit");
            self.switch_to_stream_branch()?;
            return Ok(false);
        }
        let identity = self.session.default_user.clone().ok_or(Error::NoDefaultUser)?;
        let timestamp = earliest.timestamp - BOOTSTRAP_OFFSET_SECS;

        info!("Initializing repository in {}", self.target.workdir().display());
        self.target.init()?;
        fs::write(self.target.workdir().join(IGNORE_FILE), IGNORE_CONTENT)?;
        self.target.stage_all()?;
        self.target.commit(BOOTSTRAP_MESSAGE, &CommitMeta { identity, timestamp })?;
        self.switch_to_stream_branch()?;
        Ok(true)
    }

    /// Best effort: a branch that cannot be created is only logged.
    fn switch_to_stream_branch(&mut self) -> Result<()> {
        let branch = &self.session.stream.stream;
        if self.target.current_branch()?.as_deref() == Some(branch.as_str()) {
            return Ok(());
        }
        if let Err(e) = self.target.create_branch(branch) {
            warn!("Could not create branch {:?}: {}", branch, e);
        }
        Ok(())
    }

    fn replay_one(&mut self, tx: &Transaction) -> Result<()> {
        let identity = self.session.resolve_user(&tx.user);
        let message = message::commit_message(tx);
        let meta = message::commit_meta(tx, identity);

        self.tree.stage(self.source, &self.session.stream, tx.id)?;
        self.target.stage_all()?;
        let oid = self.target.commit(&message, &meta)?;
        self.target.write_cursor(tx.id)?;

        match Utc.timestamp_opt(tx.timestamp, 0).single() {
            Some(when) => debug!("Committed {} by {} at {}", oid, meta.identity, when.to_rfc2822()),
            None => debug!("Committed {} by {}", oid, meta.identity),
        }
        Ok(())
    }
}
