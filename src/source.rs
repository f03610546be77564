// src/source.rs

//! The source-control client: history queries and tree population.

use crate::error::Result;
use crate::model::{StreamRef, TransactionId};
use crate::tool::{ErrorPolicy, ToolInvoker};
use std::path::Path;
use tracing::{debug, info};

/// Error text from the source client that marks an expected no-op
pub const BENIGN_ERRORS: &[&str] = &[
    "is defunct",
    "No element named",
    "Unable to proceed with annotate.",
    "Specified version not found for:",
];

pub trait SourceControl {
    /// Returns the raw XML history of promote transactions for `stream`,
    /// restricted to ids `>= since` when given.
    fn history(&self, stream: &StreamRef, since: Option<TransactionId>) -> Result<String>;

    /// Overwrites `dir` with the exact tree of `stream` as of `transaction`.
    fn populate(&self, stream: &StreamRef, transaction: TransactionId, dir: &Path) -> Result<()>;
}

/// AccuRev command-line client
#[derive(Debug)]
pub struct AccuRev {
    tool: ToolInvoker,
    benign: Vec<String>,
}

impl AccuRev {
    pub fn new(program: &Path, principal: Option<&str>, extra_benign: &[String]) -> Self {
        let mut tool = ToolInvoker::new("AccuRev", program);
        if let Some(principal) = principal {
            tool = tool.env_default("ACCUREV_PRINCIPAL", principal);
        }
        let benign = BENIGN_ERRORS
            .iter()
            .map(|s| s.to_string())
            .chain(extra_benign.iter().cloned())
            .collect();
        Self { tool, benign }
    }

    pub fn login(&self, user: &str, password: &str) -> Result<()> {
        info!("Logging in to AccuRev as {}", user);
        self.tool.run(["login", user, password], None, ErrorPolicy::Strict)?;
        Ok(())
    }

    fn history_args(stream: &StreamRef, since: Option<TransactionId>) -> Vec<String> {
        let mut args = vec![
            "hist".to_string(),
            "-p".to_string(),
            stream.depot.clone(),
            "-s".to_string(),
            stream.qualified(),
            "-k".to_string(),
            "promote".to_string(),
        ];
        if let Some(since) = since {
            args.push("-t".to_string());
            args.push(format!("now-{}", since));
        }
        args.push("-fx".to_string());
        args
    }

    fn populate_args(stream: &StreamRef, transaction: TransactionId) -> Vec<String> {
        vec![
            "pop".to_string(),
            "-R".to_string(),
            "-O".to_string(),
            "-v".to_string(),
            stream.qualified(),
            "-L".to_string(),
            ".".to_string(),
            "-t".to_string(),
            transaction.to_string(),
            ".".to_string(),
        ]
    }
}

impl SourceControl for AccuRev {
    fn history(&self, stream: &StreamRef, since: Option<TransactionId>) -> Result<String> {
        let out = self.tool.run(Self::history_args(stream, since), None, ErrorPolicy::AllowList(&self.benign))?;
        Ok(out.stdout)
    }

    fn populate(&self, stream: &StreamRef, transaction: TransactionId, dir: &Path) -> Result<()> {
        let out = self.tool.run(
            Self::populate_args(stream, transaction),
            Some(dir),
            ErrorPolicy::AllowList(&self.benign),
        )?;
        if out.ignored_stderr.is_some() {
            debug!("Populated transaction {} with warnings", transaction);
        }
        Ok(())
    }
}
