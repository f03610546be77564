// src/model.rs

use std::fmt;

/// Uniquely identifies a transaction in the source depot
pub type TransactionId = u64;

/// A single promoted change-set from the source history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: TransactionId,
    pub user: String,
    /// Seconds since the Unix epoch
    pub timestamp: i64,
    pub comment: String,
    /// Deduplicated, in order of first appearance
    pub issue_refs: Vec<String>,
}

impl Transaction {
    /// Records an issue reference unless it is already present
    pub fn add_issue_ref(&mut self, issue: &str) {
        if !issue.is_empty() && !self.issue_refs.iter().any(|i| i == issue) {
            self.issue_refs.push(issue.to_string());
        }
    }
}

/// A commit identity on the git side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitUser {
    pub source_user: String,
    pub name: String,
    pub email: String,
}

impl fmt::Display for GitUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// A depot/stream pair in the source system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRef {
    pub depot: String,
    pub stream: String,
}

impl StreamRef {
    pub fn new(depot: impl Into<String>, stream: impl Into<String>) -> Self {
        Self { depot: depot.into(), stream: stream.into() }
    }

    /// The stream name as the source client knows it
    pub fn qualified(&self) -> String {
        format!("{}_{}", self.depot, self.stream)
    }
}

/// Author/committer metadata for one commit
#[derive(Debug, Clone)]
pub struct CommitMeta {
    pub identity: GitUser,
    pub timestamp: i64,
}
