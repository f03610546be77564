// src/error.rs

use crate::model::TransactionId;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The history document could not be turned into transactions
    #[error("malformed history document: {0}")]
    History(String),

    #[error("{tool} has returned an error running `{command}`: {stderr}")]
    Tool { tool: String, command: String, stderr: String },

    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("users file line {line}: expected `user|name|email`, got {content:?}")]
    MalformedUser { line: usize, content: String },

    #[error("users file line {line}: duplicate entry for source user {user:?}")]
    DuplicateUser { line: usize, user: String },

    #[error("default git user {0:?} is not present in the users file")]
    UnknownDefaultUser(String),

    #[error("default git user {0:?} matches more than one entry in the users file")]
    AmbiguousDefaultUser(String),

    #[error("cannot initialize a new repository without a default git user")]
    NoDefaultUser,

    #[error("nothing to resume from: no replayed transaction recorded in {0}")]
    NothingToResume(PathBuf),

    #[error("history contains no transactions to replay")]
    EmptyHistory,

    #[error("starting transaction {start} is not after the last replayed transaction {cursor}")]
    StartBeforeCursor { start: TransactionId, cursor: TransactionId },

    #[error("failed to clear {path}: {source}")]
    Clean {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("target repository {0} does not exist")]
    RepositoryMissing(PathBuf),
}
