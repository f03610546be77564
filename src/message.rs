// src/message.rs

use crate::model::{CommitMeta, GitUser, Transaction};

pub const NO_COMMENT: &str = "[no original comment]";

/// Builds the git commit message for a transaction.
///
/// The first comment line becomes the summary and any remainder is kept as
/// a body separated by a blank line. The transaction id and issue numbers
/// are appended as trailing annotations.
pub fn commit_message(tx: &Transaction) -> String {
    let comment = tx.comment.replace("\r\n", "\n");
    let comment = comment.trim();

    let mut message = if comment.is_empty() {
        NO_COMMENT.to_string()
    } else {
        match comment.split_once('\n') {
            Some((summary, body)) => format!("{}\n\n{}", summary.trim_end(), body.trim_start_matches('\n')),
            None => comment.to_string(),
        }
    };

    message.push_str(&format!("\n\n[Source Transaction #{}]", tx.id));

    let mut issues: Vec<&str> = Vec::new();
    for issue in &tx.issue_refs {
        if !issues.contains(&issue.as_str()) {
            issues.push(issue);
        }
    }
    if !issues.is_empty() {
        message.push_str(&format!("\n[Issue #s: {}]", issues.join(", ")));
    }
    message
}

/// The transaction's own timestamp is used for both author and committer.
pub fn commit_meta(tx: &Transaction, identity: GitUser) -> CommitMeta {
    CommitMeta { identity, timestamp: tx.timestamp }
}
