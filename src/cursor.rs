// src/cursor.rs

//! The resume cursor: id of the last transaction committed to the target
//! repository, kept in that repository's local git config.

use crate::error::{Error, Result};
use crate::model::TransactionId;
use git2::{ConfigLevel, ErrorCode, Repository};

pub const CURSOR_KEY: &str = "accurev2git.lasttransaction";

pub fn read(repo: &Repository) -> Result<Option<TransactionId>> {
    let config = repo.config()?.open_level(ConfigLevel::Local)?;
    match config.get_i64(CURSOR_KEY) {
        Ok(value) => TransactionId::try_from(value)
            .map(Some)
            .map_err(|_| Error::Config(format!("{} holds invalid transaction id {}", CURSOR_KEY, value))),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Must only be called once the commit for `id` exists.
pub fn write(repo: &Repository, id: TransactionId) -> Result<()> {
    let value = i64::try_from(id)
        .map_err(|_| Error::Config(format!("transaction id {} does not fit in git config", id)))?;
    let mut config = repo.config()?.open_level(ConfigLevel::Local)?;
    config.set_i64(CURSOR_KEY, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_absent_cursor_reads_none() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        assert_eq!(read(&repo).unwrap(), None);
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        write(&repo, 41).unwrap();
        write(&repo, 42).unwrap();
        assert_eq!(read(&repo).unwrap(), Some(42));

        let reopened = Repository::open(dir.path()).unwrap();
        assert_eq!(read(&reopened).unwrap(), Some(42));
    }
}
