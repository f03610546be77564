// src/target.rs

use crate::cursor;
use crate::error::{Error, Result};
use crate::model::{CommitMeta, TransactionId};
use git2::{ErrorCode, IndexAddOption, Oid, Repository, Signature, Time};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The git side of the migration
pub trait TargetRepo {
    /// Working directory the repository lives in
    fn workdir(&self) -> &Path;

    fn exists(&self) -> bool;

    /// Creates an empty repository in the working directory
    fn init(&mut self) -> Result<()>;

    fn has_commits(&self) -> Result<bool>;

    /// Stages every addition, modification and deletion in the working tree
    fn stage_all(&mut self) -> Result<()>;

    /// Commits the index on top of HEAD
    fn commit(&mut self, message: &str, meta: &CommitMeta) -> Result<Oid>;

    /// Creates `name` at HEAD and switches to it
    fn create_branch(&mut self, name: &str) -> Result<()>;

    /// Short name of the branch HEAD points at, if any
    fn current_branch(&self) -> Result<Option<String>>;

    fn read_cursor(&self) -> Result<Option<TransactionId>>;

    fn write_cursor(&mut self, id: TransactionId) -> Result<()>;
}

pub struct GitTarget {
    path: PathBuf,
    repo: Option<Repository>,
}

impl GitTarget {
    /// Opens the repository at `path` if there is one
    pub fn open(path: &Path) -> Result<Self> {
        let repo = match Repository::open(path) {
            Ok(repo) => Some(repo),
            Err(e) if e.code() == ErrorCode::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path: path.to_path_buf(), repo })
    }

    fn repo(&self) -> Result<&Repository> {
        self.repo.as_ref().ok_or_else(|| Error::RepositoryMissing(self.path.clone()))
    }

    fn head_commit(repo: &Repository) -> Result<Option<git2::Commit<'_>>> {
        match repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl TargetRepo for GitTarget {
    fn workdir(&self) -> &Path {
        &self.path
    }

    fn exists(&self) -> bool {
        self.repo.is_some()
    }

    fn init(&mut self) -> Result<()> {
        debug!("Initializing git repository in {}", self.path.display());
        self.repo = Some(Repository::init(&self.path)?);
        Ok(())
    }

    fn has_commits(&self) -> Result<bool> {
        match &self.repo {
            Some(repo) => Ok(Self::head_commit(repo)?.is_some()),
            None => Ok(false),
        }
    }

    fn stage_all(&mut self) -> Result<()> {
        let repo = self.repo()?;
        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        Ok(())
    }

    fn commit(&mut self, message: &str, meta: &CommitMeta) -> Result<Oid> {
        let repo = self.repo()?;
        let mut index = repo.index()?;
        let tree = repo.find_tree(index.write_tree()?)?;
        let when = Time::new(meta.timestamp, 0);
        let signature = Signature::new(&meta.identity.name, &meta.identity.email, &when)?;

        let parent = Self::head_commit(repo)?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        debug!("Created commit {} as {}", oid, meta.identity);
        Ok(oid)
    }

    fn create_branch(&mut self, name: &str) -> Result<()> {
        let repo = self.repo()?;
        let head = Self::head_commit(repo)?
            .ok_or_else(|| Error::Git(git2::Error::from_str("cannot branch without a commit")))?;
        repo.branch(name, &head, false)?;
        repo.set_head(&format!("refs/heads/{}", name))?;
        Ok(())
    }

    fn current_branch(&self) -> Result<Option<String>> {
        let repo = match &self.repo {
            Some(repo) => repo,
            None => return Ok(None),
        };
        match repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().map(str::to_string)),
            Ok(_) => Ok(None),
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_cursor(&self) -> Result<Option<TransactionId>> {
        match &self.repo {
            Some(repo) => cursor::read(repo),
            None => Ok(None),
        }
    }

    fn write_cursor(&mut self, id: TransactionId) -> Result<()> {
        cursor::write(self.repo()?, id)
    }
}
