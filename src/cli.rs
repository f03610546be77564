// src/cli.rs

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Replays AccuRev stream history into a git repository", long_about = None)]
pub struct Args {
    /// AccuRev depot name
    pub depot: String,

    /// Stream name within the depot (also used as the git branch name)
    pub stream: String,

    /// Directory holding the git repository to build
    pub working_dir: PathBuf,

    /// First AccuRev transaction to replay; skips creating the repository
    #[arg(conflicts_with = "resume")]
    pub start: Option<u64>,

    /// Continue after the last transaction recorded in the repository
    #[arg(long)]
    pub resume: bool,

    /// Configuration file (defaults to ./accurev2git.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the AccuRev client executable
    #[arg(long)]
    pub accurev_path: Option<PathBuf>,

    /// AccuRev principal to run as
    #[arg(long, env = "ACCUREV_PRINCIPAL")]
    pub principal: Option<String>,

    /// Log in with this password before fetching history
    #[arg(long, env = "ACCUREV_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// User mapping file with `accurev_user|Name|email` lines
    #[arg(short, long)]
    pub users: Option<PathBuf>,

    /// AccuRev user whose git identity authors the initial commit
    #[arg(long)]
    pub default_user: Option<String>,

    /// Directory for the history cache file
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Whether an existing history cache file is reused
    #[arg(long, value_enum, default_value_t = CacheReuse::Ask)]
    pub reuse_cache: CacheReuse,
}

#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum CacheReuse {
    /// Prompt on the terminal when a cache file exists
    Ask,
    /// Always reuse the cache file
    Always,
    /// Always fetch the history again
    Never,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_arguments() {
        let args = Args::try_parse_from(["accurev2git", "Proj", "Main", "/tmp/repo", "1200"]).unwrap();
        assert_eq!(args.depot, "Proj");
        assert_eq!(args.stream, "Main");
        assert_eq!(args.start, Some(1200));
        assert!(!args.resume);
        assert_eq!(args.reuse_cache, CacheReuse::Ask);
    }

    #[test]
    fn test_resume_conflicts_with_start() {
        assert!(Args::try_parse_from(["accurev2git", "P", "S", "dir", "5", "--resume"]).is_err());
    }

    #[test]
    fn test_reuse_cache_values() {
        let args = Args::try_parse_from(["accurev2git", "P", "S", "dir", "--reuse-cache", "never"]).unwrap();
        assert_eq!(args.reuse_cache, CacheReuse::Never);
    }
}
