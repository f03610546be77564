// src/identity.rs

//! Source user to git identity translation.
//!
//! The table is read once from a `user|name|email` file and is immutable
//! afterwards. Lookups ignore case.

use crate::error::{Error, Result};
use crate::model::GitUser;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Default)]
pub struct IdentityMap {
    users: HashMap<String, GitUser>,
}

impl IdentityMap {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read users file {}: {}", path.display(), e))
        })?;
        let map = Self::parse(&content)?;
        debug!("Loaded {} user mappings from {}", map.len(), path.display());
        Ok(map)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut users = HashMap::new();
        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split('|').map(str::trim).take(3).collect();
            if parts.len() < 3 || parts.iter().any(|p| p.is_empty()) {
                return Err(Error::MalformedUser { line: idx + 1, content: raw.to_string() });
            }
            let user = GitUser {
                source_user: parts[0].to_string(),
                name: parts[1].to_string(),
                email: parts[2].to_string(),
            };
            let key = parts[0].to_lowercase();
            if users.contains_key(&key) {
                return Err(Error::DuplicateUser { line: idx + 1, user: user.source_user });
            }
            users.insert(key, user);
        }
        Ok(Self { users })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn lookup(&self, source_user: &str) -> Option<&GitUser> {
        self.users.get(&source_user.to_lowercase())
    }

    /// Entries whose git display name equals `name`, ignoring case
    pub fn find_by_name(&self, name: &str) -> Vec<&GitUser> {
        let wanted = name.to_lowercase();
        let mut found: Vec<&GitUser> = self.users.values().filter(|u| u.name.to_lowercase() == wanted).collect();
        found.sort_by(|a, b| a.source_user.cmp(&b.source_user));
        found
    }

    /// Like `lookup`, but an unmapped user becomes an identity built from
    /// the raw name and a placeholder email under `fallback_domain`.
    pub fn resolve(&self, source_user: &str, fallback_domain: &str) -> GitUser {
        match self.lookup(source_user) {
            Some(user) => user.clone(),
            None => {
                debug!("No mapping for source user {:?}, using it verbatim", source_user);
                GitUser {
                    source_user: source_user.to_string(),
                    name: source_user.to_string(),
                    email: format!("{}@{}", source_user, fallback_domain),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS: &str = "\
# accurev|name|email
jdoe|John Doe|john@example.com

asmith|Alice Smith|alice@example.com
";

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let map = IdentityMap::parse(USERS).unwrap();
        assert_eq!(map.len(), 2);
        let user = map.lookup("jdoe").unwrap();
        assert_eq!(user.name, "John Doe");
        assert_eq!(user.email, "john@example.com");
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let map = IdentityMap::parse(USERS).unwrap();
        assert_eq!(map.lookup("ASmith").unwrap().name, "Alice Smith");
    }

    #[test]
    fn test_resolve_falls_back_to_raw_user() {
        let map = IdentityMap::parse(USERS).unwrap();
        let user = map.resolve("ghost", "localhost");
        assert_eq!(user.name, "ghost");
        assert_eq!(user.email, "ghost@localhost");
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let err = IdentityMap::parse("jdoe|John Doe|john@example.com\nbroken|only-two\n")
            .unwrap_err();
        assert!(matches!(err, Error::MalformedUser { line: 2, .. }));
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let map = IdentityMap::parse("jdoe|John Doe|john@example.com|contractor\n").unwrap();
        assert_eq!(map.lookup("jdoe").unwrap().email, "john@example.com");
    }

    #[test]
    fn test_find_by_name_ignores_case() {
        let map = IdentityMap::parse(USERS).unwrap();
        let found = map.find_by_name("alice smith");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source_user, "asmith");
        assert!(map.find_by_name("jdoe").is_empty());
    }

    #[test]
    fn test_duplicate_user_rejected() {
        let err = IdentityMap::parse("jdoe|A|a@x\nJDOE|B|b@x\n").unwrap_err();
        assert!(matches!(err, Error::DuplicateUser { line: 2, .. }));
    }

    #[test]
    fn test_display_formats_signature() {
        let map = IdentityMap::parse(USERS).unwrap();
        assert_eq!(map.lookup("jdoe").unwrap().to_string(), "John Doe <john@example.com>");
    }
}
