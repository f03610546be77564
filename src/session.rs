// src/session.rs

use crate::error::{Error, Result};
use crate::identity::IdentityMap;
use crate::model::{GitUser, StreamRef};

/// Everything a replay run needs to know up front
#[derive(Debug)]
pub struct Session {
    pub stream: StreamRef,
    pub identities: IdentityMap,
    /// Author of the synthetic root commit, when one is configured
    pub default_user: Option<GitUser>,
    pub fallback_email_domain: String,
}

impl Session {
    /// Fails when a default user name is given but missing from `identities`.
    /// The name may be either a source user or a git display name.
    pub fn new(
        stream: StreamRef,
        identities: IdentityMap,
        default_user_name: Option<&str>,
        fallback_email_domain: impl Into<String>,
    ) -> Result<Self> {
        let default_user = match default_user_name {
            Some(name) => Some(Self::find_default(&identities, name)?),
            None => None,
        };
        Ok(Self {
            stream,
            identities,
            default_user,
            fallback_email_domain: fallback_email_domain.into(),
        })
    }

    fn find_default(identities: &IdentityMap, name: &str) -> Result<GitUser> {
        if let Some(user) = identities.lookup(name) {
            return Ok(user.clone());
        }
        match identities.find_by_name(name).as_slice() {
            [user] => Ok((*user).clone()),
            [] => Err(Error::UnknownDefaultUser(name.to_string())),
            _ => Err(Error::AmbiguousDefaultUser(name.to_string())),
        }
    }

    pub fn resolve_user(&self, source_user: &str) -> GitUser {
        self.identities.resolve(source_user, &self.fallback_email_domain)
    }
}
