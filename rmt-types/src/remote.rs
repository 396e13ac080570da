//! Remote location parsing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ValidationError;

/// A remote directory in `[user@]host:path` form.
///
/// The authority (`user@host` or `host`) is what gets handed to the remote
/// transport; the path is interpreted by the remote side.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteSpec {
    authority: String,
    path: String,
}

impl RemoteSpec {
    /// Parse and validate a remote spec.
    pub fn parse(spec: &str) -> Result<Self, ValidationError> {
        let reject = |reason| ValidationError::RemoteSpec {
            spec: spec.to_string(),
            reason,
        };

        let (authority, path) = spec.split_once(':').ok_or_else(|| reject("missing ':'"))?;
        if authority.is_empty() {
            return Err(reject("empty host"));
        }
        if path.is_empty() {
            return Err(reject("empty remote path"));
        }
        if path.starts_with('~') && path != "~" && !path.starts_with("~/") {
            return Err(reject("only '~' or '~/' may start a home-relative path"));
        }
        if authority.starts_with('-') {
            return Err(reject("host must not start with '-'"));
        }
        if authority.chars().any(char::is_whitespace) {
            return Err(reject("host contains whitespace"));
        }
        if let Some((user, host)) = authority.split_once('@') {
            if user.is_empty() {
                return Err(reject("empty user before '@'"));
            }
            if host.is_empty() || host.contains('@') {
                return Err(reject("malformed user@host"));
            }
        }

        Ok(Self {
            authority: authority.to_string(),
            path: path.to_string(),
        })
    }

    /// `user@host` or `host`.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Remote directory path, as given.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Remote path of a file below the mount root, e.g. `/data/dir/a.txt`.
    pub fn remote_path(&self, rel: &str) -> String {
        let rel = rel.trim_start_matches('/');
        if rel.is_empty() {
            return self.path.clone();
        }
        let root = self.path.trim_end_matches('/');
        format!("{}/{}", root, rel)
    }

    /// Transfer address of a file below the mount root, e.g. `host:/data/a.txt`.
    pub fn address_of(&self, rel: &str) -> String {
        format!("{}:{}", self.authority, self.remote_path(rel))
    }

    /// Transfer address of the mount root as a directory (trailing slash).
    pub fn tree_address(&self) -> String {
        format!("{}:{}/", self.authority, self.path.trim_end_matches('/'))
    }
}

impl fmt::Display for RemoteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.authority, self.path)
    }
}

impl fmt::Debug for RemoteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteSpec({})", self)
    }
}

impl FromStr for RemoteSpec {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RemoteSpec {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RemoteSpec> for String {
    fn from(spec: RemoteSpec) -> Self {
        spec.to_string()
    }
}
