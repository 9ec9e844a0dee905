//! Authorization grants.
//!
//! A token carries a set of `scope:permission` strings, where the scope
//! is a path prefix (no trailing slash, empty for the whole tree) and
//! the permission is `r` or `rw`.

use std::fmt;

/// Access level a grant confers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Permission {
    Read,
    ReadWrite,
}

impl Permission {
    /// True when this permission satisfies an operation needing `needed`.
    pub fn covers(self, needed: Permission) -> bool {
        self == Permission::ReadWrite || needed == Permission::Read
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Read => f.write_str("r"),
            Permission::ReadWrite => f.write_str("rw"),
        }
    }
}

/// One parsed `scope:permission` grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGrant {
    /// Path prefix without a trailing slash; empty matches everything.
    pub scope: String,
    pub permission: Permission,
}

impl AuthorizationGrant {
    pub fn new(scope: impl Into<String>, permission: Permission) -> AuthorizationGrant {
        let mut scope = scope.into();
        while scope.ends_with('/') {
            scope.pop();
        }
        AuthorizationGrant { scope, permission }
    }

    /// Parses a raw `scope:permission` string. Returns `None` for
    /// anything that is not exactly `r` or `rw` after the final colon.
    pub fn parse(raw: &str) -> Option<AuthorizationGrant> {
        let (scope, permission) = raw.rsplit_once(':')?;
        let permission = match permission {
            "r" => Permission::Read,
            "rw" => Permission::ReadWrite,
            _ => return None,
        };
        Some(AuthorizationGrant::new(scope, permission))
    }

    /// True when `path` falls under this grant's scope. Prefixes match
    /// on whole segments: `food` covers `food` and `food/...`, never
    /// `foodtruck`.
    pub fn matches(&self, path: &str) -> bool {
        if self.scope.is_empty() {
            return true;
        }
        match path.strip_prefix(self.scope.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with('/'),
            None => false,
        }
    }
}

impl fmt::Display for AuthorizationGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.permission)
    }
}

/// Resolves the permission the grant set confers on `path`.
///
/// A `rw` grant anywhere on the matched chain wins outright, even over a
/// more specific read-only grant; otherwise any match confers read.
pub fn granted(grants: &[AuthorizationGrant], path: &str) -> Option<Permission> {
    let mut matched = false;
    for grant in grants {
        if !grant.matches(path) {
            continue;
        }
        if grant.permission == Permission::ReadWrite {
            return Some(Permission::ReadWrite);
        }
        matched = true;
    }
    matched.then_some(Permission::Read)
}

/// True when the grant set allows `needed` on `path`.
pub fn allows(grants: &[AuthorizationGrant], path: &str, needed: Permission) -> bool {
    granted(grants, path).is_some_and(|permission| permission.covers(needed))
}
