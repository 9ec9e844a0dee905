//! Revision tags and conditional-request matching.
//!
//! All revision tags are hex-encoded BLAKE3 digests. The index stores
//! them unquoted; HTTP quoting and the weak-validator marker are
//! stripped from request candidates before comparison.

/// Revision tag for a document, derived from the body bytes alone, so
/// rewriting identical content yields an identical tag.
pub fn document(body: &[u8]) -> String {
    blake3::hash(body).to_hex().to_string()
}

/// Revision tag for a directory, derived from its path, the write
/// timestamp and the checksum of the document body that triggered the
/// update (`None` for delete cascades).
pub fn directory(path: &str, modified: i64, checksum: Option<&str>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(path.as_bytes());
    hasher.update(&modified.to_le_bytes());
    if let Some(checksum) = checksum {
        hasher.update(checksum.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Placeholder revision tag for a directory that has no stored record.
/// Stable per user and path, so `If-None-Match` keeps short-circuiting
/// reads of directories that were never written.
pub fn synthetic(user: &str, directory: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"empty");
    hasher.update(user.as_bytes());
    hasher.update(&[0]);
    hasher.update(directory.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Strips HTTP quoting and the weak marker from one header candidate.
///
/// Handles `"tag"`, `W/"tag"` and the malformed `"W/tag"` form some
/// clients send.
pub fn normalize(candidate: &str) -> &str {
    let mut value = candidate.trim();
    if let Some(rest) = value.strip_prefix('"') {
        if rest.starts_with("W/") {
            value = rest;
        }
    }
    value = value.strip_prefix("W/").unwrap_or(value);
    value = value.strip_prefix('"').unwrap_or(value);
    value.strip_suffix('"').unwrap_or(value)
}

/// Evaluates a comma-separated `If-Match`/`If-None-Match` header value
/// against a stored tag. True when any normalized candidate equals it.
///
/// `*` is never treated specially here; callers decide what a wildcard
/// means in their context via [`has_wildcard`].
pub fn any_match(header: &str, stored: &str) -> bool {
    header.split(',').any(|candidate| {
        let candidate = normalize(candidate);
        !candidate.is_empty() && candidate == stored
    })
}

/// True when the header value carries a `*` candidate.
pub fn has_wildcard(header: &str) -> bool {
    header.split(',').any(|candidate| candidate.trim() == "*")
}
