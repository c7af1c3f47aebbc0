//! Cache identity for query arguments.
//!
//! Every query maps to exactly one `QueryKey`. Argument values that derive
//! the same key share one cache entry, one in-flight request, and one
//! retention lifetime, no matter which extra fields the arguments carry.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Cache identity derived from query arguments.
///
/// Keys are plain strings so log lines and demo output stay readable
/// (`item:3` rather than an opaque hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derives a key from the hash of the whole argument value.
    ///
    /// For argument types with no natural short rendering. Engines that want
    /// a narrower identity (a subset of the fields) derive the key
    /// themselves from just those fields.
    pub fn hashed<T: Hash>(scope: &'static str, args: &T) -> Self {
        Self(format!("{scope}:{:016x}", hash_value(args)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for QueryKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

// ============================================================================
// Hash Utilities
// ============================================================================

/// Compute a hash for any hashable value.
pub fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
