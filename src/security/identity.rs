//! Caller key derivation.
//!
//! Every per-caller key (cache, rate limit, dedup) comes from the same
//! normalized identity, hashed to a fixed-width digest, so formatting noise
//! in the identity never splits one caller across keys.

use sha2::{Digest, Sha256};

/// Hashed caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerKey {
    digest: String,
}

impl CallerKey {
    /// Derive a key from an already-resolved caller identity.
    pub fn from_identity(identity: &str) -> Self {
        let normalized = normalize_identity(identity);
        let digest = hex::encode(Sha256::digest(normalized.as_bytes()));
        Self { digest }
    }

    /// Hex-encoded SHA-256 of the normalized identity.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Store key for one concern, e.g. `mediator:cache:<digest>`.
    pub fn scoped(&self, prefix: &str, scope: &str) -> String {
        format!("{}:{}:{}", prefix, scope, self.digest)
    }
}

impl std::fmt::Display for CallerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short form is enough to correlate log lines.
        write!(f, "{}", &self.digest[..12])
    }
}

/// Trim and lower-case an identity.
pub fn normalize_identity(identity: &str) -> String {
    identity.trim().to_lowercase()
}
