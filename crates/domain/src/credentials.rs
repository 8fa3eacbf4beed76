//! The enriched request: an inbound tool call plus the just-in-time
//! decrypted credential, alive only for the duration of one outbound call.
//!
//! `Credentials` cannot be cloned, serialized, or logged. The plaintext is
//! reachable only through [`Credentials::api_key`], and [`scrub`] replaces
//! it with a fixed non-secret pattern. Dropping an unscrubbed value scrubs
//! it as a backstop, so cancellation cannot leak a live key.
//!
//! [`scrub`]: Credentials::scrub

use serde_json::{Map, Value};
use uuid::Uuid;
use zeroize::Zeroize;

/// The fixed byte pattern a scrubbed key is overwritten with.
pub const SCRUB_PATTERN: &str = "****************";

/// A just-in-time decrypted credential bound to the agent it was
/// resolved for.
pub struct Credentials {
    api_key: String,
    agent_id: String,
}

impl Credentials {
    pub fn new(api_key: String, agent_id: impl Into<String>) -> Self {
        Self {
            api_key,
            agent_id: agent_id.into(),
        }
    }

    /// The plaintext API key. Empty-pattern after [`Credentials::scrub`].
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// The agent the credential was resolved for.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Overwrite the key material in place with [`SCRUB_PATTERN`].
    ///
    /// Zeroes the original buffer first so the plaintext bytes do not
    /// survive in the old allocation, then installs the marker pattern.
    /// Idempotent.
    pub fn scrub(&mut self) {
        self.api_key.zeroize();
        self.api_key.push_str(SCRUB_PATTERN);
    }

    /// Whether the key has been scrubbed.
    pub fn is_scrubbed(&self) -> bool {
        self.api_key == SCRUB_PATTERN
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("agent_id", &self.agent_id)
            .finish()
    }
}

// Intentionally: no Clone, no Serialize, no Display.

/// An inbound tool call enriched with its decrypted credential. Owned
/// exclusively by the orchestrator for the duration of one outbound call.
#[derive(Debug)]
pub struct EnrichedRequest {
    /// Tracking id for the outstanding-requests set.
    pub id: Uuid,
    /// The tool being invoked.
    pub tool_name: String,
    /// Arguments with any embedded auth field already stripped.
    pub arguments: Map<String, Value>,
    /// The decrypted credential block.
    pub credentials: Credentials,
}

impl EnrichedRequest {
    pub fn new(
        tool_name: impl Into<String>,
        arguments: Map<String, Value>,
        credentials: Credentials,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool_name: tool_name.into(),
            arguments,
            credentials,
        }
    }

    /// Scrub the credential block. Safe to call more than once.
    pub fn scrub(&mut self) {
        self.credentials.scrub();
    }
}
