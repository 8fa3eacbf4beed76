//! Just-in-time credential injection.
//!
//! The injector decouples the external tool surface from vault key
//! identifiers through a static name map, decrypts the secret the agent
//! is entitled to, and hands the orchestrator an enriched request. The
//! outstanding-requests set tracks every secret-bearing value currently
//! alive; it is an aid to reasoning, not a correctness guarantee.
//! Scrubbing is deterministic via [`Injector::scrub`] and the
//! enriched request's own drop path.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use uuid::Uuid;

use px_domain::credentials::{Credentials, EnrichedRequest};
use px_domain::error::Result;
use px_vault::VaultStore;

/// Map an external tool name to the vault secret name it draws from.
/// Unknown tool names map to themselves.
pub fn secret_name(tool: &str) -> &str {
    match tool {
        "gemini_generate" => "gemini_api_key",
        "slack_send_message" => "slack_bot_token",
        "gpg_sign" => "gpg_passphrase",
        other => other,
    }
}

/// Decrypts secrets per call and tracks outstanding enriched requests.
pub struct Injector {
    store: Arc<VaultStore>,
    outstanding: Mutex<HashSet<Uuid>>,
}

impl Injector {
    pub fn new(store: Arc<VaultStore>) -> Self {
        Self {
            store,
            outstanding: Mutex::new(HashSet::new()),
        }
    }

    /// Resolve the agent's label for `tool`, decrypt the backing secret,
    /// and build the enriched request.
    ///
    /// `arguments` must already have the reserved auth field stripped by
    /// the gatekeeper.
    pub fn inject(
        &self,
        tool: &str,
        arguments: Map<String, Value>,
        agent_id: &str,
    ) -> Result<EnrichedRequest> {
        let name = secret_name(tool);
        let label = self.store.get_mapping_label(agent_id, tool)?;
        let plaintext = self.store.get_secret(name, &label)?;

        let enriched = EnrichedRequest::new(
            tool,
            arguments,
            Credentials::new(plaintext.as_str().to_owned(), agent_id),
        );
        self.outstanding.lock().insert(enriched.id);

        tracing::debug!(
            tool,
            secret = name,
            label = %label,
            agent_id,
            "credentials injected"
        );
        Ok(enriched)
    }

    /// Overwrite the credential and deregister the request. Must run on
    /// every exit path of the orchestrator, including errors.
    pub fn scrub(&self, enriched: &mut EnrichedRequest) {
        enriched.scrub();
        self.outstanding.lock().remove(&enriched.id);
        tracing::debug!(tool = %enriched.tool_name, "credentials scrubbed");
    }

    /// Number of secret-bearing requests currently alive.
    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().len()
    }

    /// Close the underlying vault handle.
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}
