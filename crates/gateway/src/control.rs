//! Control plane: the administrative operations behind the `pincer`
//! CLI. Each operation is a thin transaction over the vault store and
//! keychain; this module is the sole writer of administrative state.

use std::sync::Arc;

use rand::RngCore;
use zeroize::Zeroizing;

use px_domain::error::Result;
use px_vault::keychain::MASTER_KEY_LEN;
use px_vault::store::AgentRecord;
use px_vault::{Keychain, VaultStore};

pub struct ControlPlane {
    store: Arc<VaultStore>,
    keychain: Arc<dyn Keychain>,
}

impl ControlPlane {
    /// `keychain` must be the same instance the store was opened with.
    pub fn new(store: Arc<VaultStore>, keychain: Arc<dyn Keychain>) -> Self {
        Self { store, keychain }
    }

    /// Create the master key. Fails when one already exists.
    pub fn init(&self) -> Result<()> {
        let mut key = Zeroizing::new([0u8; MASTER_KEY_LEN]);
        rand::rngs::OsRng.fill_bytes(key.as_mut());
        self.keychain.write(&key)?;
        tracing::info!("master key created");
        Ok(())
    }

    /// Delete the master key only. Returns whether one existed.
    pub fn reset(&self) -> Result<bool> {
        let existed = self.keychain.delete()?;
        tracing::info!(existed, "master key deleted");
        Ok(existed)
    }

    /// Truncate all vault records, keeping the master key.
    pub fn clear_all(&self) -> Result<()> {
        self.store.clear_all()
    }

    /// Delete the master key, the database file, and its sidecars.
    /// Returns whether a master key existed.
    pub fn destroy(&self) -> Result<bool> {
        self.store.destroy()
    }

    pub fn set_secret(&self, tool: &str, label: &str, value: &str) -> Result<()> {
        self.store.set_secret(tool, label, value)
    }

    pub fn list_secrets(&self) -> Result<Vec<(String, Vec<String>)>> {
        self.store.list_secrets()
    }

    pub fn add_agent(&self, agent_id: &str, custom_token: Option<&str>) -> Result<String> {
        self.store.add_agent(agent_id, custom_token)
    }

    pub fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        self.store.list_agents()
    }

    pub fn authorize(&self, agent_id: &str, tool: &str, label: &str) -> Result<()> {
        self.store.set_mapping(agent_id, tool, label)
    }

    pub fn revoke(&self, agent_id: &str, tool: &str) -> Result<()> {
        self.store.revoke(agent_id, tool)
    }

    pub fn remove_agent(&self, agent_id: &str) -> Result<()> {
        self.store.remove_agent(agent_id)
    }
}
