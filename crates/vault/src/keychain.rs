//! OS credential store adapter for the master key.
//!
//! The service/account pair is fixed at compile time so every process on
//! the host resolves the same vault. The key is stored as lowercase hex.
//! Uses the `keyring` crate, which wraps the platform-native stores
//! (macOS Keychain, Windows Credential Manager, Linux Secret Service).

use px_domain::error::{Error, Result};
use zeroize::Zeroizing;

/// Keychain service identifier shared by all Pincer processes.
pub const KEYCHAIN_SERVICE: &str = "pincer-vault";

/// Keychain account under which the master key is stored.
pub const KEYCHAIN_ACCOUNT: &str = "master-key";

/// Master key length in bytes.
pub const MASTER_KEY_LEN: usize = 32;

/// Access to the host credential store.
///
/// `delete` reports whether an entry existed: callers surface the
/// distinction ("master key removed" vs "no master key present") and
/// operators depend on it.
pub trait Keychain: Send + Sync {
    /// Read the master key. [`Error::NotInitialized`] when absent.
    fn read(&self) -> Result<Zeroizing<[u8; MASTER_KEY_LEN]>>;

    /// Store a new master key. [`Error::AlreadyInitialized`] when one
    /// is already present.
    fn write(&self, key: &[u8; MASTER_KEY_LEN]) -> Result<()>;

    /// Remove the master key. Returns `true` when an entry was deleted,
    /// `false` when none existed.
    fn delete(&self) -> Result<bool>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Platform implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The real OS-backed keychain.
#[derive(Debug, Default)]
pub struct PlatformKeychain;

impl PlatformKeychain {
    pub fn new() -> Self {
        Self
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT)
            .map_err(|e| Error::Keychain(format!("keyring entry creation failed: {e}")))
    }
}

impl Keychain for PlatformKeychain {
    fn read(&self) -> Result<Zeroizing<[u8; MASTER_KEY_LEN]>> {
        let encoded = match self.entry()?.get_password() {
            Ok(value) => Zeroizing::new(value),
            Err(keyring::Error::NoEntry) => return Err(Error::NotInitialized),
            Err(e) => return Err(Error::Keychain(format!("keyring read failed: {e}"))),
        };

        let bytes = Zeroizing::new(hex::decode(encoded.as_bytes()).map_err(|_| {
            Error::Keychain("stored master key is not valid hex".into())
        })?);
        if bytes.len() != MASTER_KEY_LEN {
            return Err(Error::Keychain(format!(
                "stored master key has wrong length: {} bytes, expected {}",
                bytes.len(),
                MASTER_KEY_LEN
            )));
        }

        let mut key = Zeroizing::new([0u8; MASTER_KEY_LEN]);
        key.copy_from_slice(&bytes);
        Ok(key)
    }

    fn write(&self, key: &[u8; MASTER_KEY_LEN]) -> Result<()> {
        let entry = self.entry()?;
        match entry.get_password() {
            Ok(_) => return Err(Error::AlreadyInitialized),
            Err(keyring::Error::NoEntry) => {}
            Err(e) => return Err(Error::Keychain(format!("keyring read failed: {e}"))),
        }

        let encoded = Zeroizing::new(hex::encode(key));
        entry
            .set_password(&encoded)
            .map_err(|e| Error::Keychain(format!("keyring write failed: {e}")))
    }

    fn delete(&self) -> Result<bool> {
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(Error::Keychain(format!("keyring delete failed: {e}"))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory implementation (tests, headless CI)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An in-memory keychain with the same contract as the platform one.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MemoryKeychain {
    slot: parking_lot::Mutex<Option<Zeroizing<[u8; MASTER_KEY_LEN]>>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MemoryKeychain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A keychain pre-seeded with the given key.
    pub fn with_key(key: [u8; MASTER_KEY_LEN]) -> Self {
        Self {
            slot: parking_lot::Mutex::new(Some(Zeroizing::new(key))),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Keychain for MemoryKeychain {
    fn read(&self) -> Result<Zeroizing<[u8; MASTER_KEY_LEN]>> {
        self.slot.lock().clone().ok_or(Error::NotInitialized)
    }

    fn write(&self, key: &[u8; MASTER_KEY_LEN]) -> Result<()> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        *slot = Some(Zeroizing::new(*key));
        Ok(())
    }

    fn delete(&self) -> Result<bool> {
        Ok(self.slot.lock().take().is_some())
    }
}
