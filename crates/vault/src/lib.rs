//! The encrypted vault: a two-tier store where a 32-byte master key lives
//! in the OS credential store and every secret record is AES-256-GCM
//! encrypted under it inside a local SQLite file.
//!
//! The [`store::VaultStore`] owns the only in-process copy of the master
//! key and zeroes it on close; the [`cipher`] module never caches key
//! material of its own.

pub mod cipher;
pub mod keychain;
pub mod store;

pub use keychain::{Keychain, PlatformKeychain};
pub use store::VaultStore;

#[cfg(any(test, feature = "test-utils"))]
pub use keychain::MemoryKeychain;
