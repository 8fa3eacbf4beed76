//! Tamper-evident audit log.
//!
//! One JSON object per line, append-only. Every entry carries
//! `chainHash = hex16(SHA-256(prev_hash ‖ canonical(base entry)))`, so a
//! single-byte edit anywhere breaks the chain from that entry onward.
//! The first entry chains from the fixed genesis value.
//!
//! Appends are serialized under a mutex: the `last_hash` read, the file
//! write, and the `last_hash` update happen as one critical section.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use px_domain::error::{Error, Result};

/// The `prev_hash` of the first entry in a fresh log.
pub const GENESIS_HASH: &str = "0000000000000000";

/// Hex characters kept from the SHA-256 digest.
const CHAIN_HASH_LEN: usize = 16;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of a tool-call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Error,
}

/// What the orchestrator reports per call; the log stamps and chains it.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub agent_id: String,
    pub tool: String,
    pub status: AuditStatus,
    pub duration_ms: u64,
    /// Short error summary on failure. Never secret material.
    pub error: Option<String>,
}

/// A full audit line as persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub timestamp_utc: String,
    pub timestamp_local: String,
    #[serde(rename = "agentId")]
    pub agent_id: String,
    pub tool: String,
    /// Call duration in milliseconds.
    pub duration: u64,
    pub status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "chainHash")]
    pub chain_hash: String,
    #[serde(rename = "prevHash")]
    pub prev_hash: String,
}

/// The hashed portion of an entry: every field except the two hashes.
/// Field order is the canonical key order.
#[derive(Serialize)]
struct BaseEntry<'a> {
    timestamp_utc: &'a str,
    timestamp_local: &'a str,
    #[serde(rename = "agentId")]
    agent_id: &'a str,
    tool: &'a str,
    duration: u64,
    status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl AuditEntry {
    /// Canonical serialization of the base entry (stable key order).
    fn base_json(&self) -> String {
        let base = BaseEntry {
            timestamp_utc: &self.timestamp_utc,
            timestamp_local: &self.timestamp_local,
            agent_id: &self.agent_id,
            tool: &self.tool,
            duration: self.duration,
            status: self.status,
            error: self.error.as_deref(),
        };
        serde_json::to_string(&base).expect("base entry serializes")
    }

    /// The chain hash this entry should carry given `prev_hash`.
    fn expected_chain_hash(&self, prev_hash: &str) -> String {
        chain_hash(prev_hash, &self.base_json())
    }
}

/// `hex16(SHA-256(prev ‖ base))`.
fn chain_hash(prev: &str, base: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev.as_bytes());
    hasher.update(base.as_bytes());
    hex::encode(hasher.finalize())[..CHAIN_HASH_LEN].to_owned()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Log
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The append-only audit log. `last_hash` and the file append share one
/// mutex so concurrent calls serialize.
pub struct AuditLog {
    path: PathBuf,
    last_hash: Mutex<String>,
}

impl AuditLog {
    /// Open the log at `path`, resuming the chain from the last line.
    ///
    /// A missing file starts a fresh chain at the genesis hash. An
    /// unparsable last line also restarts at genesis; that silently
    /// severs continuity, so a warning names the file for the operator.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let last_hash = match Self::load_last_hash(path)? {
            Some(hash) => hash,
            None => GENESIS_HASH.to_owned(),
        };

        Ok(Self {
            path: path.to_owned(),
            last_hash: Mutex::new(last_hash),
        })
    }

    fn load_last_hash(path: &Path) -> Result<Option<String>> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let Some(last_line) = raw.lines().rev().find(|l| !l.trim().is_empty()) else {
            return Ok(None);
        };

        match serde_json::from_str::<AuditEntry>(last_line) {
            Ok(entry) => Ok(Some(entry.chain_hash)),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "last audit line is unparsable; restarting hash chain at genesis"
                );
                Ok(None)
            }
        }
    }

    /// The log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stamp, chain, and append one event. Returns the persisted entry.
    pub fn log(&self, event: AuditEvent) -> Result<AuditEntry> {
        let mut entry = AuditEntry {
            timestamp_utc: Utc::now().to_rfc3339(),
            timestamp_local: Local::now().format("%c").to_string(),
            agent_id: event.agent_id,
            tool: event.tool,
            duration: event.duration_ms,
            status: event.status,
            error: event.error,
            chain_hash: String::new(),
            prev_hash: String::new(),
        };

        let mut last = self.last_hash.lock();
        entry.prev_hash = last.clone();
        entry.chain_hash = entry.expected_chain_hash(&last);

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        // O_APPEND single write: concurrent appends cannot interleave.
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        *last = entry.chain_hash.clone();
        Ok(entry)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Verification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where and how a chain verification failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBreak {
    /// 1-based line number of the offending entry.
    pub line: usize,
    pub reason: String,
}

/// Result of replaying the whole file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    pub entries: usize,
    pub first_break: Option<ChainBreak>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.first_break.is_none()
    }
}

/// Replay the log, recomputing every chain hash from genesis.
pub fn verify_chain(path: &Path) -> Result<ChainReport> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ChainReport {
                entries: 0,
                first_break: None,
            })
        }
        Err(e) => return Err(Error::Io(e)),
    };

    let mut expected_prev = GENESIS_HASH.to_owned();
    let mut entries = 0usize;

    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;

        let entry: AuditEntry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(e) => {
                return Ok(ChainReport {
                    entries,
                    first_break: Some(ChainBreak {
                        line: line_no,
                        reason: format!("unparsable entry: {e}"),
                    }),
                })
            }
        };

        if entry.prev_hash != expected_prev {
            return Ok(ChainReport {
                entries,
                first_break: Some(ChainBreak {
                    line: line_no,
                    reason: format!(
                        "prevHash {} does not continue the chain (expected {})",
                        entry.prev_hash, expected_prev
                    ),
                }),
            });
        }

        let recomputed = entry.expected_chain_hash(&entry.prev_hash);
        if recomputed != entry.chain_hash {
            return Ok(ChainReport {
                entries,
                first_break: Some(ChainBreak {
                    line: line_no,
                    reason: format!(
                        "chainHash {} does not match recomputed {}",
                        entry.chain_hash, recomputed
                    ),
                }),
            });
        }

        expected_prev = entry.chain_hash;
        entries += 1;
    }

    Ok(ChainReport {
        entries,
        first_break: None,
    })
}
