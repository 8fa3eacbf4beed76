//! Persistent vault store.
//!
//! A single SQLite file holds three tables: encrypted secrets keyed by
//! `(tool_name, key_label)`, proxy tokens keyed by `agent_id`, and
//! agent-tool mappings. The store owns the only in-process copy of the
//! master key, lazily read from the keychain and zeroed on `close`.
//!
//! All single-statement mutations are atomic; `remove_agent`, `clear_all`,
//! and `destroy` run inside explicit transactions so partial failure
//! leaves a consistent state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use rusqlite::Connection;
use zeroize::Zeroizing;

use px_domain::error::{Error, Result};

use crate::cipher::{self, EncryptedSecret, NONCE_LEN, TAG_LEN};
use crate::keychain::{Keychain, MASTER_KEY_LEN};

/// Default key label when none is given.
pub const DEFAULT_LABEL: &str = "default";

/// Proxy-token prefix.
pub const TOKEN_PREFIX: &str = "pxr_";

/// Generated token body length (characters after the prefix).
pub const TOKEN_BODY_LEN: usize = 21;

const TOKEN_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS secrets (
    tool_name  TEXT NOT NULL,
    key_label  TEXT NOT NULL,
    ciphertext BLOB NOT NULL,
    nonce      BLOB NOT NULL,
    auth_tag   BLOB NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (tool_name, key_label)
);
CREATE TABLE IF NOT EXISTS proxy_tokens (
    agent_id    TEXT PRIMARY KEY,
    proxy_token TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_proxy_tokens_token
    ON proxy_tokens (proxy_token);
CREATE TABLE IF NOT EXISTS agent_mappings (
    agent_id  TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    key_label TEXT NOT NULL DEFAULT 'default',
    PRIMARY KEY (agent_id, tool_name)
);
CREATE INDEX IF NOT EXISTS idx_agent_mappings_lookup
    ON agent_mappings (agent_id, tool_name);
";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One agent as reported by `list_agents`.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub agent_id: String,
    pub proxy_token: String,
    pub grants: Vec<GrantRecord>,
}

/// One tool authorization held by an agent.
#[derive(Debug, Clone)]
pub struct GrantRecord {
    pub tool_name: String,
    pub key_label: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The vault store: one shared SQLite handle plus the cached master key.
pub struct VaultStore {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
    keychain: Arc<dyn Keychain>,
    master_key: Mutex<Option<Zeroizing<[u8; MASTER_KEY_LEN]>>>,
}

impl VaultStore {
    /// Open (or create) the vault database at `path`. The schema is
    /// created idempotently on first open.
    pub fn open(path: &Path, keychain: Arc<dyn Keychain>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(db_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        tracing::debug!(path = %path.display(), "vault store opened");

        Ok(Self {
            path: path.to_owned(),
            conn: Mutex::new(Some(conn)),
            keychain,
            master_key: Mutex::new(None),
        })
    }

    /// The database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── secrets ──────────────────────────────────────────────────────

    /// Encrypt `plaintext` and upsert it under `(tool, label)`.
    pub fn set_secret(&self, tool: &str, label: &str, plaintext: &str) -> Result<()> {
        let key = self.master_key()?;
        let record = cipher::encrypt(&key, plaintext.as_bytes())?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO secrets
                     (tool_name, key_label, ciphertext, nonce, auth_tag, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    tool,
                    label,
                    record.ciphertext,
                    record.nonce.as_slice(),
                    record.auth_tag.as_slice(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })?;

        tracing::info!(tool, label, "secret stored");
        Ok(())
    }

    /// Load and decrypt the secret for `(tool, label)`. The returned
    /// buffer zeroes itself on drop.
    pub fn get_secret(&self, tool: &str, label: &str) -> Result<Zeroizing<String>> {
        let record = self.with_conn(|conn| {
            conn.query_row(
                "SELECT ciphertext, nonce, auth_tag FROM secrets
                 WHERE tool_name = ?1 AND key_label = ?2",
                rusqlite::params![tool, label],
                |row| {
                    // Columns mapped explicitly by name; the row shape is
                    // never assumed positionally.
                    Ok((
                        row.get::<_, Vec<u8>>("ciphertext")?,
                        row.get::<_, Vec<u8>>("nonce")?,
                        row.get::<_, Vec<u8>>("auth_tag")?,
                    ))
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Error::SecretMissing {
                    tool: tool.to_owned(),
                    label: label.to_owned(),
                },
                other => db_err(other),
            })
        })?;

        let (ciphertext, nonce_bytes, tag_bytes) = record;
        // A nonce or tag of the wrong size means the record was tampered
        // with at rest; fail the same way a bad tag does.
        let nonce: [u8; NONCE_LEN] =
            nonce_bytes.try_into().map_err(|_| Error::AuthFailure)?;
        let auth_tag: [u8; TAG_LEN] =
            tag_bytes.try_into().map_err(|_| Error::AuthFailure)?;

        let key = self.master_key()?;
        let plaintext = cipher::decrypt(
            &key,
            &EncryptedSecret {
                ciphertext,
                nonce,
                auth_tag,
            },
        )?;

        String::from_utf8(plaintext.to_vec())
            .map(Zeroizing::new)
            .map_err(|_| Error::AuthFailure)
    }

    /// All stored secrets as `(tool, [label, …])`, sorted by tool then label.
    pub fn list_secrets(&self) -> Result<Vec<(String, Vec<String>)>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT tool_name, key_label FROM secrets
                     ORDER BY tool_name, key_label",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>("tool_name")?,
                        row.get::<_, String>("key_label")?,
                    ))
                })
                .map_err(db_err)?;

            let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
            for row in rows {
                let (tool, label) = row.map_err(db_err)?;
                match grouped.last_mut() {
                    Some((last_tool, labels)) if *last_tool == tool => labels.push(label),
                    _ => grouped.push((tool, vec![label])),
                }
            }
            Ok(grouped)
        })
    }

    // ── agents ───────────────────────────────────────────────────────

    /// Register an agent, generating a `pxr_` token unless a custom one
    /// is supplied. Returns the token.
    pub fn add_agent(&self, agent_id: &str, custom_token: Option<&str>) -> Result<String> {
        let token = match custom_token {
            Some(token) => {
                if !token_matches_format(token) {
                    tracing::warn!(
                        agent_id,
                        "custom token does not match the pxr_ format; \
                         requests carrying it will be rejected"
                    );
                }
                token.to_owned()
            }
            None => generate_token(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO proxy_tokens (agent_id, proxy_token, created_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![agent_id, token, Utc::now().to_rfc3339()],
            )
            .map_err(|e| conflict_err(e, agent_id))?;
            Ok(())
        })?;

        tracing::info!(agent_id, "agent registered");
        Ok(token)
    }

    /// Resolve a proxy token to its agent id.
    pub fn get_agent_by_token(&self, token: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT agent_id FROM proxy_tokens WHERE proxy_token = ?1",
                rusqlite::params![token],
                |row| row.get::<_, String>("agent_id"),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db_err(other)),
            })
        })
    }

    /// Upsert the `(agent, tool) -> label` authorization mapping.
    pub fn set_mapping(&self, agent_id: &str, tool: &str, label: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO agent_mappings (agent_id, tool_name, key_label)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![agent_id, tool, label],
            )
            .map_err(db_err)?;
            Ok(())
        })?;

        tracing::info!(agent_id, tool, label, "tool access granted");
        Ok(())
    }

    /// Whether a mapping exists for `(agent, tool)`.
    pub fn is_authorized(&self, agent_id: &str, tool: &str) -> Result<bool> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS(
                     SELECT 1 FROM agent_mappings
                     WHERE agent_id = ?1 AND tool_name = ?2)",
                rusqlite::params![agent_id, tool],
                |row| row.get::<_, bool>(0),
            )
            .map_err(db_err)
        })
    }

    /// The key label the agent is entitled to for `tool`, defaulting to
    /// `"default"` when no mapping exists.
    ///
    /// Not an authorization gate: callers must check [`Self::is_authorized`]
    /// explicitly before acting on the label.
    pub fn get_mapping_label(&self, agent_id: &str, tool: &str) -> Result<String> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT key_label FROM agent_mappings
                 WHERE agent_id = ?1 AND tool_name = ?2",
                rusqlite::params![agent_id, tool],
                |row| row.get::<_, String>("key_label"),
            )
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(DEFAULT_LABEL.to_owned()),
                other => Err(db_err(other)),
            })
        })
    }

    /// Every agent with its token and granted tools, sorted by agent id.
    pub fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        self.with_conn(|conn| {
            let mut agents: Vec<AgentRecord> = {
                let mut stmt = conn
                    .prepare(
                        "SELECT agent_id, proxy_token FROM proxy_tokens
                         ORDER BY agent_id",
                    )
                    .map_err(db_err)?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(AgentRecord {
                            agent_id: row.get("agent_id")?,
                            proxy_token: row.get("proxy_token")?,
                            grants: Vec::new(),
                        })
                    })
                    .map_err(db_err)?;
                rows.collect::<std::result::Result<_, _>>().map_err(db_err)?
            };

            let mut stmt = conn
                .prepare(
                    "SELECT tool_name, key_label FROM agent_mappings
                     WHERE agent_id = ?1 ORDER BY tool_name",
                )
                .map_err(db_err)?;
            for agent in &mut agents {
                let rows = stmt
                    .query_map(rusqlite::params![agent.agent_id], |row| {
                        Ok(GrantRecord {
                            tool_name: row.get("tool_name")?,
                            key_label: row.get("key_label")?,
                        })
                    })
                    .map_err(db_err)?;
                agent.grants =
                    rows.collect::<std::result::Result<_, _>>().map_err(db_err)?;
            }
            Ok(agents)
        })
    }

    /// Withdraw one `(agent, tool)` authorization.
    pub fn revoke(&self, agent_id: &str, tool: &str) -> Result<()> {
        let deleted = self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM agent_mappings WHERE agent_id = ?1 AND tool_name = ?2",
                rusqlite::params![agent_id, tool],
            )
            .map_err(db_err)
        })?;

        if deleted == 0 {
            return Err(Error::NotFound(format!(
                "no authorization for agent '{agent_id}' on tool '{tool}'"
            )));
        }
        tracing::info!(agent_id, tool, "tool access revoked");
        Ok(())
    }

    /// Remove an agent: all its mappings, then its token record, in one
    /// transaction.
    pub fn remove_agent(&self, agent_id: &str) -> Result<()> {
        let mut guard = self.conn.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| Error::Db("vault store is closed".into()))?;

        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            "DELETE FROM agent_mappings WHERE agent_id = ?1",
            rusqlite::params![agent_id],
        )
        .map_err(db_err)?;
        let deleted = tx
            .execute(
                "DELETE FROM proxy_tokens WHERE agent_id = ?1",
                rusqlite::params![agent_id],
            )
            .map_err(db_err)?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("no agent '{agent_id}'")));
        }
        tx.commit().map_err(db_err)?;

        tracing::info!(agent_id, "agent removed");
        Ok(())
    }

    // ── lifecycle ────────────────────────────────────────────────────

    /// Truncate secrets, tokens, and mappings. The master key stays.
    pub fn clear_all(&self) -> Result<()> {
        let mut guard = self.conn.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| Error::Db("vault store is closed".into()))?;

        let tx = conn.transaction().map_err(db_err)?;
        for table in ["secrets", "proxy_tokens", "agent_mappings"] {
            tx.execute(&format!("DELETE FROM {table}"), [])
                .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;

        tracing::info!("vault cleared (master key retained)");
        Ok(())
    }

    /// Close the store, delete the master key from the OS store, and
    /// remove the database file with its sidecars. Returns whether a
    /// master key existed.
    pub fn destroy(&self) -> Result<bool> {
        self.close()?;

        let key_existed = self.keychain.delete()?;

        for path in [
            self.path.clone(),
            sidecar(&self.path, "-wal"),
            sidecar(&self.path, "-shm"),
        ] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(
            path = %self.path.display(),
            key_existed,
            "vault destroyed"
        );
        Ok(key_existed)
    }

    /// Close the DB handle and zero the cached master key. Runs on every
    /// shutdown path; calling it twice is harmless.
    pub fn close(&self) -> Result<()> {
        *self.master_key.lock() = None;

        if let Some(conn) = self.conn.lock().take() {
            conn.close().map_err(|(_, e)| db_err(e))?;
            tracing::debug!(path = %self.path.display(), "vault store closed");
        }
        Ok(())
    }

    // ── internals ────────────────────────────────────────────────────

    /// The cached master key, read from the keychain on first use.
    /// The returned copy zeroes itself on drop.
    fn master_key(&self) -> Result<Zeroizing<[u8; MASTER_KEY_LEN]>> {
        let mut guard = self.master_key.lock();
        if guard.is_none() {
            *guard = Some(self.keychain.read()?);
        }
        Ok(guard.as_ref().expect("cache populated above").clone())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| Error::Db("vault store is closed".into()))?;
        f(conn)
    }
}

impl Drop for VaultStore {
    fn drop(&mut self) {
        // Zero the key even when close() was never reached.
        *self.master_key.lock() = None;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Generate a fresh `pxr_` proxy token: 21 characters drawn from the
/// URL-safe alphabet by the thread-local CSPRNG.
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let body: String = (0..TOKEN_BODY_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect();
    format!("{TOKEN_PREFIX}{body}")
}

/// Whether `token` matches `pxr_` + >=21 URL-safe characters.
pub fn token_matches_format(token: &str) -> bool {
    match token.strip_prefix(TOKEN_PREFIX) {
        Some(body) => {
            body.len() >= TOKEN_BODY_LEN
                && body
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        }
        None => false,
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::Db(e.to_string())
}

fn conflict_err(e: rusqlite::Error, agent_id: &str) -> Error {
    if let rusqlite::Error::SqliteFailure(f, _) = &e {
        if f.code == rusqlite::ErrorCode::ConstraintViolation {
            return Error::Conflict(format!(
                "agent id or proxy token already registered (agent '{agent_id}')"
            ));
        }
    }
    db_err(e)
}
