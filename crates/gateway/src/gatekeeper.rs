//! Request authentication.
//!
//! Extracts the proxy token from one of three sources (priority order:
//! request metadata, embedded argument, environment), checks its format,
//! resolves it to an agent, and verifies the agent's tool authorization.
//! Every call re-reads the vault; nothing is cached here.
//!
//! No custom token comparison exists in this module (resolution happens
//! inside the database engine), so no timing oracle is added on top.

use std::sync::Arc;

use serde_json::Value;

use px_domain::config::PROXY_TOKEN_ENV;
use px_domain::error::{Error, Result};
use px_domain::tool::ToolCallParams;
use px_vault::store::token_matches_format;
use px_vault::VaultStore;

/// Metadata field carrying the proxy token.
pub const META_TOKEN_FIELD: &str = "pincer_token";

/// Reserved argument field carrying the proxy token.
pub const ARGS_TOKEN_FIELD: &str = "__pincer_auth__";

/// A successfully authenticated request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub agent_id: String,
    pub proxy_token: String,
}

/// Authenticates inbound tool calls against the vault.
pub struct Gatekeeper {
    store: Arc<VaultStore>,
}

impl Gatekeeper {
    pub fn new(store: Arc<VaultStore>) -> Self {
        Self { store }
    }

    /// Authenticate a call. Mutates `params`: the reserved
    /// `__pincer_auth__` argument is always stripped so the token can
    /// never pass through to an external API.
    pub fn authenticate(&self, params: &mut ToolCallParams) -> Result<AuthContext> {
        let token = extract_token(params)?;

        if !token_matches_format(&token) {
            return Err(Error::BadTokenFormat);
        }

        let agent_id = self
            .store
            .get_agent_by_token(&token)?
            .ok_or(Error::UnknownToken)?;

        if !self.store.is_authorized(&agent_id, &params.name)? {
            return Err(Error::Forbidden {
                agent_id,
                tool: params.name.clone(),
            });
        }

        tracing::debug!(agent_id = %agent_id, tool = %params.name, "request authenticated");
        Ok(AuthContext {
            agent_id,
            proxy_token: token,
        })
    }

    /// Close the underlying vault handle.
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}

/// Walk the three token sources in priority order. The embedded
/// argument is removed whether or not it ends up being the winning
/// source.
fn extract_token(params: &mut ToolCallParams) -> Result<String> {
    let embedded = params
        .arguments
        .as_mut()
        .and_then(|args| args.remove(ARGS_TOKEN_FIELD));

    if let Some(meta_token) = params
        .meta
        .as_ref()
        .and_then(|meta| meta.get(META_TOKEN_FIELD))
        .and_then(Value::as_str)
    {
        return Ok(meta_token.to_owned());
    }

    match embedded {
        Some(Value::String(token)) => return Ok(token),
        Some(_) => {
            tracing::warn!(
                field = ARGS_TOKEN_FIELD,
                "embedded auth field was not a string; ignoring"
            );
        }
        None => {}
    }

    if let Ok(env_token) = std::env::var(PROXY_TOKEN_ENV) {
        if !env_token.is_empty() {
            return Ok(env_token);
        }
    }

    Err(Error::MissingToken)
}
