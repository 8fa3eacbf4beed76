/// Shared error type used across all Pincer crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database: {0}")]
    Db(String),

    #[error("HTTP: {0}")]
    Http(String),

    /// Master key is absent from the OS credential store.
    #[error("vault not initialized: run `pincer init` first")]
    NotInitialized,

    /// `init` was attempted while a master key already exists.
    #[error("vault already initialized: a master key is present")]
    AlreadyInitialized,

    /// Host credential store I/O failure, surfaced verbatim.
    #[error("keychain: {0}")]
    Keychain(String),

    /// AEAD tag mismatch or wrong key during decryption.
    #[error("decryption failed: authentication tag mismatch (wrong or replaced master key, or tampered record)")]
    AuthFailure,

    /// No secret record for the (tool, label) pair.
    #[error("no secret stored for tool '{tool}' with label '{label}'")]
    SecretMissing { tool: String, label: String },

    /// Request carried no proxy token in any of the three sources.
    #[error("no proxy token found: checked _meta.pincer_token, arguments.__pincer_auth__, and env PINCER_PROXY_TOKEN")]
    MissingToken,

    /// Token does not match `pxr_` + >=21 URL-safe characters.
    #[error("malformed proxy token: expected pxr_ followed by at least 21 characters of [A-Za-z0-9_-]")]
    BadTokenFormat,

    /// Token does not resolve to a registered agent.
    #[error("proxy token does not match any registered agent")]
    UnknownToken,

    /// Agent lacks an authorization mapping for the tool.
    #[error("agent '{agent_id}' is not authorized for tool '{tool}'")]
    Forbidden { agent_id: String, tool: String },

    /// No caller registered for the tool name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments did not match the tool's registered schema.
    #[error("validation: {0}")]
    Validation(String),

    /// Outbound API responded non-2xx.
    #[error("{provider} API error: {message}")]
    Upstream { provider: String, message: String },

    /// All retry attempts failed; carries the final attempt's error text.
    #[error("{attempts} attempt(s) failed, giving up: {last}")]
    RetryExhausted { attempts: u32, last: String },

    /// Uniqueness violation on agent id or proxy token.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Revoke/remove target absent.
    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether this error is an upstream authentication/authorization
    /// failure. Auth errors short-circuit the retry loop: repeating a
    /// request with the same rejected credential cannot succeed.
    ///
    /// Classification uses the structured HTTP status when the caller
    /// recorded one in the message (the `401`/`403` digits survive into
    /// the text) and falls back to a substring scan otherwise. This is a
    /// policy decision, not an invariant.
    pub fn is_auth_error(&self) -> bool {
        let text = self.to_string().to_lowercase();
        ["unauthorized", "forbidden", "401", "403"]
            .iter()
            .any(|needle| text.contains(needle))
    }

    /// A short, single-line summary safe for audit entries. Never
    /// includes secret material because no constructor accepts any.
    pub fn summary(&self) -> String {
        let text = self.to_string();
        match text.split_once('\n') {
            Some((first, _)) => first.to_owned(),
            None => text,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_classification() {
        assert!(Error::Http("401 Unauthorized".into()).is_auth_error());
        assert!(Error::Http("status 403".into()).is_auth_error());
        assert!(Error::Upstream {
            provider: "slack".into(),
            message: "Forbidden".into(),
        }
        .is_auth_error());
        assert!(!Error::Http("500 Internal Server Error".into()).is_auth_error());
        assert!(!Error::Http("connection reset".into()).is_auth_error());
    }

    #[test]
    fn forbidden_names_agent_and_tool() {
        let err = Error::Forbidden {
            agent_id: "bot".into(),
            tool: "slack_send_message".into(),
        };
        let text = err.to_string();
        assert!(text.contains("bot"));
        assert!(text.contains("slack_send_message"));
    }

    #[test]
    fn missing_token_names_all_three_sources() {
        let text = Error::MissingToken.to_string();
        assert!(text.contains("_meta.pincer_token"));
        assert!(text.contains("__pincer_auth__"));
        assert!(text.contains("PINCER_PROXY_TOKEN"));
    }

    #[test]
    fn summary_is_single_line() {
        let err = Error::Validation("field 'prompt' is required\nsecond line".into());
        assert!(!err.summary().contains('\n'));
    }
}
