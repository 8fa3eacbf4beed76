//! GPG adapter.
//!
//! Produces an armored detached signature with the local `gpg` binary.
//! The injected credential is the signing-key passphrase, fed over
//! stdin in loopback pinentry mode so it touches neither argv nor the
//! environment. Signing is purely local, so the attempt budget is 1.

use std::process::Stdio;

use px_domain::credentials::EnrichedRequest;
use px_domain::error::{Error, Result};
use px_domain::tool::ToolResponse;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::traits::Caller;
use crate::util::truncate_body;

/// Caller for the `gpg_sign` tool.
pub struct GpgCaller {
    gpg_bin: String,
}

impl GpgCaller {
    pub fn new() -> Self {
        Self {
            gpg_bin: "gpg".into(),
        }
    }

    /// Use a specific gpg binary (tests point this at a stub).
    pub fn with_binary(gpg_bin: impl Into<String>) -> Self {
        Self {
            gpg_bin: gpg_bin.into(),
        }
    }
}

impl Default for GpgCaller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Caller for GpgCaller {
    async fn execute(&self, req: &EnrichedRequest) -> Result<ToolResponse> {
        let message = req
            .arguments
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("field 'message' is required".into()))?;
        let key_id = req.arguments.get("key_id").and_then(Value::as_str);

        // The payload goes through a temp file; stdin carries only the
        // passphrase (--passphrase-fd 0 consumes the first line).
        let payload = tempfile::NamedTempFile::new()?;
        std::fs::write(payload.path(), message.as_bytes())?;

        let mut cmd = Command::new(&self.gpg_bin);
        cmd.args([
            "--batch",
            "--yes",
            "--pinentry-mode",
            "loopback",
            "--passphrase-fd",
            "0",
            "--armor",
            "--detach-sign",
            "--output",
            "-",
        ]);
        if let Some(key_id) = key_id {
            cmd.args(["--local-user", key_id]);
        }
        cmd.arg(payload.path());
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Upstream {
                provider: "gpg".into(),
                message: format!("failed to spawn {}: {e}", self.gpg_bin),
            })?;

        {
            let mut stdin = child.stdin.take().expect("stdin piped");
            stdin
                .write_all(req.credentials.api_key().as_bytes())
                .await?;
            stdin.write_all(b"\n").await?;
            // Dropping stdin closes the pipe.
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Upstream {
                provider: "gpg".into(),
                message: format!(
                    "exit {}: {}",
                    output.status.code().unwrap_or(-1),
                    truncate_body(stderr.trim(), 200)
                ),
            });
        }

        let signature = String::from_utf8_lossy(&output.stdout).into_owned();
        Ok(ToolResponse::text(signature))
    }

    fn name(&self) -> &str {
        "gpg"
    }

    fn max_retries(&self) -> Option<u32> {
        Some(1)
    }
}
