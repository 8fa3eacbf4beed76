//! Caller registry.
//!
//! The provider set is closed and known at build time, so dispatch is a
//! tagged variant; the registry maps external tool names onto variants.

use std::collections::HashMap;

use px_domain::credentials::EnrichedRequest;
use px_domain::error::Result;
use px_domain::tool::ToolResponse;

use crate::gemini::GeminiCaller;
use crate::gpg::GpgCaller;
use crate::slack::SlackCaller;
use crate::traits::Caller;

/// One of the known outbound adapters.
pub enum CallerKind {
    Gemini(GeminiCaller),
    Slack(SlackCaller),
    Gpg(GpgCaller),
    #[cfg(any(test, feature = "test-utils"))]
    Scripted(std::sync::Arc<crate::scripted::ScriptedCaller>),
}

#[async_trait::async_trait]
impl Caller for CallerKind {
    async fn execute(&self, req: &EnrichedRequest) -> Result<ToolResponse> {
        match self {
            Self::Gemini(c) => c.execute(req).await,
            Self::Slack(c) => c.execute(req).await,
            Self::Gpg(c) => c.execute(req).await,
            #[cfg(any(test, feature = "test-utils"))]
            Self::Scripted(c) => c.execute(req).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Gemini(c) => c.name(),
            Self::Slack(c) => c.name(),
            Self::Gpg(c) => c.name(),
            #[cfg(any(test, feature = "test-utils"))]
            Self::Scripted(c) => c.name(),
        }
    }

    fn max_retries(&self) -> Option<u32> {
        match self {
            Self::Gemini(c) => c.max_retries(),
            Self::Slack(c) => c.max_retries(),
            Self::Gpg(c) => c.max_retries(),
            #[cfg(any(test, feature = "test-utils"))]
            Self::Scripted(c) => c.max_retries(),
        }
    }
}

/// Tool-name-keyed registry of callers.
pub struct CallerRegistry {
    callers: HashMap<String, CallerKind>,
}

impl CallerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            callers: HashMap::new(),
        }
    }

    /// The standard tool set: Gemini generation, Slack messaging, GPG
    /// signing.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        registry.insert("gemini_generate", CallerKind::Gemini(GeminiCaller::new()?));
        registry.insert(
            "slack_send_message",
            CallerKind::Slack(SlackCaller::new()?),
        );
        registry.insert("gpg_sign", CallerKind::Gpg(GpgCaller::new()));
        Ok(registry)
    }

    /// Register (or replace) the caller for a tool name.
    pub fn insert(&mut self, tool: impl Into<String>, caller: CallerKind) {
        self.callers.insert(tool.into(), caller);
    }

    /// The caller registered for `tool`, if any.
    pub fn get(&self, tool: &str) -> Option<&CallerKind> {
        self.callers.get(tool)
    }

    pub fn len(&self) -> usize {
        self.callers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callers.is_empty()
    }
}

impl Default for CallerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
