//! Per-call pipeline: authenticate, validate, dispatch, inject, execute,
//! scrub, log.
//!
//! The enriched request lives inside a scope guard: whatever path the
//! call takes out of this module (success, error, or a dropped future
//! on cancellation), the credential is scrubbed before the value is
//! released. Every attempt, failed or not, produces exactly one audit
//! entry; pre-authentication failures are attributed to `"unknown"`.

use std::sync::Arc;
use std::time::Instant;

use px_audit::{AuditEvent, AuditLog, AuditStatus};
use px_callers::{execute_with_retry, CallerRegistry, RetryPolicy};
use px_domain::config::Config;
use px_domain::credentials::EnrichedRequest;
use px_domain::error::{Error, Result};
use px_domain::tool::{ToolCallRequest, ToolDefinition, ToolResponse};
use px_vault::VaultStore;

use crate::gatekeeper::Gatekeeper;
use crate::injector::Injector;
use crate::schema::{ArgumentValidator, RequiredFieldsValidator};
use crate::tools;

/// Ties the gatekeeper, injector, caller registry, validator, and audit
/// log into the per-call pipeline.
pub struct Orchestrator {
    gatekeeper: Gatekeeper,
    injector: Injector,
    registry: CallerRegistry,
    validator: Box<dyn ArgumentValidator>,
    audit: AuditLog,
    tool_defs: Vec<ToolDefinition>,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        store: Arc<VaultStore>,
        registry: CallerRegistry,
        audit: AuditLog,
        config: &Config,
    ) -> Self {
        Self {
            gatekeeper: Gatekeeper::new(store.clone()),
            injector: Injector::new(store),
            registry,
            validator: Box::new(RequiredFieldsValidator),
            audit,
            tool_defs: tools::tool_definitions(),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                retry_delay_ms: config.retry_delay_ms,
            },
        }
    }

    /// Swap in a host-provided argument validator.
    pub fn with_validator(mut self, validator: Box<dyn ArgumentValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Execute one tool call through the full pipeline.
    pub async fn call_tool(&self, request: ToolCallRequest) -> Result<ToolResponse> {
        let started = Instant::now();
        let mut params = request.params;
        let tool = params.name.clone();

        let auth = match self.gatekeeper.authenticate(&mut params) {
            Ok(auth) => auth,
            Err(e) => {
                self.audit_outcome("unknown", &tool, started, Some(&e));
                return Err(e);
            }
        };

        let arguments = params.arguments.take().unwrap_or_default();

        if let Some(def) = self.tool_defs.iter().find(|d| d.name == tool) {
            if let Err(e) = self.validator.validate(def, &arguments) {
                self.audit_outcome(&auth.agent_id, &tool, started, Some(&e));
                return Err(e);
            }
        }

        let Some(caller) = self.registry.get(&tool) else {
            let e = Error::UnknownTool(tool.clone());
            self.audit_outcome(&auth.agent_id, &tool, started, Some(&e));
            return Err(e);
        };

        let enriched = match self.injector.inject(&tool, arguments, &auth.agent_id) {
            Ok(enriched) => enriched,
            Err(e) => {
                self.audit_outcome(&auth.agent_id, &tool, started, Some(&e));
                return Err(e);
            }
        };

        // From here on the credential exists in memory; the guard scrubs
        // it on every way out, including a dropped future.
        let mut guard = ScrubGuard::new(&self.injector, enriched);
        let result = execute_with_retry(caller, guard.request(), &self.retry).await;
        guard.release();

        match &result {
            Ok(_) => self.audit_outcome(&auth.agent_id, &tool, started, None),
            Err(e) => self.audit_outcome(&auth.agent_id, &tool, started, Some(e)),
        }
        result
    }

    /// The advertised tool definitions. Discovery requires no
    /// authentication.
    pub fn list_tools(&self) -> &[ToolDefinition] {
        &self.tool_defs
    }

    /// Number of secret-bearing requests currently alive.
    pub fn outstanding_requests(&self) -> usize {
        self.injector.outstanding()
    }

    /// Shut down: close the vault handles, zeroing the cached master key.
    pub fn close(&self) -> Result<()> {
        self.gatekeeper.close()?;
        self.injector.close()
    }

    fn audit_outcome(&self, agent_id: &str, tool: &str, started: Instant, error: Option<&Error>) {
        let event = AuditEvent {
            agent_id: agent_id.to_owned(),
            tool: tool.to_owned(),
            status: if error.is_some() {
                AuditStatus::Error
            } else {
                AuditStatus::Success
            },
            duration_ms: started.elapsed().as_millis() as u64,
            error: error.map(Error::summary),
        };

        // An audit write failure must not mask the call's own outcome.
        if let Err(e) = self.audit.log(event) {
            tracing::error!(error = %e, tool, "failed to append audit entry");
        }
    }
}

/// Scope guard holding the enriched request: scrubs on release and,
/// as the cancellation backstop, on drop.
struct ScrubGuard<'a> {
    injector: &'a Injector,
    enriched: Option<EnrichedRequest>,
}

impl<'a> ScrubGuard<'a> {
    fn new(injector: &'a Injector, enriched: EnrichedRequest) -> Self {
        Self {
            injector,
            enriched: Some(enriched),
        }
    }

    fn request(&self) -> &EnrichedRequest {
        self.enriched.as_ref().expect("request alive until release")
    }

    fn release(&mut self) {
        if let Some(mut enriched) = self.enriched.take() {
            self.injector.scrub(&mut enriched);
        }
    }
}

impl Drop for ScrubGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
