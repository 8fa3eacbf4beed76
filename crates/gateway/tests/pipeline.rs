//! End-to-end pipeline tests: vault, gatekeeper, injector, scripted
//! caller, and audit log wired together the way the host would run them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use px_audit::{verify_chain, AuditLog};
use px_callers::{CallerKind, CallerRegistry, ScriptedCaller};
use px_domain::config::Config;
use px_domain::error::Error;
use px_domain::tool::{ToolCallParams, ToolCallRequest, ToolResponse};
use px_gateway::orchestrator::Orchestrator;
use px_vault::{MemoryKeychain, VaultStore};

struct Harness {
    _dir: tempfile::TempDir,
    orchestrator: Orchestrator,
    caller: Arc<ScriptedCaller>,
    audit_path: PathBuf,
    token: String,
}

/// A gateway with one registered agent ("bot"), a Gemini secret, and a
/// scripted caller standing in for the `gemini_generate` upstream.
fn harness(script: Vec<Result<ToolResponse, Error>>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("vault.db");
    let audit_path = dir.path().join("audit.jsonl");

    let keychain = Arc::new(MemoryKeychain::with_key([0x42; 32]));
    let store = Arc::new(VaultStore::open(&db_path, keychain).unwrap());
    store
        .set_secret("gemini_api_key", "default", "AIza_REAL")
        .unwrap();
    let token = store.add_agent("bot", None).unwrap();
    store
        .set_mapping("bot", "gemini_generate", "default")
        .unwrap();
    store.set_mapping("bot", "mystery_tool", "default").unwrap();

    let caller = Arc::new(ScriptedCaller::new(script));
    let mut registry = CallerRegistry::new();
    registry.insert("gemini_generate", CallerKind::Scripted(caller.clone()));

    let audit = AuditLog::open(&audit_path).unwrap();
    let config = Config {
        vault_db_path: db_path,
        audit_log_path: audit_path.clone(),
        max_retries: 3,
        retry_delay_ms: 1_000,
    };
    let orchestrator = Orchestrator::new(store, registry, audit, &config);

    Harness {
        _dir: dir,
        orchestrator,
        caller,
        audit_path,
        token,
    }
}

fn request(tool: &str, token: Option<&str>, args: Value) -> ToolCallRequest {
    let meta = token.map(|t| {
        let mut meta = Map::new();
        meta.insert("pincer_token".into(), Value::String(t.into()));
        meta
    });
    ToolCallRequest {
        params: ToolCallParams {
            name: tool.into(),
            arguments: args.as_object().cloned(),
            meta,
        },
    }
}

fn audit_entries(path: &std::path::Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

// ── scenarios ─────────────────────────────────────────────────────────

#[tokio::test]
async fn happy_path_injects_and_audits_success() {
    let h = harness(vec![Ok(ToolResponse::text("synthetic success"))]);

    let resp = h
        .orchestrator
        .call_tool(request(
            "gemini_generate",
            Some(&h.token),
            serde_json::json!({ "prompt": "hello" }),
        ))
        .await
        .unwrap();

    assert_eq!(resp, ToolResponse::text("synthetic success"));

    // The caller saw the real decrypted key bound to the right agent.
    let observed = h.caller.observed();
    assert_eq!(observed.len(), 1);
    assert_eq!(observed[0].api_key, "AIza_REAL");
    assert_eq!(observed[0].agent_id, "bot");

    // Nothing secret-bearing is left alive.
    assert_eq!(h.orchestrator.outstanding_requests(), 0);

    let entries = audit_entries(&h.audit_path);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["status"], "success");
    assert_eq!(entries[0]["agentId"], "bot");
    assert_eq!(entries[0]["tool"], "gemini_generate");
}

#[tokio::test]
async fn missing_token_names_sources_and_audits_unknown_agent() {
    let h = harness(vec![]);

    let err = h
        .orchestrator
        .call_tool(request(
            "gemini_generate",
            None,
            serde_json::json!({ "prompt": "hello" }),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MissingToken));
    let text = err.to_string();
    assert!(text.contains("_meta.pincer_token"));
    assert!(text.contains("__pincer_auth__"));
    assert!(text.contains("PINCER_PROXY_TOKEN"));

    assert_eq!(h.caller.attempts(), 0);
    let entries = audit_entries(&h.audit_path);
    assert_eq!(entries[0]["status"], "error");
    assert_eq!(entries[0]["agentId"], "unknown");
}

#[tokio::test]
async fn unauthorized_tool_is_forbidden() {
    let h = harness(vec![]);

    let err = h
        .orchestrator
        .call_tool(request(
            "slack_send_message",
            Some(&h.token),
            serde_json::json!({ "channel": "#general", "text": "hi" }),
        ))
        .await
        .unwrap_err();

    let text = err.to_string();
    assert!(matches!(err, Error::Forbidden { .. }));
    assert!(text.contains("bot"));
    assert!(text.contains("slack_send_message"));

    let entries = audit_entries(&h.audit_path);
    assert_eq!(entries[0]["status"], "error");
}

#[tokio::test]
async fn embedded_token_never_reaches_the_caller() {
    let h = harness(vec![Ok(ToolResponse::text("ok"))]);

    let mut args = Map::new();
    args.insert("prompt".into(), Value::String("hello".into()));
    args.insert("__pincer_auth__".into(), Value::String(h.token.clone()));
    let req = ToolCallRequest {
        params: ToolCallParams {
            name: "gemini_generate".into(),
            arguments: Some(args),
            meta: None,
        },
    };

    h.orchestrator.call_tool(req).await.unwrap();

    let observed = h.caller.observed();
    assert!(!observed[0].arguments.contains_key("__pincer_auth__"));
    assert!(observed[0].arguments.contains_key("prompt"));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_with_backoff() {
    let h = harness(vec![
        Err(Error::Http("500 Internal Server Error".into())),
        Err(Error::Http("500 Internal Server Error".into())),
        Ok(ToolResponse::text("third time lucky")),
    ]);

    let start = tokio::time::Instant::now();
    let resp = h
        .orchestrator
        .call_tool(request(
            "gemini_generate",
            Some(&h.token),
            serde_json::json!({ "prompt": "hello" }),
        ))
        .await
        .unwrap();

    assert_eq!(resp, ToolResponse::text("third time lucky"));
    assert_eq!(h.caller.attempts(), 3);
    // 1000 ms then 2000 ms of backoff under the paused clock.
    assert_eq!(start.elapsed(), Duration::from_millis(3_000));

    let entries = audit_entries(&h.audit_path);
    assert_eq!(entries[0]["status"], "success");
}

#[tokio::test(start_paused = true)]
async fn auth_errors_do_not_retry() {
    let h = harness(vec![
        Err(Error::Http("401 Unauthorized".into())),
        Ok(ToolResponse::text("never reached")),
    ]);

    let start = tokio::time::Instant::now();
    let err = h
        .orchestrator
        .call_tool(request(
            "gemini_generate",
            Some(&h.token),
            serde_json::json!({ "prompt": "hello" }),
        ))
        .await
        .unwrap_err();

    // The underlying error surfaces, not a retry wrapper.
    assert!(matches!(err, Error::Http(_)));
    assert!(err.is_auth_error());
    assert_eq!(h.caller.attempts(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(h.orchestrator.outstanding_requests(), 0);
}

#[tokio::test]
async fn audit_chain_links_and_detects_tampering() {
    let h = harness(vec![
        Ok(ToolResponse::text("one")),
        Ok(ToolResponse::text("two")),
    ]);

    for _ in 0..2 {
        h.orchestrator
            .call_tool(request(
                "gemini_generate",
                Some(&h.token),
                serde_json::json!({ "prompt": "hello" }),
            ))
            .await
            .unwrap();
    }

    let entries = audit_entries(&h.audit_path);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1]["prevHash"], entries[0]["chainHash"]);
    assert!(verify_chain(&h.audit_path).unwrap().is_intact());

    // Mutate one character of the first entry's agent id in place.
    let tampered = std::fs::read_to_string(&h.audit_path)
        .unwrap()
        .replacen("\"agentId\":\"bot\"", "\"agentId\":\"bOt\"", 1);
    std::fs::write(&h.audit_path, tampered).unwrap();

    let report = verify_chain(&h.audit_path).unwrap();
    assert_eq!(report.first_break.unwrap().line, 1);
}

// ── pipeline edges ────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_arguments_fail_before_injection() {
    let h = harness(vec![Ok(ToolResponse::text("never reached"))]);

    let err = h
        .orchestrator
        .call_tool(request(
            "gemini_generate",
            Some(&h.token),
            serde_json::json!({}),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert!(err.to_string().contains("'prompt' is required"));
    assert_eq!(h.caller.attempts(), 0);

    let entries = audit_entries(&h.audit_path);
    assert_eq!(entries[0]["status"], "error");
    assert_eq!(entries[0]["agentId"], "bot");
}

#[tokio::test]
async fn unregistered_tool_is_unknown() {
    let h = harness(vec![]);

    let err = h
        .orchestrator
        .call_tool(request(
            "mystery_tool",
            Some(&h.token),
            serde_json::json!({}),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnknownTool(_)));
    let entries = audit_entries(&h.audit_path);
    assert_eq!(entries[0]["status"], "error");
}

#[tokio::test]
async fn retry_exhaustion_still_scrubs_and_audits() {
    let h = harness(vec![
        Err(Error::Http("500".into())),
        Err(Error::Http("502".into())),
        Err(Error::Http("503".into())),
    ]);

    // Collapse the backoff so the test runs instantly.
    tokio::time::pause();
    let err = h
        .orchestrator
        .call_tool(request(
            "gemini_generate",
            Some(&h.token),
            serde_json::json!({ "prompt": "hello" }),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RetryExhausted { attempts: 3, .. }));
    assert_eq!(h.orchestrator.outstanding_requests(), 0);

    let entries = audit_entries(&h.audit_path);
    assert_eq!(entries[0]["status"], "error");
    let summary = entries[0]["error"].as_str().unwrap();
    assert!(summary.contains("503"));
    // The audit line never carries the secret.
    assert!(!serde_json::to_string(&entries[0]).unwrap().contains("AIza_REAL"));
}

#[tokio::test]
async fn discovery_needs_no_authentication() {
    let h = harness(vec![]);
    let tools = h.orchestrator.list_tools();
    assert!(tools.iter().any(|t| t.name == "gemini_generate"));
    assert!(tools.iter().any(|t| t.name == "slack_send_message"));
    assert!(tools.iter().any(|t| t.name == "gpg_sign"));
}

#[tokio::test]
async fn close_shuts_the_vault_down() {
    let h = harness(vec![Ok(ToolResponse::text("ok"))]);
    h.orchestrator.close().unwrap();

    let err = h
        .orchestrator
        .call_tool(request(
            "gemini_generate",
            Some(&h.token),
            serde_json::json!({ "prompt": "hello" }),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Db(_)));

    // Closing twice is harmless.
    h.orchestrator.close().unwrap();
}
