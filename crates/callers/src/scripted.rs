//! A scripted caller for pipeline tests: returns canned results in
//! order and records what each attempt observed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use px_domain::credentials::EnrichedRequest;
use px_domain::error::{Error, Result};
use px_domain::tool::ToolResponse;
use serde_json::{Map, Value};

use crate::traits::Caller;

/// What one attempt saw on the enriched request.
#[derive(Debug, Clone)]
pub struct ObservedCall {
    pub api_key: String,
    pub agent_id: String,
    pub arguments: Map<String, Value>,
}

/// Caller that replays a fixed script of results.
pub struct ScriptedCaller {
    script: Mutex<VecDeque<Result<ToolResponse>>>,
    attempts: AtomicU32,
    observed: Mutex<Vec<ObservedCall>>,
    max_retries: Option<u32>,
}

impl ScriptedCaller {
    pub fn new(script: Vec<Result<ToolResponse>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            attempts: AtomicU32::new(0),
            observed: Mutex::new(Vec::new()),
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// How many times `execute` ran.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Everything the attempts observed, in order.
    pub fn observed(&self) -> Vec<ObservedCall> {
        self.observed.lock().clone()
    }
}

#[async_trait::async_trait]
impl Caller for ScriptedCaller {
    async fn execute(&self, req: &EnrichedRequest) -> Result<ToolResponse> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.observed.lock().push(ObservedCall {
            api_key: req.credentials.api_key().to_owned(),
            agent_id: req.credentials.agent_id().to_owned(),
            arguments: req.arguments.clone(),
        });

        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Http("scripted caller exhausted".into())))
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }
}
