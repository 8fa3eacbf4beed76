//! The caller contract.

use px_domain::credentials::EnrichedRequest;
use px_domain::error::Result;
use px_domain::tool::ToolResponse;

/// Trait every outbound adapter implements.
///
/// `execute` performs exactly one attempt; the retry loop lives in
/// [`crate::base::execute_with_retry`]. Implementations read the
/// credential from the enriched request for the duration of the call
/// and must not retain or log it.
#[async_trait::async_trait]
pub trait Caller: Send + Sync {
    /// Perform one outbound attempt.
    async fn execute(&self, req: &EnrichedRequest) -> Result<ToolResponse>;

    /// Provider name used in errors and logs.
    fn name(&self) -> &str;

    /// Per-caller override of the attempt budget. `None` uses the
    /// configured default.
    fn max_retries(&self) -> Option<u32> {
        None
    }
}
