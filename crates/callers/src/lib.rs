//! Outbound callers: one thin request-shaping adapter per provider, a
//! shared retry-with-backoff wrapper, and the registry the orchestrator
//! dispatches through.
//!
//! Callers receive an [`px_domain::credentials::EnrichedRequest`] and
//! never store or log the credential it carries; scrubbing is the
//! orchestrator's job.

pub mod base;
pub mod gemini;
pub mod gpg;
pub mod registry;
pub mod slack;
pub mod traits;
mod util;

pub use base::{execute_with_retry, RetryPolicy};
pub use registry::{CallerKind, CallerRegistry};
pub use traits::Caller;

#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;
#[cfg(any(test, feature = "test-utils"))]
pub use scripted::ScriptedCaller;
