//! Shared helpers for caller adapters.

use px_domain::error::Error;

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeouts are named explicitly; everything else keeps reqwest's text.
/// Keys travel in headers, never in URLs, so the error text cannot
/// carry credential material.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Http(format!("timeout: {e}"))
    } else {
        Error::Http(e.to_string())
    }
}

/// Truncate an upstream response body for inclusion in an error message.
pub(crate) fn truncate_body(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_owned();
    }
    let mut boundary = max;
    while boundary > 0 && !body.is_char_boundary(boundary) {
        boundary -= 1;
    }
    format!("{}…", &body[..boundary])
}
