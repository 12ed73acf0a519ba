//! Public error taxonomy (§7) and the failure-kind classifier used for
//! logging a Worker's terminal error, grounded on `retry/classify.rs` minus
//! the auto-retry loop (a stream error here is logged and ends the Worker,
//! never retried by the core).

use thiserror::Error;

/// Errors surfaced to a caller of `prometeo-core`'s public API (§7).
#[derive(Debug, Error)]
pub enum PrometeoError {
    /// A caller-supplied value failed validation: wrong type, empty,
    /// non-positive, or a tempdir that doesn't exist and can't be created.
    #[error("invalid argument: {0}")]
    InvalidArgumentError(String),

    /// The URL was syntactically invalid, the HEAD probe returned non-2xx,
    /// or `Accept-Ranges` was not `bytes`.
    #[error("bad URL: {0}")]
    BadURLError(String),

    /// The probed or decoded metadata was unusable: zero-length content,
    /// an unparseable manifest, or a size/range mismatch on resume.
    #[error("bad metadata: {0}")]
    BadMetadataError(String),

    /// An internal failure not attributable to caller input or the remote
    /// origin: disk I/O, a poisoned lock, an unexpected channel close.
    #[error("internal error: {0}")]
    InternalError(String),
}

/// The kind of failure that ended a Worker's stream, used for structured
/// logging only; §1 Non-goals exclude automatic retry/backoff beyond §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    Connection,
    Http4xx(u16),
    Http5xx(u16),
    Throttled,
    Storage,
    Other,
}

/// Classifies an HTTP status code that was neither 206 nor 416 (the only
/// statuses a Worker accepts, per §9's resolved 206/416 rule).
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        400..=499 => ErrorKind::Http4xx(code as u16),
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

/// Classifies a curl transport error for logging.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_429_and_503_are_throttled() {
        assert_eq!(classify_http_status(429), ErrorKind::Throttled);
        assert_eq!(classify_http_status(503), ErrorKind::Throttled);
    }

    #[test]
    fn http_5xx_and_4xx_carry_the_code() {
        assert_eq!(classify_http_status(500), ErrorKind::Http5xx(500));
        assert_eq!(classify_http_status(404), ErrorKind::Http4xx(404));
    }

    #[test]
    fn error_messages_are_human_readable() {
        let e = PrometeoError::BadURLError("accept-ranges missing".to_string());
        assert_eq!(e.to_string(), "bad URL: accept-ranges missing");
    }
}
