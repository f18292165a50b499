//! The error taxonomy for this crate.
//!
//! Every failure that can cross the public API surface is a variant of
//! [`Error`]. Classification-only failures (bad arguments, unsupported
//! operations, provider mismatches) are constructed directly and never
//! flow through the retry engine; wire failures are constructed deep in
//! [`crate::http_client`] and [`crate::channel`] and *do* flow through it.

use snafu::Snafu;
use std::time::Duration;

/// The error type returned by every fallible operation in this crate.
#[derive(Debug, Snafu)]
#[snafu(visibility = "pub(crate)")]
#[non_exhaustive]
pub enum Error {
    /// An operation was attempted on a channel after it was closed.
    #[snafu(display("operation attempted on a closed channel for '{}'", url))]
    ClosedChannel { url: String },

    /// `write` or `truncate` was attempted on a read-only channel.
    #[snafu(display("channel for '{}' is not writable", url))]
    NonWritableChannel { url: String },

    /// A caller-supplied argument was out of range or otherwise invalid.
    #[snafu(display("invalid argument: {}", message))]
    InvalidArgument { message: String },

    /// The operation is not supported by this filesystem SPI at all.
    #[snafu(display("unsupported operation: {}", message))]
    UnsupportedOperation { message: String },

    /// A path failed to construct because its bytes were malformed.
    #[snafu(display("invalid path: {}", message))]
    InvalidPath { message: String },

    /// A path constructed by a different provider was presented to this one.
    #[snafu(display("path belongs to a different provider"))]
    ProviderMismatch,

    /// `new_file_system` was called for an authority that is already registered.
    #[snafu(display("filesystem already exists for authority '{}'", authority))]
    FileSystemAlreadyExists { authority: String },

    /// `get_file_system` was called for an authority with no registered filesystem.
    #[snafu(display("no filesystem registered for authority '{}'", authority))]
    FileSystemNotFound { authority: String },

    /// The remote resource does not exist (HTTP 404).
    #[snafu(display("resource not found: '{}'", url))]
    FileNotFound { url: String },

    /// The remote resource could not be accessed (HTTP 401/403/407).
    #[snafu(display("access denied ({}) for '{}'", status, url))]
    AccessDenied { url: String, status: u16 },

    /// A range request got a full response, or a full request got a partial one.
    #[snafu(display(
        "incompatible range response ({}) for '{}': range requested = {}",
        status,
        url,
        is_range_request
    ))]
    IncompatibleRangeResponse {
        url: String,
        status: u16,
        is_range_request: bool,
    },

    /// The server returned a status code this crate does not otherwise model.
    #[snafu(display("unexpected HTTP response ({}) for '{}'", status, url))]
    UnexpectedHttpResponse { url: String, status: u16 },

    /// The retry budget was exhausted without a successful attempt.
    #[snafu(display(
        "out of retries after {} attempt(s), slept {:?} total, last cause: {}",
        attempts,
        total_sleep,
        source
    ))]
    OutOfRetries {
        attempts: u32,
        total_sleep: Duration,
        source: Box<Error>,
    },

    /// The calling thread was interrupted during a network call.
    #[snafu(display("interrupted during I/O for '{}'", url))]
    InterruptedIo { url: String },

    /// A malformed URI string could not be parsed.
    #[snafu(display("invalid URI '{}': {}", input, source))]
    UriParse {
        input: String,
        source: url::ParseError,
    },

    /// Building the HTTP request failed (e.g. an invalid header value).
    #[snafu(display("failed to build request for '{}': {}", url, source))]
    RequestBuild { url: String, source: reqwest::Error },

    /// Constructing the shared HTTP client failed.
    #[snafu(display("failed to build HTTP client: {}", source))]
    ClientBuild { source: reqwest::Error },

    /// The HTTP client returned an error sending or reading the response.
    #[snafu(display("request to '{}' failed: {}", url, source))]
    Send { url: String, source: reqwest::Error },

    /// A local I/O error occurred reading or skipping the response body.
    #[snafu(display("I/O error for '{}': {}", url, source))]
    Io { url: String, source: std::io::Error },

    /// `Content-Length` was missing, duplicated, or not a valid non-negative integer.
    #[snafu(display("invalid Content-Length for '{}': {}", url, message))]
    InvalidContentLength { url: String, message: String },
}

impl Error {
    /// The URI this error pertains to, when known.
    ///
    /// Classification errors (invalid argument, unsupported operation, provider
    /// mismatch) carry no URI and return `None`.
    pub fn url(&self) -> Option<&str> {
        match self {
            Error::ClosedChannel { url }
            | Error::NonWritableChannel { url }
            | Error::FileNotFound { url }
            | Error::AccessDenied { url, .. }
            | Error::IncompatibleRangeResponse { url, .. }
            | Error::UnexpectedHttpResponse { url, .. }
            | Error::InterruptedIo { url }
            | Error::RequestBuild { url, .. }
            | Error::Send { url, .. }
            | Error::Io { url, .. }
            | Error::InvalidContentLength { url, .. } => Some(url),
            _ => None,
        }
    }

    /// `true` when this variant represents a wire-level failure that the retry
    /// engine is entitled to inspect. Classification errors (bad arguments,
    /// unsupported operations, provider mismatches) are never retried.
    pub(crate) fn is_wire_error(&self) -> bool {
        matches!(
            self,
            Error::FileNotFound { .. }
                | Error::AccessDenied { .. }
                | Error::IncompatibleRangeResponse { .. }
                | Error::UnexpectedHttpResponse { .. }
                | Error::InterruptedIo { .. }
                | Error::RequestBuild { .. }
                | Error::ClientBuild { .. }
                | Error::Send { .. }
                | Error::Io { .. }
                | Error::InvalidContentLength { .. }
        )
    }
}

/// A convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
