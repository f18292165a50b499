//! The configuration record a filesystem, channel, or `exists` probe is
//! built from, plus the process-wide default-settings cell the provider
//! falls back to when none is given explicitly.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Redirect-following policy for the shared HTTP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// Never follow redirects.
    None,
    /// Follow a bounded number of redirects (reqwest's default of 10).
    Normal,
    /// Follow redirects without limit.
    Always,
}

/// A closed stand-in for "exception variant" in the retryable-exceptions set.
///
/// The source system walks a runtime class hierarchy; Rust has no open
/// hierarchy to walk, so this crate closes the set over the wire-level
/// failure shapes it can actually produce. See DESIGN.md for this Open
/// Question's resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RetryableKind {
    /// A TLS handshake or record failure.
    TlsFailure,
    /// The connection was closed before the expected amount of data arrived.
    UnexpectedEof,
    /// A socket-level failure (connection reset, refused, broken pipe, ...).
    SocketFailure,
    /// The operation exceeded its configured timeout.
    SocketTimeout,
}

impl RetryableKind {
    /// Inspects a [`reqwest::Error`] and classifies it, if it matches one of
    /// the closed set of variants above.
    pub(crate) fn classify(err: &reqwest::Error) -> Option<Self> {
        if err.is_timeout() {
            return Some(RetryableKind::SocketTimeout);
        }
        if err.is_connect() {
            return Some(RetryableKind::SocketFailure);
        }
        let text = err.to_string();
        if text.contains("tls") || text.contains("ssl") || text.contains("certificate") {
            return Some(RetryableKind::TlsFailure);
        }
        if text.contains("unexpected eof") || text.contains("unexpected end of file") {
            return Some(RetryableKind::UnexpectedEof);
        }
        if text.contains("connection reset")
            || text.contains("broken pipe")
            || text.contains("connection refused")
        {
            return Some(RetryableKind::SocketFailure);
        }
        None
    }
}

/// Retry behavior, a sub-record of [`Settings`].
#[derive(Clone)]
pub struct RetrySettings {
    /// Non-negative cap on retry attempts. `0` means one try, no retries.
    pub max_retries: u32,
    /// HTTP status codes treated as transient.
    pub retryable_http_codes: HashSet<u16>,
    /// Exception/failure variants whose presence anywhere in a cause chain
    /// makes the failure transient.
    pub retryable_exceptions: HashSet<RetryableKind>,
    /// Substrings; any cause whose message contains one is transient.
    pub retryable_messages: HashSet<String>,
    /// A user-supplied predicate over a single cause in the chain,
    /// additive to the rules above.
    pub retry_predicate: Option<Arc<dyn Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync>>,
}

impl std::fmt::Debug for RetrySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrySettings")
            .field("max_retries", &self.max_retries)
            .field("retryable_http_codes", &self.retryable_http_codes)
            .field("retryable_exceptions", &self.retryable_exceptions)
            .field("retryable_messages", &self.retryable_messages)
            .field("retry_predicate", &self.retry_predicate.is_some())
            .finish()
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retryable_http_codes: [500, 502, 503].iter().copied().collect(),
            retryable_exceptions: [
                RetryableKind::TlsFailure,
                RetryableKind::UnexpectedEof,
                RetryableKind::SocketFailure,
                RetryableKind::SocketTimeout,
            ]
            .iter()
            .copied()
            .collect(),
            retryable_messages: ["protocol error:".to_string()].iter().cloned().collect(),
            retry_predicate: None,
        }
    }
}

/// Top-level configuration for a filesystem, channel, or `exists` probe.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Connection timeout for the shared HTTP client.
    pub timeout: Duration,
    /// Redirect-following policy.
    pub redirect: RedirectPolicy,
    /// Retry policy.
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            redirect: RedirectPolicy::Normal,
            retry: RetrySettings::default(),
        }
    }
}

static DEFAULT_SETTINGS: Lazy<RwLock<Settings>> = Lazy::new(|| RwLock::new(Settings::default()));

/// Reads a clone of the process-wide default [`Settings`].
///
/// New filesystems created via [`crate::provider`] without explicit settings
/// use this value, captured at construction time.
pub fn default_settings() -> Settings {
    DEFAULT_SETTINGS
        .read()
        .expect("default settings lock poisoned")
        .clone()
}

/// Atomically replaces the process-wide default [`Settings`].
///
/// Existing filesystems and channels are unaffected; only filesystems
/// created after this call observe the new value.
pub fn set_default_settings(settings: Settings) {
    *DEFAULT_SETTINGS.write().expect("default settings lock poisoned") = settings;
}
