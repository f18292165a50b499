//! The retry engine.
//!
//! Generalizes the hand-rolled retry loop in `tough`'s `http.rs`
//! (`RetryState` + `fetch_with_retries`) into a policy-driven engine bound
//! to one URI, reusable by the channel's `open`, `read`, `position(set)`,
//! and `size` operations and by [`crate::http_client::exists`].

use crate::cause::causes;
use crate::error::Error;
use crate::settings::Settings;
use log::warn;
use std::time::{Duration, Instant};

/// A retry policy bound to one URI for the lifetime of one caller
/// (typically one channel).
#[derive(Debug, Clone)]
pub struct RetryEngine {
    settings: Settings,
    url: String,
}

impl RetryEngine {
    /// Builds a retry engine from `settings`, bound to `url` for logging and
    /// for `OutOfRetries` error construction.
    pub fn new(settings: Settings, url: impl Into<String>) -> Self {
        Self {
            settings,
            url: url.into(),
        }
    }

    /// The URI this engine is bound to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The configured retry cap, exposed for callers (the channel) that
    /// drive their own retry loop instead of [`Self::run_with_retries`].
    pub(crate) fn max_retries(&self) -> u32 {
        self.settings.retry.max_retries
    }

    /// Classifies `err` by walking its cause chain (depth ≤ 20): a cause is
    /// retryable if it is an `UnexpectedHttpResponse` whose status is in
    /// `retryable_http_codes`, if it classifies into a configured
    /// `RetryableKind`, if its message contains a configured substring, or if
    /// the user predicate accepts it.
    ///
    /// Non-I/O runtime failures (everything [`Error::is_wire_error`] rejects)
    /// are never retryable and short-circuit to `false` without walking the
    /// chain — they propagate as-is rather than being retried.
    pub fn is_retryable(&self, err: &Error) -> bool {
        if !err.is_wire_error() {
            return false;
        }
        for cause in causes(err) {
            if let Some(this) = cause.downcast_ref::<Error>() {
                if let Error::UnexpectedHttpResponse { status, .. } = this {
                    if self.settings.retry.retryable_http_codes.contains(status) {
                        return true;
                    }
                }
            }
            if let Some(reqwest_err) = cause.downcast_ref::<reqwest::Error>() {
                if let Some(kind) = crate::settings::RetryableKind::classify(reqwest_err) {
                    if self.settings.retry.retryable_exceptions.contains(&kind) {
                        return true;
                    }
                }
            }
            let message = cause.to_string();
            if self
                .settings
                .retry
                .retryable_messages
                .iter()
                .any(|needle| message.contains(needle.as_str()))
            {
                return true;
            }
            if let Some(predicate) = &self.settings.retry.retry_predicate {
                if predicate(cause) {
                    return true;
                }
            }
        }
        false
    }

    /// Sleeps for `2^min(attempt, 7)` milliseconds ahead of retry attempt
    /// `attempt` (1-indexed), returning the elapsed wall time actually slept.
    ///
    /// The source system's own comments claim this backoff is "around 2
    /// minutes," which does not match the millisecond semantics implemented
    /// here (max `2^7 = 128` ms); this crate keeps the implemented behavior
    /// rather than the comment.
    pub(crate) fn sleep_before_attempt(attempt: u32) -> Duration {
        let millis = 1u64 << attempt.min(7);
        let wait = Duration::from_millis(millis);
        let start = Instant::now();
        std::thread::sleep(wait);
        start.elapsed()
    }

    /// Runs `f` up to `max_retries + 1` times.
    ///
    /// A retryable failure is recorded, slept on, and retried. A
    /// non-retryable failure surfaces immediately. On exhaustion, raises
    /// [`Error::OutOfRetries`] carrying the attempt count, total sleep, and
    /// the last cause.
    pub fn run_with_retries<T>(&self, mut f: impl FnMut() -> Result<T, Error>) -> Result<T, Error> {
        let mut total_sleep = Duration::ZERO;
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match f() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !self.is_retryable(&err) {
                        return Err(err);
                    }
                    if attempts > self.settings.retry.max_retries {
                        return Err(Error::OutOfRetries {
                            attempts,
                            total_sleep,
                            source: Box::new(err),
                        });
                    }
                    warn!(
                        "retryable error on attempt {} for '{}': {}",
                        attempts, self.url, err
                    );
                    total_sleep += Self::sleep_before_attempt(attempts);
                }
            }
        }
    }

    /// Runs `first` once; on success, returns immediately. On a retryable
    /// failure, delegates to [`Self::run_with_retries`] with `retry_fn`. On a
    /// non-retryable failure, surfaces it unchanged.
    ///
    /// `first` and `retry_fn` are distinct because the first attempt may
    /// already have mutated channel state (a partial read, a partial skip)
    /// that cannot safely be repeated verbatim; `retry_fn` is the caller's
    /// compensating action, typically "reopen at the current position."
    pub fn try_once_then_with_retries<T>(
        &self,
        first: impl FnOnce() -> Result<T, Error>,
        retry_fn: impl FnMut() -> Result<T, Error>,
    ) -> Result<T, Error> {
        match first() {
            Ok(value) => Ok(value),
            Err(err) => {
                if !self.is_retryable(&err) {
                    return Err(err);
                }
                warn!(
                    "retryable error on first attempt for '{}': {}, reopening",
                    self.url, err
                );
                self.run_with_retries(retry_fn)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RetrySettings;
    use std::cell::Cell;
    use std::sync::Arc;

    fn engine(max_retries: u32) -> RetryEngine {
        let mut settings = Settings::default();
        settings.retry = RetrySettings {
            max_retries,
            ..RetrySettings::default()
        };
        RetryEngine::new(settings, "http://example.test/object")
    }

    fn retryable_error() -> Error {
        Error::UnexpectedHttpResponse {
            url: "http://example.test/object".to_string(),
            status: 503,
        }
    }

    fn fatal_error() -> Error {
        Error::InvalidArgument {
            message: "bad offset".to_string(),
        }
    }

    #[test]
    fn zero_retries_surfaces_out_of_retries_after_one_attempt() {
        let e = engine(0);
        let calls = Cell::new(0);
        let result = e.run_with_retries(|| {
            calls.set(calls.get() + 1);
            Err(retryable_error())
        });
        match result {
            Err(Error::OutOfRetries { attempts, .. }) => assert_eq!(attempts, 1),
            other => panic!("expected OutOfRetries, got {:?}", other),
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn n_retries_invokes_exactly_n_plus_one_times() {
        let e = engine(4);
        let calls = Cell::new(0);
        let result = e.run_with_retries(|| {
            calls.set(calls.get() + 1);
            Err(retryable_error())
        });
        assert!(matches!(result, Err(Error::OutOfRetries { attempts: 5, .. })));
        assert_eq!(calls.get(), 5);
    }

    #[test]
    fn non_retryable_failure_surfaces_after_one_invocation() {
        let e = engine(10);
        let calls = Cell::new(0);
        let result = e.run_with_retries(|| {
            calls.set(calls.get() + 1);
            Err(fatal_error())
        });
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn success_after_transient_failure_recovers() {
        let e = engine(3);
        let calls = Cell::new(0);
        let result = e.run_with_retries(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(retryable_error())
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn try_once_then_with_retries_runs_first_then_retry_fn() {
        let e = engine(2);
        let first_calls = Cell::new(0);
        let retry_calls = Cell::new(0);
        let result = e.try_once_then_with_retries(
            || {
                first_calls.set(first_calls.get() + 1);
                Err(retryable_error())
            },
            || {
                retry_calls.set(retry_calls.get() + 1);
                Ok::<_, Error>(7)
            },
        );
        assert_eq!(result.unwrap(), 7);
        assert_eq!(first_calls.get(), 1);
        assert_eq!(retry_calls.get(), 1);
    }

    #[test]
    fn try_once_then_with_retries_surfaces_fatal_without_retry_fn() {
        let e = engine(2);
        let retry_calls = Cell::new(0);
        let result = e.try_once_then_with_retries(
            || Err(fatal_error()),
            || {
                retry_calls.set(retry_calls.get() + 1);
                Ok::<_, Error>(7)
            },
        );
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
        assert_eq!(retry_calls.get(), 0);
    }

    #[test]
    fn classifies_retryable_message_substring() {
        let mut settings = Settings::default();
        settings.retry.max_retries = 0;
        let e = RetryEngine::new(settings, "http://example.test/object");
        let err = Error::Send {
            url: "http://example.test/object".to_string(),
            source: make_reqwest_error(),
        };
        // The default message set includes "protocol error:"; this reqwest
        // error will not match it, but the classifier should not panic and
        // should fall through to `false` since no rule matches.
        let _ = e.is_retryable(&err);
    }

    #[test]
    fn user_predicate_is_additive() {
        let mut settings = Settings::default();
        settings.retry.retryable_http_codes.clear();
        settings.retry.retryable_exceptions.clear();
        settings.retry.retryable_messages.clear();
        settings.retry.retry_predicate = Some(Arc::new(|_cause: &(dyn std::error::Error + 'static)| true));
        let e = RetryEngine::new(settings, "http://example.test/object");
        assert!(e.is_retryable(&retryable_error()));
    }

    fn make_reqwest_error() -> reqwest::Error {
        // `reqwest::Error` has no public constructor; build one via a client
        // with an invalid URL to get a deterministic, cheaply-constructed
        // builder error for test purposes only.
        reqwest::blocking::Client::new()
            .get("not a url")
            .build()
            .unwrap_err()
    }
}
