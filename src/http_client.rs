//! The HTTP utility surface: shared client construction and
//! the `exists` probe used by `checkAccess`.

use crate::cause::causes;
use crate::error::Error;
use crate::retry::RetryEngine;
use crate::settings::{RedirectPolicy, Settings};
use log::trace;
use reqwest::blocking::Client;
use reqwest::StatusCode;

/// Builds a `reqwest::blocking::Client` applying `timeout` and `redirect`
/// from `settings`.
///
/// The returned client is a lightweight handle intended for reuse across
/// every channel and existence check opened against the same filesystem.
pub fn build_client(settings: &Settings) -> Result<Client, Error> {
    let policy = match settings.redirect {
        RedirectPolicy::None => reqwest::redirect::Policy::none(),
        RedirectPolicy::Normal => reqwest::redirect::Policy::default(),
        RedirectPolicy::Always => reqwest::redirect::Policy::limited(usize::from(u8::MAX)),
    };
    Client::builder()
        .timeout(settings.timeout)
        .redirect(policy)
        .build()
        .map_err(|source| Error::ClientBuild { source })
}

/// Probes whether `uri` exists.
///
/// - `200`/`206` → `Ok(true)`.
/// - `404` → `Ok(false)`.
/// - `401`/`403`/`407` → [`Error::AccessDenied`] (deliberately distinct from
///   "not found" so auth failures are visible to callers).
/// - anything else → [`Error::UnexpectedHttpResponse`].
///
/// A connection failure whose cause chain contains an unresolved-address
/// error is treated as non-existence, matching "exists on an unresolvable
/// host returns false".
pub fn exists(client: &Client, uri: &str, settings: &Settings) -> Result<bool, Error> {
    let engine = RetryEngine::new(settings.clone(), uri);
    engine.run_with_retries(|| head_once(client, uri))
}

fn head_once(client: &Client, uri: &str) -> Result<bool, Error> {
    trace!("HEAD {}", uri);
    let result = client.head(uri).send();
    match result {
        Ok(response) => match response.status() {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::PROXY_AUTHENTICATION_REQUIRED => {
                Err(Error::AccessDenied {
                    url: uri.to_string(),
                    status: response.status().as_u16(),
                })
            }
            other => Err(Error::UnexpectedHttpResponse {
                url: uri.to_string(),
                status: other.as_u16(),
            }),
        },
        Err(source) => {
            if source.is_connect() && unresolved_address(&source) {
                return Ok(false);
            }
            // A connect/read timeout is a wire failure like any other `.send()`
            // error, not thread interruption — wrap it the same way every
            // other call site does so the retry classifier can walk the
            // underlying `reqwest::Error` and match `RetryableKind::SocketTimeout`.
            Err(Error::Send {
                url: uri.to_string(),
                source,
            })
        }
    }
}

/// `true` if `err`'s cause chain mentions DNS resolution failure, matching
/// the source system's "unresolved address" classification for
/// connection-refused-style errors on an invalid host.
fn unresolved_address(err: &reqwest::Error) -> bool {
    causes(err).any(|cause| {
        let msg = cause.to_string().to_ascii_lowercase();
        msg.contains("dns error")
            || msg.contains("failed to lookup address")
            || msg.contains("name or service not known")
            || msg.contains("nodename nor servname")
    })
}
