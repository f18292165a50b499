//! The seekable HTTP byte channel.
//!
//! Generalizes `tough`'s `RetryRead` (in `http.rs`) from "retry a GET until
//! the retry budget is exhausted" into a fuller state machine: an explicit
//! open/closed lifecycle, a skip-vs-reopen heuristic on seek, a cached size
//! from `HEAD`, and buffer-preserving reads.
//!
//! `read` and the skip branch of `set_position` drive their retry loop by
//! hand rather than through [`crate::retry::RetryEngine::try_once_then_with_retries`]:
//! both attempts need mutable access to the same inner stream, and two
//! closures that each capture that stream mutably cannot coexist as
//! arguments to one function call. `tough`'s own `RetryRead::read` hits the
//! same constraint and also hand-rolls its loop; `open`, reopening after a
//! seek, and `size` have no such conflict and use the generic combinator.

use crate::error::Error;
use crate::retry::RetryEngine;
use crate::settings::Settings;
use log::{debug, trace, warn};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use std::io::{BufReader, Read};
use std::time::Duration;

/// Forward-seek distance within which the channel prefers to consume bytes
/// from the current stream rather than open a new connection.
pub const SKIP_DISTANCE: u64 = 8192;

/// A read-only, randomly-seekable byte channel over one HTTP(S) resource.
///
/// All public operations serialize on `&mut self`; the type is not
/// `Sync`-shared across threads by design.
pub struct HttpByteChannel {
    uri: String,
    client: Client,
    engine: RetryEngine,
    position: u64,
    size: Option<u64>,
    inner: Option<BufReader<Response>>,
    open: bool,
}

impl std::fmt::Debug for HttpByteChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpByteChannel")
            .field("uri", &self.uri)
            .field("position", &self.position)
            .field("size", &self.size)
            .field("open", &self.open)
            .finish()
    }
}

impl HttpByteChannel {
    /// Opens a channel at `initial_position`.
    ///
    /// Builds a GET under retry; a non-zero `initial_position` is sent as a
    /// `Range: bytes=<position>-` request, so opening at a non-zero offset
    /// requires the server to honor range requests.
    pub fn open(
        client: Client,
        settings: Settings,
        uri: impl Into<String>,
        initial_position: u64,
    ) -> Result<Self, Error> {
        let uri = uri.into();
        let engine = RetryEngine::new(settings, uri.clone());
        let client_for_open = client.clone();
        let uri_for_open = uri.clone();
        let stream =
            engine.run_with_retries(move || open_at(&client_for_open, &uri_for_open, initial_position))?;
        Ok(Self {
            uri,
            client,
            engine,
            position: initial_position,
            size: None,
            inner: Some(stream),
            open: true,
        })
    }

    /// The URI this channel was opened against.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// `false` once [`Self::close`] has been called.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Returns the current read position, or [`Error::ClosedChannel`] if closed.
    pub fn position(&self) -> Result<u64, Error> {
        if !self.open {
            return Err(Error::ClosedChannel {
                url: self.uri.clone(),
            });
        }
        Ok(self.position)
    }

    /// Seeks to `new`.
    ///
    /// A no-op if `new` equals the current position. A short forward seek
    /// (`0 <= new - position < SKIP_DISTANCE`) consumes and discards bytes on
    /// the current stream rather than opening a new connection; a backward
    /// seek or a long forward seek always reopens.
    pub fn set_position(&mut self, new: i64) -> Result<(), Error> {
        if !self.open {
            return Err(Error::ClosedChannel {
                url: self.uri.clone(),
            });
        }
        if new < 0 {
            return Err(Error::InvalidArgument {
                message: "position must be non-negative".to_string(),
            });
        }
        let new = new as u64;
        if new == self.position {
            return Ok(());
        }
        if self.position < new && new - self.position < SKIP_DISTANCE {
            self.skip_or_reopen(new)?;
        } else {
            self.inner = None;
            self.reopen_with_retries(new)?;
        }
        self.position = new;
        Ok(())
    }

    /// Returns the resource's total size, caching it after the first `HEAD`.
    ///
    /// The cache is never invalidated by reads or reopens; if the server's
    /// content changes mid-session, subsequent reads still succeed against
    /// the new bytes but the cached size may go stale.
    pub fn size(&mut self) -> Result<u64, Error> {
        if !self.open {
            return Err(Error::ClosedChannel {
                url: self.uri.clone(),
            });
        }
        if let Some(size) = self.size {
            return Ok(size);
        }
        let client = self.client.clone();
        let uri = self.uri.clone();
        let size = self.engine.run_with_retries(move || head_for_size(&client, &uri))?;
        self.size = Some(size);
        Ok(size)
    }

    /// Reads up to `dst.len()` bytes, returning the count read or `-1` at
    /// end of stream.
    ///
    /// Position advances by the returned count; on `-1` the position is
    /// left unchanged. A transient failure mid-read neither advances the
    /// position nor mutates `dst`.
    pub fn read(&mut self, dst: &mut [u8]) -> Result<i64, Error> {
        if !self.open {
            return Err(Error::ClosedChannel {
                url: self.uri.clone(),
            });
        }
        let mut inner = self.inner.take();
        let mut attempt: u32 = 0;
        let mut total_sleep = Duration::ZERO;
        let outcome = loop {
            let attempt_result: Result<i64, Error> = if attempt == 0 {
                let stream = inner
                    .as_mut()
                    .expect("an open channel always carries an inner stream on its first attempt");
                buffer_preserving_read(stream, dst, &self.uri)
            } else {
                // Drops (and so closes) the previous stream, swallowing any
                // close-time error, then reopens at the position the last
                // successful read left us at.
                inner = None;
                open_at(&self.client, &self.uri, self.position).and_then(|mut stream| {
                    let result = buffer_preserving_read(&mut stream, dst, &self.uri);
                    inner = Some(stream);
                    result
                })
            };
            match attempt_result {
                Ok(n) => break Ok(n),
                Err(err) => {
                    if !self.engine.is_retryable(&err) {
                        break Err(err);
                    }
                    attempt += 1;
                    if attempt > self.engine.max_retries() {
                        break Err(Error::OutOfRetries {
                            attempts: attempt,
                            total_sleep,
                            source: Box::new(err),
                        });
                    }
                    warn!(
                        "retryable error reading '{}' (attempt {}): {}",
                        self.uri, attempt, err
                    );
                    total_sleep += RetryEngine::sleep_before_attempt(attempt);
                }
            }
        };
        self.inner = inner;
        self.open = self.inner.is_some();
        match outcome {
            Ok(n) => {
                if n >= 0 {
                    self.position += n as u64;
                }
                Ok(n)
            }
            Err(err) => Err(err),
        }
    }

    /// Closes the channel. Idempotent: closing twice is a no-op, and the
    /// underlying connection close (if any) never surfaces an error.
    pub fn close(&mut self) {
        self.inner = None;
        self.open = false;
    }

    /// Always fails: this channel is read-only.
    pub fn write(&mut self, _src: &[u8]) -> Result<usize, Error> {
        Err(Error::NonWritableChannel {
            url: self.uri.clone(),
        })
    }

    /// Always fails: this channel is read-only.
    pub fn truncate(&mut self, _size: u64) -> Result<(), Error> {
        Err(Error::NonWritableChannel {
            url: self.uri.clone(),
        })
    }

    fn skip_or_reopen(&mut self, new: u64) -> Result<(), Error> {
        let delta = new - self.position;
        let mut inner = self.inner.take();
        let mut attempt: u32 = 0;
        let mut total_sleep = Duration::ZERO;
        let outcome: Result<(), Error> = loop {
            let attempt_result: Result<(), Error> = if attempt == 0 {
                let stream = inner
                    .as_mut()
                    .expect("an open channel always carries an inner stream on its first attempt");
                skip_exact(stream, delta, &self.uri)
            } else {
                inner = None;
                open_at(&self.client, &self.uri, new).map(|stream| {
                    inner = Some(stream);
                })
            };
            match attempt_result {
                Ok(()) => break Ok(()),
                Err(err) => {
                    if !self.engine.is_retryable(&err) {
                        break Err(err);
                    }
                    attempt += 1;
                    if attempt > self.engine.max_retries() {
                        break Err(Error::OutOfRetries {
                            attempts: attempt,
                            total_sleep,
                            source: Box::new(err),
                        });
                    }
                    debug!(
                        "skip to {} failed for '{}' (attempt {}), reopening: {}",
                        new, self.uri, attempt, err
                    );
                    total_sleep += RetryEngine::sleep_before_attempt(attempt);
                }
            }
        };
        self.inner = inner;
        self.open = self.inner.is_some();
        outcome
    }

    fn reopen_with_retries(&mut self, new_position: u64) -> Result<(), Error> {
        let client = self.client.clone();
        let uri = self.uri.clone();
        let stream = self
            .engine
            .run_with_retries(move || open_at(&client, &uri, new_position))?;
        self.inner = Some(stream);
        self.open = true;
        Ok(())
    }
}

/// Opens a GET for `uri`, optionally as a range request starting at `position`.
fn open_at(client: &Client, uri: &str, position: u64) -> Result<BufReader<Response>, Error> {
    let is_range_request = position != 0;
    trace!("GET '{}' (range_request={})", uri, is_range_request);
    let mut request = client.get(uri);
    if is_range_request {
        request = request.header(reqwest::header::RANGE, format!("bytes={}-", position));
    }
    let response = request
        .send()
        .map_err(|source| Error::Send {
            url: uri.to_string(),
            source,
        })?;
    let status = response.status();
    validate_status(uri, status, is_range_request)?;
    Ok(BufReader::new(response))
}

/// Validates an HTTP response status against the range-request contract below.
///
/// | status | non-range request | range request |
/// |---|---|---|
/// | 200 | OK | incompatible range response |
/// | 206 | incompatible range response | OK |
/// | 404 | not found | not found |
/// | other | unexpected response | unexpected response |
fn validate_status(uri: &str, status: StatusCode, is_range_request: bool) -> Result<(), Error> {
    match (status.as_u16(), is_range_request) {
        (200, false) => Ok(()),
        (200, true) => Err(Error::IncompatibleRangeResponse {
            url: uri.to_string(),
            status: 200,
            is_range_request: true,
        }),
        (206, true) => Ok(()),
        (206, false) => Err(Error::IncompatibleRangeResponse {
            url: uri.to_string(),
            status: 206,
            is_range_request: false,
        }),
        (404, _) => Err(Error::FileNotFound { url: uri.to_string() }),
        (code, _) => Err(Error::UnexpectedHttpResponse {
            url: uri.to_string(),
            status: code,
        }),
    }
}

fn head_for_size(client: &Client, uri: &str) -> Result<u64, Error> {
    trace!("HEAD '{}' for size", uri);
    let response = client
        .head(uri)
        .send()
        .map_err(|source| Error::Send {
            url: uri.to_string(),
            source,
        })?;
    let status = response.status();
    validate_status(uri, status, false)?;
    let values: Vec<_> = response
        .headers()
        .get_all(reqwest::header::CONTENT_LENGTH)
        .iter()
        .collect();
    if values.len() != 1 {
        return Err(Error::InvalidContentLength {
            url: uri.to_string(),
            message: format!(
                "expected exactly one Content-Length header, found {}",
                values.len()
            ),
        });
    }
    let text = values[0].to_str().map_err(|_| Error::InvalidContentLength {
        url: uri.to_string(),
        message: "Content-Length header is not valid UTF-8".to_string(),
    })?;
    text.parse::<u64>().map_err(|_| Error::InvalidContentLength {
        url: uri.to_string(),
        message: format!("'{}' is not a valid non-negative integer", text),
    })
}

/// Reads into a scratch buffer and only copies into `dst` on success, so a
/// mid-read failure never leaves `dst` partially mutated.
fn buffer_preserving_read<R: Read>(stream: &mut R, dst: &mut [u8], uri: &str) -> Result<i64, Error> {
    if dst.is_empty() {
        return Ok(0);
    }
    let mut scratch = vec![0u8; dst.len()];
    match stream.read(&mut scratch) {
        Ok(0) => Ok(-1),
        Ok(n) => {
            dst[..n].copy_from_slice(&scratch[..n]);
            Ok(n as i64)
        }
        Err(source) => Err(Error::Io {
            url: uri.to_string(),
            source,
        }),
    }
}

/// Discards exactly `delta` bytes from `stream`. Raises an I/O error if the
/// stream refuses to advance at all.
fn skip_exact<R: Read>(stream: &mut R, delta: u64, uri: &str) -> Result<(), Error> {
    let mut limited = stream.take(delta);
    let skipped = std::io::copy(&mut limited, &mut std::io::sink()).map_err(|source| Error::Io {
        url: uri.to_string(),
        source,
    })?;
    if skipped == 0 {
        return Err(Error::Io {
            url: uri.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "stream refused to advance"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    fn channel_settings(max_retries: u32) -> Settings {
        let mut settings = Settings::default();
        settings.retry.max_retries = max_retries;
        settings
    }

    #[test]
    fn happy_full_read() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/hello.txt")
            .with_status(200)
            .with_header("content-length", "5")
            .with_body("Hello")
            .create();
        let _head = server
            .mock("HEAD", "/hello.txt")
            .with_status(200)
            .with_header("content-length", "5")
            .create();

        let uri = format!("{}/hello.txt", server.url());
        let settings = channel_settings(2);
        let client = crate::http_client::build_client(&settings).unwrap();
        let mut channel = HttpByteChannel::open(client, settings, uri, 0).unwrap();

        assert_eq!(channel.size().unwrap(), 5);
        let mut buf = [0u8; 5];
        let n = channel.read(&mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"Hello");
        assert_eq!(channel.position().unwrap(), 5);
    }

    #[test]
    fn seek_within_skip_window_does_not_reopen() {
        let mut server = mockito::Server::new();
        let body = vec![b'x'; 1024 * 1024];
        let _m = server
            .mock("GET", "/big.bin")
            .with_status(200)
            .with_body(body)
            .expect(1)
            .create();

        let uri = format!("{}/big.bin", server.url());
        let settings = channel_settings(2);
        let client = crate::http_client::build_client(&settings).unwrap();
        let mut channel = HttpByteChannel::open(client, settings, uri, 0).unwrap();

        let mut buf = [0u8; 100];
        assert_eq!(channel.read(&mut buf).unwrap(), 100);
        channel.set_position(150).unwrap();
        assert_eq!(channel.position().unwrap(), 150);
        let mut buf2 = [0u8; 10];
        assert_eq!(channel.read(&mut buf2).unwrap(), 10);
        assert_eq!(channel.position().unwrap(), 160);
        _m.assert();
    }

    #[test]
    fn backward_seek_forces_reopen_with_range() {
        let mut server = mockito::Server::new();
        let body = vec![b'y'; 1024 * 1024];
        let _initial = server
            .mock("GET", "/big.bin")
            .match_header("range", mockito::Matcher::Missing)
            .with_status(200)
            .with_body(body.clone())
            .create();
        let _ranged = server
            .mock("GET", "/big.bin")
            .match_header("range", "bytes=50-")
            .with_status(206)
            .with_body(&body[50..])
            .create();

        let uri = format!("{}/big.bin", server.url());
        let settings = channel_settings(2);
        let client = crate::http_client::build_client(&settings).unwrap();
        let mut channel = HttpByteChannel::open(client, settings, uri, 0).unwrap();

        let mut buf = [0u8; 200];
        assert_eq!(channel.read(&mut buf).unwrap(), 200);
        channel.set_position(50).unwrap();
        assert_eq!(channel.position().unwrap(), 50);
        let mut buf2 = [0u8; 4];
        assert_eq!(channel.read(&mut buf2).unwrap(), 4);
        assert_eq!(&buf2, &body[50..54]);
    }

    #[test]
    fn range_mismatch_raises_incompatible_range_response() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/full.bin")
            .with_status(200)
            .with_body("ignored")
            .create();

        let uri = format!("{}/full.bin", server.url());
        let mut settings = channel_settings(0);
        settings.retry.max_retries = 0;
        let client = crate::http_client::build_client(&settings).unwrap();
        let err = HttpByteChannel::open(client, settings, uri, 100).unwrap_err();
        assert!(matches!(
            err,
            Error::IncompatibleRangeResponse { status: 200, is_range_request: true, .. }
        ));
    }

    #[test]
    fn closed_channel_rejects_every_operation() {
        let mut server = mockito::Server::new();
        let _m = server.mock("GET", "/x").with_status(200).with_body("abc").create();
        let uri = format!("{}/x", server.url());
        let settings = channel_settings(0);
        let client = crate::http_client::build_client(&settings).unwrap();
        let mut channel = HttpByteChannel::open(client, settings, uri, 0).unwrap();

        channel.close();
        assert!(!channel.is_open());
        assert!(matches!(channel.position(), Err(Error::ClosedChannel { .. })));
        assert!(matches!(channel.set_position(0), Err(Error::ClosedChannel { .. })));
        assert!(matches!(channel.size(), Err(Error::ClosedChannel { .. })));
        let mut buf = [0u8; 1];
        assert!(matches!(channel.read(&mut buf), Err(Error::ClosedChannel { .. })));
        // closing twice is a no-op
        channel.close();
        assert!(!channel.is_open());
    }

    #[test]
    fn write_and_truncate_always_fail() {
        let mut server = mockito::Server::new();
        let _m = server.mock("GET", "/x").with_status(200).with_body("abc").create();
        let uri = format!("{}/x", server.url());
        let settings = channel_settings(0);
        let client = crate::http_client::build_client(&settings).unwrap();
        let mut channel = HttpByteChannel::open(client, settings, uri, 0).unwrap();
        assert!(matches!(channel.write(b"x"), Err(Error::NonWritableChannel { .. })));
        assert!(matches!(channel.truncate(0), Err(Error::NonWritableChannel { .. })));
    }

    #[test]
    fn end_of_stream_leaves_position_unchanged() {
        let mut server = mockito::Server::new();
        let _m = server.mock("GET", "/short").with_status(200).with_body("ab").create();
        let uri = format!("{}/short", server.url());
        let settings = channel_settings(0);
        let client = crate::http_client::build_client(&settings).unwrap();
        let mut channel = HttpByteChannel::open(client, settings, uri, 0).unwrap();

        let mut buf = [0u8; 2];
        assert_eq!(channel.read(&mut buf).unwrap(), 2);
        assert_eq!(channel.position().unwrap(), 2);
        let mut buf2 = [0u8; 4];
        assert_eq!(channel.read(&mut buf2).unwrap(), -1);
        assert_eq!(channel.position().unwrap(), 2);
    }
}
