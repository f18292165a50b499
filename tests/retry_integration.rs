//! Exercises the retry engine from outside, through the public surfaces
//! that actually drive it: `http_client::exists` and an open channel's
//! `read`/`open`.

use http_nio::settings::Settings;
use http_nio::{http_client, HttpByteChannel};

fn settings_with_retries(max_retries: u32) -> Settings {
    let mut settings = Settings::default();
    settings.retry.max_retries = max_retries;
    settings
}

#[test]
fn exists_recovers_from_one_transient_503() {
    let mut server = mockito::Server::new();
    // mockito matches the most recently created mock first, falling back to
    // earlier ones once an `expect()`-bounded mock is exhausted: the 200
    // response is the fallback registered first, the 503 is the one-shot
    // override registered second so it is tried (and consumed) before it.
    let _fallback = server.mock("HEAD", "/flaky").with_status(200).create();
    let _transient = server
        .mock("HEAD", "/flaky")
        .with_status(503)
        .expect(1)
        .create();

    let settings = settings_with_retries(2);
    let client = http_client::build_client(&settings).unwrap();
    let uri = format!("{}/flaky", server.url());

    assert!(http_client::exists(&client, &uri, &settings).unwrap());
}

#[test]
fn exists_exhausts_retries_on_persistent_503() {
    let mut server = mockito::Server::new();
    let _m = server
        .mock("HEAD", "/always-503")
        .with_status(503)
        .expect(2)
        .create();

    let settings = settings_with_retries(1);
    let client = http_client::build_client(&settings).unwrap();
    let uri = format!("{}/always-503", server.url());

    let err = http_client::exists(&client, &uri, &settings).unwrap_err();
    assert!(matches!(err, http_nio::Error::OutOfRetries { attempts: 2, .. }));
    _m.assert();
}

#[test]
fn open_surfaces_a_non_retryable_status_immediately() {
    let mut server = mockito::Server::new();
    let _m = server
        .mock("GET", "/forbidden")
        .with_status(403)
        .expect(1)
        .create();

    let settings = settings_with_retries(5);
    let client = http_client::build_client(&settings).unwrap();
    let uri = format!("{}/forbidden", server.url());

    let err = HttpByteChannel::open(client, settings, uri, 0).unwrap_err();
    assert!(matches!(err, http_nio::Error::UnexpectedHttpResponse { status: 403, .. }));
    _m.assert();
}

#[test]
fn open_retries_past_a_transient_failure_before_any_bytes_are_returned() {
    // This checks the boundary the engine actually enforces for `open`: a
    // retryable wire failure is retried transparently before the caller
    // ever sees a channel, not that a failure mid-stream is recoverable
    // (mockito has no way to interrupt a response body partway through).
    let mut server = mockito::Server::new();
    let _fallback = server
        .mock("GET", "/dataset.bin")
        .with_status(200)
        .with_body("payload")
        .create();
    let _transient = server
        .mock("GET", "/dataset.bin")
        .with_status(503)
        .expect(1)
        .create();

    let settings = settings_with_retries(2);
    let client = http_client::build_client(&settings).unwrap();
    let uri = format!("{}/dataset.bin", server.url());

    let mut channel = HttpByteChannel::open(client, settings, uri, 0).unwrap();
    let mut buf = [0u8; 7];
    assert_eq!(channel.read(&mut buf).unwrap(), 7);
    assert_eq!(&buf, b"payload");
}
