//! End-to-end coverage of the provider, path, and channel working together
//! against a real (mocked) HTTP server, rather than each module's own
//! narrower unit tests.

use http_nio::{AccessMode, HttpFileSystemProvider, Scheme, Settings};
use url::Url;

fn provider() -> HttpFileSystemProvider {
    HttpFileSystemProvider::for_scheme(Scheme::Http)
}

#[test]
fn open_path_read_full_body_and_check_attributes() {
    let mut server = mockito::Server::new();
    let _get = server
        .mock("GET", "/dataset/part-0.csv")
        .with_status(200)
        .with_header("content-length", "11")
        .with_body("a,b,c,1,2,3")
        .create();
    let _head = server
        .mock("HEAD", "/dataset/part-0.csv")
        .with_status(200)
        .with_header("content-length", "11")
        .create();

    let base = Url::parse(&server.url()).unwrap();
    let provider = provider();
    let fs = provider.new_file_system(&base, Settings::default()).unwrap();

    let path = fs.path("/dataset/part-0.csv", &[]).unwrap();
    assert_eq!(path.file_name().unwrap().raw_path(), "part-0.csv");
    assert_eq!(path.parent().raw_path(), "/dataset");

    fs.check_access(&path, &[AccessMode::Read]).unwrap();
    let attrs = fs.read_attributes(&path).unwrap();
    assert!(attrs.is_regular_file());
    assert!(!attrs.is_directory());

    let mut channel = fs.new_byte_channel(&path, &[AccessMode::Read]).unwrap();
    assert_eq!(channel.size().unwrap(), 11);
    let mut buf = [0u8; 11];
    assert_eq!(channel.read(&mut buf).unwrap(), 11);
    assert_eq!(&buf, b"a,b,c,1,2,3");
    channel.close();
}

#[test]
fn get_path_through_provider_lazily_creates_filesystem_from_uri() {
    let mut server = mockito::Server::new();
    let _head = server.mock("HEAD", "/report.pdf").with_status(200).create();

    let uri = Url::parse(&format!("{}/report.pdf", server.url())).unwrap();
    let provider = provider();
    let path = provider.get_path(&uri).unwrap();
    assert_eq!(path.raw_path(), "/report.pdf");

    let fs = path.file_system();
    fs.check_access(&path, &[AccessMode::Read]).unwrap();
}

#[test]
fn check_access_reports_not_found_for_missing_resource() {
    let mut server = mockito::Server::new();
    let _head = server.mock("HEAD", "/missing.bin").with_status(404).create();

    let base = Url::parse(&server.url()).unwrap();
    let provider = provider();
    let fs = provider.new_file_system(&base, Settings::default()).unwrap();
    let path = fs.path("/missing.bin", &[]).unwrap();

    let err = fs.check_access(&path, &[AccessMode::Read]).unwrap_err();
    assert!(matches!(err, http_nio::Error::FileNotFound { .. }));
}

#[test]
fn new_byte_channel_rejects_a_path_from_a_different_filesystem() {
    let mut server_a = mockito::Server::new();
    let mut server_b = mockito::Server::new();
    let _head_a = server_a.mock("HEAD", "/x").with_status(200).create();
    let _head_b = server_b.mock("HEAD", "/x").with_status(200).create();

    let provider = provider();
    let fs_a = provider
        .new_file_system(&Url::parse(&server_a.url()).unwrap(), Settings::default())
        .unwrap();
    let fs_b = provider
        .new_file_system(&Url::parse(&server_b.url()).unwrap(), Settings::default())
        .unwrap();

    let path_from_b = fs_b.path("/x", &[]).unwrap();
    let err = fs_a.new_byte_channel(&path_from_b, &[AccessMode::Read]).unwrap_err();
    assert!(matches!(err, http_nio::Error::ProviderMismatch));
}

#[test]
fn new_byte_channel_rejects_more_than_one_access_mode() {
    let mut server = mockito::Server::new();
    let _m = server.mock("GET", "/x").with_status(200).with_body("x").create();

    let base = Url::parse(&server.url()).unwrap();
    let provider = provider();
    let fs = provider.new_file_system(&base, Settings::default()).unwrap();
    let path = fs.path("/x", &[]).unwrap();

    let err = fs
        .new_byte_channel(&path, &[AccessMode::Read, AccessMode::Read])
        .unwrap_err();
    assert!(matches!(err, http_nio::Error::UnsupportedOperation { .. }));
}

#[test]
fn mutating_operations_are_uniformly_unsupported() {
    let mut server = mockito::Server::new();
    let _m = server.mock("HEAD", "/x").with_status(200).create();

    let base = Url::parse(&server.url()).unwrap();
    let provider = provider();
    let fs = provider.new_file_system(&base, Settings::default()).unwrap();
    let path = fs.path("/x", &[]).unwrap();
    let other = fs.path("/y", &[]).unwrap();

    assert!(fs.create_directory(&path).is_err());
    assert!(fs.delete(&path).is_err());
    assert!(fs.copy(&path, &other).is_err());
    assert!(fs.mv(&path, &other).is_err());
    assert!(fs.set_attribute(&path, "anything").is_err());
    assert!(fs.new_directory_stream(&path).is_err());
    assert!(fs.watch(&path).is_err());
    assert!(fs.path_matcher("glob:*").is_err());
    assert!(fs.file_store(&path).is_err());
}
