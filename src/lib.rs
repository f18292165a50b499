//! Read-only, randomly-seekable byte channels over HTTP/HTTPS, exposed
//! through a filesystem-path style API.
//!
//! A caller obtains an [`HttpPath`] from an [`HttpFileSystemProvider`], which
//! lazily creates (or reuses) the [`HttpFileSystem`] for that URL's
//! authority. Opening a byte channel on that path returns an
//! [`HttpByteChannel`]: a stateful, seekable reader over one HTTP(S)
//! resource, backed by a shared `reqwest` client and a [`RetryEngine`] bound
//! to that resource's URI. Every network call — open, read, seek, `HEAD` for
//! size, and the standalone [`http_client::exists`] probe — goes through
//! that retry engine, which classifies failures against a [`Settings`] value
//! and applies exponential backoff.
//!
//! This crate has no write support, no directory listing, no caching layer,
//! and no protocol beyond plain HTTP/1.1 range requests. It exists to let a
//! caller treat a URL like a local file: check its size, seek to an
//! arbitrary offset, and read bytes, without downloading the whole object.

pub mod cause;
pub mod channel;
pub mod error;
pub mod http_client;
pub mod path;
pub mod provider;
pub mod retry;
pub mod settings;

pub use channel::{HttpByteChannel, SKIP_DISTANCE};
pub use error::{Error, Result};
pub use path::{EndsWithTarget, HttpPath};
pub use provider::{AccessMode, BasicFileAttributes, HttpFileSystem, HttpFileSystemProvider, Scheme};
pub use retry::RetryEngine;
pub use settings::{
    default_settings, set_default_settings, RedirectPolicy, RetryableKind, RetrySettings, Settings,
};
