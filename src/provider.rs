//! The provider and filesystem registry.
//!
//! `tough` has nothing resembling this layer — it opens one `Repository`
//! against one pair of metadata/targets URLs and is done. This module is new:
//! a per-authority filesystem cache keyed by (scheme, authority), grounded in
//! the process-wide `once_cell::sync::Lazy<RwLock<_>>` singleton pattern
//! already used for [`crate::settings::default_settings`], generalized to a
//! map instead of a single cell.

use crate::channel::HttpByteChannel;
use crate::error::Error;
use crate::http_client::{build_client, exists};
use crate::path::HttpPath;
use crate::settings::Settings;
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use url::Url;

/// The two schemes this crate's provider registers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// A single open-for-read mode; the only access mode this filesystem
/// supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
}

/// A minimal attribute record for a path. The only thing it exposes beyond
/// "this is a regular file" is whatever the channel itself can report;
/// everything richer fails with [`Error::UnsupportedOperation`].
#[derive(Debug, Clone, Copy)]
pub struct BasicFileAttributes;

impl BasicFileAttributes {
    pub fn is_regular_file(&self) -> bool {
        true
    }

    pub fn is_directory(&self) -> bool {
        false
    }
}

type RegistryKey = (Scheme, String);

static FILESYSTEMS: Lazy<RwLock<HashMap<RegistryKey, Arc<HttpFileSystem>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn registry_key(scheme: Scheme, authority: &str) -> RegistryKey {
    (scheme, authority.to_ascii_lowercase())
}

/// Extracts and validates a URI's authority for `scheme`.
fn require_authority(uri: &Url, scheme: Scheme) -> Result<String, Error> {
    if uri.scheme() != scheme.as_str() {
        return Err(Error::ProviderMismatch);
    }
    let host = uri.host_str().ok_or_else(|| Error::InvalidArgument {
        message: "URI has no authority".to_string(),
    })?;
    let host_port = match uri.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    Ok(if uri.username().is_empty() {
        host_port
    } else {
        format!("{}@{}", uri.username(), host_port)
    })
}

/// The provider for one scheme. `Http` and `Https` are
/// distinct providers, each with its own filesystem cache entries (the
/// registry key includes the scheme), mirroring the source system's
/// `HttpFileSystemProvider`/`HttpsFileSystemProvider` pair.
#[derive(Debug, Clone, Copy)]
pub struct HttpFileSystemProvider {
    scheme: Scheme,
}

impl HttpFileSystemProvider {
    pub fn for_scheme(scheme: Scheme) -> Self {
        Self { scheme }
    }

    pub fn http() -> Self {
        Self::for_scheme(Scheme::Http)
    }

    pub fn https() -> Self {
        Self::for_scheme(Scheme::Https)
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Creates a new filesystem for `uri`'s authority with `settings`
    ///. Fails with
    /// [`Error::FileSystemAlreadyExists`] if one is already registered.
    pub fn new_file_system(&self, uri: &Url, settings: Settings) -> Result<Arc<HttpFileSystem>, Error> {
        let authority = require_authority(uri, self.scheme)?;
        let key = registry_key(self.scheme, &authority);
        let mut registry = FILESYSTEMS.write().expect("filesystem registry lock poisoned");
        if registry.contains_key(&key) {
            return Err(Error::FileSystemAlreadyExists { authority });
        }
        let client = build_client(&settings)?;
        let fs = Arc::new(HttpFileSystem {
            scheme: self.scheme,
            authority: authority.clone(),
            settings,
            client,
        });
        registry.insert(key, fs.clone());
        Ok(fs)
    }

    /// Looks up the filesystem already registered for `uri`'s authority
    ///. Fails with
    /// [`Error::FileSystemNotFound`] if none exists.
    pub fn get_file_system(&self, uri: &Url) -> Result<Arc<HttpFileSystem>, Error> {
        let authority = require_authority(uri, self.scheme)?;
        let key = registry_key(self.scheme, &authority);
        FILESYSTEMS
            .read()
            .expect("filesystem registry lock poisoned")
            .get(&key)
            .cloned()
            .ok_or(Error::FileSystemNotFound { authority })
    }

    /// Resolves `uri` to a path, lazily creating its filesystem with the
    /// process-wide default settings if one is not already registered.
    pub fn get_path(&self, uri: &Url) -> Result<HttpPath, Error> {
        let authority = require_authority(uri, self.scheme)?;
        let key = registry_key(self.scheme, &authority);
        let existing = FILESYSTEMS
            .read()
            .expect("filesystem registry lock poisoned")
            .get(&key)
            .cloned();
        let fs = match existing {
            Some(fs) => fs,
            None => self.get_or_create(&authority)?,
        };
        fs.path_from_uri(uri)
    }

    fn get_or_create(&self, authority: &str) -> Result<Arc<HttpFileSystem>, Error> {
        let key = registry_key(self.scheme, authority);
        let mut registry = FILESYSTEMS.write().expect("filesystem registry lock poisoned");
        if let Some(fs) = registry.get(&key) {
            return Ok(fs.clone());
        }
        let settings = crate::settings::default_settings();
        let client = build_client(&settings)?;
        let fs = Arc::new(HttpFileSystem {
            scheme: self.scheme,
            authority: authority.to_string(),
            settings,
            client,
        });
        registry.insert(key, fs.clone());
        Ok(fs)
    }
}

/// One registered authority: a shared client, its settings, and the ability
/// to open channels and paths against it.
#[derive(Debug)]
pub struct HttpFileSystem {
    scheme: Scheme,
    authority: String,
    settings: Settings,
    client: Client,
}

impl HttpFileSystem {
    pub fn scheme(&self) -> &'static str {
        self.scheme.as_str()
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The root path on this filesystem.
    pub fn root_path(self: &Arc<Self>) -> HttpPath {
        HttpPath::root(self.clone())
    }

    /// Builds a path from `first`/`more` strings rooted at this filesystem.
    pub fn path(self: &Arc<Self>, first: &str, more: &[&str]) -> Result<HttpPath, Error> {
        HttpPath::from_parts(self.clone(), first, more)
    }

    fn path_from_uri(self: &Arc<Self>, uri: &Url) -> Result<HttpPath, Error> {
        let authority = require_authority(uri, self.scheme)?;
        if !authority.eq_ignore_ascii_case(&self.authority) {
            return Err(Error::ProviderMismatch);
        }
        HttpPath::from_uri(self.clone(), uri)
    }

    /// Opens a byte channel for `path`.
    ///
    /// `options` must be empty or exactly `[AccessMode::Read]` — read is the
    /// filesystem's only supported mode, so any other combination (a write
    /// mode, or a duplicated option) fails with
    /// [`Error::UnsupportedOperation`].
    pub fn new_byte_channel(
        self: &Arc<Self>,
        path: &HttpPath,
        options: &[AccessMode],
    ) -> Result<HttpByteChannel, Error> {
        if options.len() > 1 {
            return Err(Error::UnsupportedOperation {
                message: "newByteChannel supports at most one option".to_string(),
            });
        }
        self.check_same_filesystem(path)?;
        let uri = path.to_uri()?;
        HttpByteChannel::open(self.client.clone(), self.settings.clone(), uri.to_string(), 0)
    }

    /// Checks `path`'s existence for `modes`.
    /// Only [`AccessMode::Read`] is meaningful; anything else fails with
    /// [`Error::UnsupportedOperation`].
    pub fn check_access(&self, path: &HttpPath, modes: &[AccessMode]) -> Result<(), Error> {
        for mode in modes {
            match mode {
                AccessMode::Read => {}
            }
        }
        let uri = path.to_uri()?;
        if exists(&self.client, uri.as_str(), &self.settings)? {
            Ok(())
        } else {
            Err(Error::FileNotFound {
                url: uri.to_string(),
            })
        }
    }

    /// Reads basic attributes for `path`.
    /// Existence is not checked here; callers that need existence should
    /// call [`Self::check_access`] first.
    pub fn read_attributes(&self, _path: &HttpPath) -> Result<BasicFileAttributes, Error> {
        Ok(BasicFileAttributes)
    }

    fn check_same_filesystem(&self, path: &HttpPath) -> Result<(), Error> {
        if path.file_system().authority().eq_ignore_ascii_case(&self.authority) {
            Ok(())
        } else {
            Err(Error::ProviderMismatch)
        }
    }

    /// Always fails: this filesystem is read-only.
    pub fn create_directory(&self, _path: &HttpPath) -> Result<(), Error> {
        Err(Error::UnsupportedOperation {
            message: "createDirectory is not supported".to_string(),
        })
    }

    /// Always fails: this filesystem is read-only.
    pub fn delete(&self, _path: &HttpPath) -> Result<(), Error> {
        Err(Error::UnsupportedOperation {
            message: "delete is not supported".to_string(),
        })
    }

    /// Always fails: this filesystem is read-only.
    pub fn copy(&self, _source: &HttpPath, _target: &HttpPath) -> Result<(), Error> {
        Err(Error::UnsupportedOperation {
            message: "copy is not supported".to_string(),
        })
    }

    /// Always fails: this filesystem is read-only.
    pub fn mv(&self, _source: &HttpPath, _target: &HttpPath) -> Result<(), Error> {
        Err(Error::UnsupportedOperation {
            message: "move is not supported".to_string(),
        })
    }

    /// Always fails: no mutable attribute exists to set.
    pub fn set_attribute(&self, _path: &HttpPath, _name: &str) -> Result<(), Error> {
        Err(Error::UnsupportedOperation {
            message: "setAttribute is not supported".to_string(),
        })
    }

    /// Always fails: the remote side is an opaque byte stream, not a
    /// directory.
    pub fn new_directory_stream(&self, _path: &HttpPath) -> Result<(), Error> {
        Err(Error::UnsupportedOperation {
            message: "newDirectoryStream is not supported".to_string(),
        })
    }

    /// Always fails: there is no change-notification mechanism over plain
    /// HTTP.
    pub fn watch(&self, _path: &HttpPath) -> Result<(), Error> {
        Err(Error::UnsupportedOperation {
            message: "watch (WatchService) is not supported".to_string(),
        })
    }

    /// Always fails: glob/path matching is out of scope.
    pub fn path_matcher(&self, _syntax_and_pattern: &str) -> Result<(), Error> {
        Err(Error::UnsupportedOperation {
            message: "getPathMatcher is not supported".to_string(),
        })
    }

    /// Always fails: there is no local file store behind a remote resource.
    pub fn file_store(&self, _path: &HttpPath) -> Result<(), Error> {
        Err(Error::UnsupportedOperation {
            message: "getFileStore is not supported".to_string(),
        })
    }
}
