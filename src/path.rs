//! The URL-as-path model.
//!
//! `tough` never needed a `Path` abstraction of its own — it addresses
//! remote objects by plain `String` URLs. This module is new: it brings the
//! crate's path algebra up to the host filesystem SPI's `Path` contract,
//! grounded in how `url::Url` already models authority/path/query/fragment,
//! generalized with the comparison, resolution, and subpath rules a
//! filesystem `Path` implementation needs.

use crate::error::Error;
use crate::provider::HttpFileSystem;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// One path on an [`HttpFileSystem`]: a normalized, percent-encoded byte
/// sequence plus an optional query and fragment, all preserved verbatim.
#[derive(Clone)]
pub struct HttpPath {
    fs: Arc<HttpFileSystem>,
    bytes: String,
    query: Option<String>,
    fragment: Option<String>,
    absolute: bool,
}

impl std::fmt::Debug for HttpPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPath")
            .field("authority", &self.fs.authority())
            .field("bytes", &self.bytes)
            .field("query", &self.query)
            .field("fragment", &self.fragment)
            .field("absolute", &self.absolute)
            .finish()
    }
}

impl std::fmt::Display for HttpPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.absolute {
            write!(f, "/{}", self.bytes.trim_start_matches('/'))?;
        } else {
            write!(f, "{}", self.bytes)?;
        }
        if let Some(q) = &self.query {
            write!(f, "?{}", q)?;
        }
        if let Some(fr) = &self.fragment {
            write!(f, "#{}", fr)?;
        }
        Ok(())
    }
}

impl HttpPath {
    /// Builds a path directly from its normalized components, validating that
    /// the raw bytes contain no embedded NUL and are either empty or start
    /// with `/`.
    pub(crate) fn new(
        fs: Arc<HttpFileSystem>,
        raw_path: &str,
        query: Option<String>,
        fragment: Option<String>,
        absolute: bool,
    ) -> Result<Self, Error> {
        if raw_path.contains('\0') {
            return Err(Error::InvalidPath {
                message: "path contains a NUL byte".to_string(),
            });
        }
        if !raw_path.is_empty() && !raw_path.starts_with('/') {
            return Err(Error::InvalidPath {
                message: format!("path '{}' must be empty or start with '/'", raw_path),
            });
        }
        Ok(Self {
            fs,
            bytes: normalize(raw_path),
            query,
            fragment,
            absolute,
        })
    }

    /// Builds a relative path from already-normalized segment bytes (no
    /// leading `/` required), used internally by [`Self::name`] and
    /// [`Self::subpath`] — these return a bare segment slice with no
    /// query/fragment of their own, unlike [`Self::file_name`].
    fn from_relative_bytes(fs: Arc<HttpFileSystem>, bytes: String) -> Self {
        Self {
            fs,
            bytes,
            query: None,
            fragment: None,
            absolute: false,
        }
    }

    /// The root path for `fs`: absolute, empty byte sequence, no query or
    /// fragment.
    pub(crate) fn root(fs: Arc<HttpFileSystem>) -> Self {
        Self {
            fs,
            bytes: String::new(),
            query: None,
            fragment: None,
            absolute: true,
        }
    }

    /// Builds an absolute path from a parsed URI's path, query, and fragment
    ///. Does not check that `uri`'s
    /// scheme/authority match `fs`; callers validate that separately.
    pub(crate) fn from_uri(fs: Arc<HttpFileSystem>, uri: &url::Url) -> Result<Self, Error> {
        Self::new(
            fs,
            uri.path(),
            uri.query().map(str::to_string),
            uri.fragment().map(str::to_string),
            true,
        )
    }

    /// Builds an absolute path by joining `first` and `more` with `/`.
    ///
    /// Fails with [`Error::InvalidPath`] if the concatenation does not start
    /// with `/`.
    pub(crate) fn from_parts(fs: Arc<HttpFileSystem>, first: &str, more: &[&str]) -> Result<Self, Error> {
        let mut combined = first.to_string();
        for part in more {
            if !combined.is_empty() && !combined.ends_with('/') && !part.starts_with('/') {
                combined.push('/');
            }
            combined.push_str(part);
        }
        if !combined.starts_with('/') {
            return Err(Error::InvalidPath {
                message: format!("concatenated path '{}' must be absolute", combined),
            });
        }
        Self::new(fs, &combined, None, None, true)
    }

    /// The filesystem this path belongs to.
    pub fn file_system(&self) -> &Arc<HttpFileSystem> {
        &self.fs
    }

    /// `true` for an absolute path.
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// The raw, normalized, percent-encoded path bytes (no query/fragment).
    pub fn raw_path(&self) -> &str {
        &self.bytes
    }

    /// The query component, if any, exactly as given at construction.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// The fragment component, if any, exactly as given at construction.
    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    fn segments(&self) -> Vec<&str> {
        if self.bytes.is_empty() {
            Vec::new()
        } else {
            self.bytes.trim_start_matches('/').split('/').collect()
        }
    }

    /// The number of name segments. `0` for root
    /// or an empty relative path.
    pub fn name_count(&self) -> usize {
        self.segments().len()
    }

    /// The last name segment as a relative path, or `None` for root.
    ///
    /// Carries `self`'s query and fragment forward onto the returned leaf
    /// path (rather than dropping them via [`Self::from_relative_bytes`]):
    /// `resolve` adopts `other`'s query/fragment, so `parent().resolve(file_name())`
    /// must round-trip back to the original URI's query/fragment, not lose them.
    pub fn file_name(&self) -> Option<HttpPath> {
        let segments = self.segments();
        segments.last().map(|last| Self {
            fs: self.fs.clone(),
            bytes: (*last).to_string(),
            query: self.query.clone(),
            fragment: self.fragment.clone(),
            absolute: false,
        })
    }

    /// All but the last name segment, preserving the absolute flag; the
    /// root's parent is itself.
    pub fn parent(&self) -> HttpPath {
        let segments = self.segments();
        if segments.is_empty() {
            return self.clone();
        }
        let without_last = &segments[..segments.len() - 1];
        let bytes = join_segments(without_last, self.absolute);
        Self {
            fs: self.fs.clone(),
            bytes,
            query: None,
            fragment: None,
            absolute: self.absolute,
        }
    }

    /// The name segment at index `index` as a relative path. Fails with [`Error::InvalidArgument`] out of range.
    pub fn name(&self, index: usize) -> Result<HttpPath, Error> {
        self.subpath(index, index + 1)
    }

    /// The segments `[begin, end)` joined as a relative path. Fails with [`Error::InvalidArgument`] if the bounds are
    /// out of range or `begin >= end`.
    pub fn subpath(&self, begin: usize, end: usize) -> Result<HttpPath, Error> {
        let segments = self.segments();
        if begin >= segments.len() || end > segments.len() || begin >= end {
            return Err(Error::InvalidArgument {
                message: format!(
                    "subpath({}, {}) out of range for a path with {} segments",
                    begin,
                    end,
                    segments.len()
                ),
            });
        }
        let bytes = join_segments(&segments[begin..end], false);
        Ok(HttpPath::from_relative_bytes(self.fs.clone(), bytes))
    }

    /// `true` if `other` is a segment-wise prefix of `self`. `false` if `other` belongs to a different filesystem
    /// authority. A trailing `/` on `other` is ignored.
    pub fn starts_with(&self, other: &HttpPath) -> bool {
        if self.fs.scheme() != other.fs.scheme()
            || !self.fs.authority().eq_ignore_ascii_case(other.fs.authority())
        {
            return false;
        }
        if self.absolute != other.absolute {
            return false;
        }
        let self_segments = self.segments();
        let other_segments = other.segments();
        if other_segments.len() > self_segments.len() {
            return false;
        }
        self_segments[..other_segments.len()] == other_segments[..]
    }

    /// `true` if `other` (a [`HttpPath`] or a raw string) is a segment-wise
    /// suffix of `self`. The string overload
    /// compares against the last segment's raw text directly rather than
    /// re-parsing it as a path, so `"bar"` matches a trailing `/foo/bar` the
    /// same way a relative path built from `"bar"` would.
    pub fn ends_with<A: EndsWithTarget>(&self, other: &A) -> bool {
        other.matches_suffix_of(self)
    }

    /// Resolves `other` against `self`.
    ///
    /// `None` returns `self` unchanged. An absolute `other` cannot be
    /// resolved against anything and fails with
    /// [`Error::UnsupportedOperation`]; this crate has no notion of "replace
    /// entirely with an absolute path" the way some filesystem SPIs do.
    pub fn resolve(&self, other: Option<&HttpPath>) -> Result<HttpPath, Error> {
        let other = match other {
            None => return Ok(self.clone()),
            Some(o) => o,
        };
        if other.absolute {
            return Err(Error::UnsupportedOperation {
                message: "resolving against an absolute path is not supported".to_string(),
            });
        }
        let mut segments = self.segments();
        segments.extend(other.segments());
        let bytes = join_segments(&segments, self.absolute);
        Ok(Self {
            fs: self.fs.clone(),
            bytes,
            query: other.query.clone(),
            fragment: other.fragment.clone(),
            absolute: self.absolute,
        })
    }

    /// Resolves a relative-reference string against `self`, parsing out its
    /// query and fragment first.
    ///
    /// Rejects a path component containing unencoded characters (e.g. a
    /// literal space) with [`Error::InvalidArgument`], and an absolute path
    /// component with [`Error::UnsupportedOperation`] (same as
    /// [`Self::resolve`]).
    pub fn resolve_str(&self, other: &str) -> Result<HttpPath, Error> {
        let (path_part, query, fragment) = parse_relative_reference(other)?;
        let relative = HttpPath {
            fs: self.fs.clone(),
            bytes: path_part,
            query,
            fragment,
            absolute: false,
        };
        if relative.bytes.starts_with('/') {
            return Err(Error::UnsupportedOperation {
                message: "resolving against an absolute path is not supported".to_string(),
            });
        }
        self.resolve(Some(&relative))
    }

    /// Resolves `other` against `self`'s parent. Unlike [`Self::resolve`], `None` fails with
    /// [`Error::InvalidArgument`]: there is no sibling-of-nothing.
    pub fn resolve_sibling(&self, other: Option<&HttpPath>) -> Result<HttpPath, Error> {
        match other {
            None => Err(Error::InvalidArgument {
                message: "resolveSibling requires a path".to_string(),
            }),
            Some(_) => self.parent().resolve(other),
        }
    }

    /// Reconstructs the full `scheme://authority/path[?query][#fragment]`
    /// URI for this path. Round-trips with
    /// [`Self::from_uri`] for an absolute path.
    pub fn to_uri(&self) -> Result<url::Url, Error> {
        let path_part = if self.absolute {
            self.bytes.clone()
        } else {
            format!("/{}", self.bytes)
        };
        let mut text = format!("{}://{}{}", self.fs.scheme(), self.fs.authority(), path_part);
        if let Some(q) = &self.query {
            text.push('?');
            text.push_str(q);
        }
        if let Some(fr) = &self.fragment {
            text.push('#');
            text.push_str(fr);
        }
        url::Url::parse(&text).map_err(|source| Error::UriParse {
            input: text,
            source,
        })
    }

    /// Returns `self` if already absolute, otherwise a twin with the
    /// absolute flag set.
    pub fn to_absolute_path(&self) -> HttpPath {
        if self.absolute {
            self.clone()
        } else {
            Self {
                absolute: true,
                ..self.clone()
            }
        }
    }

    /// Always fails: there is no local filesystem mapping for a remote
    /// HTTP resource.
    pub fn to_file(&self) -> Result<std::path::PathBuf, Error> {
        Err(Error::UnsupportedOperation {
            message: "toFile is not supported for HTTP paths".to_string(),
        })
    }

    /// Always fails: this filesystem has no watch-service support.
    pub fn register(&self) -> Result<(), Error> {
        Err(Error::UnsupportedOperation {
            message: "register (WatchService) is not supported".to_string(),
        })
    }

    /// Always fails: `.`/`..` normalization is left unimplemented rather than
    /// guessing at semantics an HTTP path never exercises.
    pub fn normalize(&self) -> Result<HttpPath, Error> {
        Err(Error::UnsupportedOperation {
            message: "normalize is not supported".to_string(),
        })
    }

    /// Always fails: relativizing two remote paths against each other is
    /// out of scope.
    pub fn relativize(&self, _other: &HttpPath) -> Result<HttpPath, Error> {
        Err(Error::UnsupportedOperation {
            message: "relativize is not supported".to_string(),
        })
    }

    /// Always fails: there is no real (canonical, symlink-resolved)
    /// filesystem path for a remote HTTP resource.
    pub fn to_real_path(&self) -> Result<HttpPath, Error> {
        Err(Error::UnsupportedOperation {
            message: "toRealPath is not supported for HTTP paths".to_string(),
        })
    }
}

/// The target type of [`HttpPath::ends_with`]: either a full [`HttpPath`] or
/// a raw segment string, matching the host SPI's two-overload `endsWith`.
pub trait EndsWithTarget {
    fn matches_suffix_of(&self, path: &HttpPath) -> bool;
}

impl EndsWithTarget for HttpPath {
    fn matches_suffix_of(&self, path: &HttpPath) -> bool {
        if path.fs.scheme() != self.fs.scheme()
            || !path.fs.authority().eq_ignore_ascii_case(self.fs.authority())
        {
            return false;
        }
        let self_segments = path.segments();
        let other_segments = self.segments();
        if other_segments.len() > self_segments.len() {
            return false;
        }
        if self.absolute && other_segments.len() != self_segments.len() {
            return false;
        }
        self_segments[self_segments.len() - other_segments.len()..] == other_segments[..]
    }
}

impl EndsWithTarget for str {
    /// A leading `/` makes `other` behave as an absolute path for this
    /// comparison, which (per the host SPI's contract) can only "end" a
    /// path by being equal to it — so `"/foo/bar".endsWith("/bar")` is
    /// `false` even though `"/foo/bar".endsWith("bar")` is `true`.
    fn matches_suffix_of(&self, path: &HttpPath) -> bool {
        if self.is_empty() {
            return true;
        }
        if self.starts_with('/') {
            return normalize(self) == path.bytes;
        }
        let trimmed = self.trim_end_matches('/');
        let other_segments: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').collect()
        };
        let self_segments = path.segments();
        if other_segments.len() > self_segments.len() {
            return false;
        }
        self_segments[self_segments.len() - other_segments.len()..] == other_segments[..]
    }
}

impl PartialEq for HttpPath {
    fn eq(&self, other: &Self) -> bool {
        self.absolute == other.absolute && self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HttpPath {}

impl PartialOrd for HttpPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HttpPath {
    /// Orders by scheme, then authority (case-insensitive), then path
    /// bytes, then byte length, then query, then fragment, treating an
    /// absent query or fragment as sorting before a present one.
    ///
    /// Comparing across schemes never arises through the public API (the
    /// registry keys filesystems by `(scheme, authority)`, so a caller can
    /// only ever hold paths belonging to one scheme's provider at a time
    /// per authority string), but the scheme is included anyway so two
    /// `HttpPath`s can never compare equal unless they truly belong to the
    /// same provider, matching the source system's "different providers
    /// are never equal" rule.
    fn cmp(&self, other: &Self) -> Ordering {
        self.fs
            .scheme()
            .cmp(other.fs.scheme())
            .then_with(|| {
                self.fs
                    .authority()
                    .to_ascii_lowercase()
                    .cmp(&other.fs.authority().to_ascii_lowercase())
            })
            .then_with(|| self.bytes.cmp(&other.bytes))
            .then_with(|| self.bytes.len().cmp(&other.bytes.len()))
            .then_with(|| compare_option(&self.query, &other.query))
            .then_with(|| compare_option(&self.fragment, &other.fragment))
    }
}

impl Hash for HttpPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fs.scheme().hash(state);
        self.fs.authority().to_ascii_lowercase().hash(state);
        self.absolute.hash(state);
        self.bytes.hash(state);
        self.query.hash(state);
        self.fragment.hash(state);
    }
}

fn compare_option(a: &Option<String>, b: &Option<String>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.cmp(b),
    }
}

fn join_segments(segments: &[&str], absolute: bool) -> String {
    if segments.is_empty() {
        String::new()
    } else if absolute {
        format!("/{}", segments.join("/"))
    } else {
        segments.join("/")
    }
}

/// Collapses repeated `/` separators and strips a single trailing `/`,
/// leaving the canonical root representation (an empty string) alone.
fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let mut collapsed = String::with_capacity(raw.len());
    let mut last_was_slash = false;
    for ch in raw.chars() {
        if ch == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        collapsed.push(ch);
    }
    if collapsed == "/" {
        String::new()
    } else if collapsed.len() > 1 && collapsed.ends_with('/') {
        collapsed.pop();
        collapsed
    } else {
        collapsed
    }
}

/// Splits a relative-reference string into its path, query, and fragment
/// parts, rejecting any unencoded byte outside the URI-reference charset.
fn parse_relative_reference(raw: &str) -> Result<(String, Option<String>, Option<String>), Error> {
    let (rest, fragment) = match raw.find('#') {
        Some(i) => (&raw[..i], Some(raw[i + 1..].to_string())),
        None => (raw, None),
    };
    let (path_part, query) = match rest.find('?') {
        Some(i) => (&rest[..i], Some(rest[i + 1..].to_string())),
        None => (rest, None),
    };
    if !is_valid_uri_reference_component(path_part) {
        return Err(Error::InvalidArgument {
            message: format!("'{}' contains characters that must be percent-encoded", raw),
        });
    }
    Ok((path_part.to_string(), query, fragment))
}

fn is_valid_uri_reference_component(s: &str) -> bool {
    s.bytes().all(|b| {
        matches!(b,
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9'
            | b'-' | b'.' | b'_' | b'~' | b'!' | b'$' | b'&' | b'\'' | b'(' | b')'
            | b'*' | b'+' | b',' | b';' | b'=' | b':' | b'@' | b'/' | b'%'
        )
    })
}
