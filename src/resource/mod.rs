//! Byte-resource access behind the `ResourceLoader` capability.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::location::{Location, Reference};

/// The kind of filesystem entry a pattern expansion should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    File,
    Directory,
}

/// A byte-addressable resource candidate, possibly absent.
#[derive(Debug, Clone)]
pub struct RawResource {
    description: String,
    path: PathBuf,
    exists: bool,
    directory: bool,
    classpath: bool,
}

impl RawResource {
    fn describe(classpath: bool, display: &str) -> String {
        if classpath {
            format!("class path resource [{display}]")
        } else {
            format!("file [{display}]")
        }
    }

    pub(crate) fn classpath(display: &str, path: PathBuf) -> RawResource {
        let exists = path.exists();
        let directory = path.is_dir();
        RawResource {
            description: Self::describe(true, display),
            path,
            exists,
            directory,
            classpath: true,
        }
    }

    pub(crate) fn file(display: &str, path: PathBuf) -> RawResource {
        let exists = path.exists();
        let directory = path.is_dir();
        RawResource {
            description: Self::describe(false, display),
            path,
            exists,
            directory,
            classpath: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn is_directory(&self) -> bool {
        self.directory
    }

    pub fn is_classpath(&self) -> bool {
        self.classpath
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// A stable identity for deduplication: the canonical filesystem path
    /// when the resource exists, the normalised lexical path otherwise.
    pub(crate) fn identity(&self) -> String {
        std::fs::canonicalize(&self.path)
            .unwrap_or_else(|_| self.path.clone())
            .to_string_lossy()
            .into_owned()
    }
}

impl fmt::Display for RawResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Capability used to turn location strings into [`RawResource`]s.
pub trait ResourceLoader {
    /// Resolves a single, non-pattern location. The returned resource may
    /// not exist; callers check [`RawResource::exists`].
    fn get_resource(&self, location: &str) -> Result<RawResource, Error>;

    /// Expands a `*` pattern into existing resources of the requested kind,
    /// in a deterministic (name-sorted) order.
    fn get_resources(&self, location: &str, kind: ResourceKind) -> Result<Vec<RawResource>, Error>;

    fn is_pattern(&self, location: &str) -> bool {
        location.contains('*')
    }
}

/// Filesystem-backed [`ResourceLoader`].
///
/// `classpath:` locations are searched across the configured classpath
/// roots in order; `file:` locations (and bare paths) resolve against the
/// base directory. Patterns support a single `*` segment matching one
/// directory level.
#[derive(Debug, Clone)]
pub struct FsResourceLoader {
    base: PathBuf,
    classpath_roots: Vec<PathBuf>,
}

impl FsResourceLoader {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            classpath_roots: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_classpath_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.classpath_roots.push(root.into());
        self
    }

    fn base_resolve(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(raw)
        }
    }

    /// Splits a pattern at its `*/` segment; errors on anything fancier.
    fn split_pattern<'a>(&self, location: &'a str) -> Result<(&'a str, &'a str), Error> {
        if location.matches('*').count() != 1 {
            return Err(Error::InvalidLocation {
                location: location.to_string(),
                reason: "patterns may contain exactly one '*'".to_string(),
            });
        }
        match location.find("*/") {
            Some(index) => Ok((&location[..index], &location[index + 2..])),
            None => Err(Error::InvalidLocation {
                location: location.to_string(),
                reason: "the '*' in a pattern must match a directory segment ('*/')".to_string(),
            }),
        }
    }

    /// Base directories a pattern prefix can expand under, as
    /// `(classpath, display_prefix, dir)` triples.
    fn pattern_bases(&self, prefix: &str) -> Vec<(bool, String, PathBuf)> {
        if let Some(rest) = prefix.strip_prefix("classpath:") {
            let rel = rest.trim_start_matches('/');
            self.classpath_roots
                .iter()
                .map(|root| (true, rel.to_string(), root.join(rel)))
                .collect()
        } else {
            let rest = prefix.strip_prefix("file:").unwrap_or(prefix);
            vec![(false, rest.to_string(), self.base_resolve(rest))]
        }
    }
}

impl ResourceLoader for FsResourceLoader {
    fn get_resource(&self, location: &str) -> Result<RawResource, Error> {
        if let Some(rest) = location.strip_prefix("classpath:") {
            let rel = rest.trim_start_matches('/');
            for root in &self.classpath_roots {
                let path = root.join(rel);
                if path.exists() {
                    return Ok(RawResource::classpath(rel, path));
                }
            }
            let anchor = self
                .classpath_roots
                .first()
                .cloned()
                .unwrap_or_else(|| self.base.clone());
            Ok(RawResource::classpath(rel, anchor.join(rel)))
        } else {
            let rest = location.strip_prefix("file:").unwrap_or(location);
            Ok(RawResource::file(rest, self.base_resolve(rest)))
        }
    }

    fn get_resources(&self, location: &str, kind: ResourceKind) -> Result<Vec<RawResource>, Error> {
        let (prefix, remainder) = self.split_pattern(location)?;
        let mut resources = Vec::new();
        for (classpath, display_prefix, dir) in self.pattern_bases(prefix) {
            let mut names: Vec<String> = match std::fs::read_dir(&dir) {
                Ok(entries) => entries
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.path().is_dir())
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .collect(),
                Err(_) => continue,
            };
            names.sort();
            for name in names {
                let subdir = dir.join(&name);
                let display = |suffix: &str| {
                    let mut joined = display_prefix.clone();
                    if !joined.is_empty() && !joined.ends_with('/') {
                        joined.push('/');
                    }
                    joined.push_str(&name);
                    joined.push('/');
                    joined.push_str(suffix);
                    joined
                };
                match kind {
                    ResourceKind::Directory => {
                        let raw = if classpath {
                            RawResource::classpath(&display(""), subdir)
                        } else {
                            RawResource::file(&display(""), subdir)
                        };
                        resources.push(raw);
                    }
                    ResourceKind::File => {
                        let candidate = subdir.join(remainder);
                        if !candidate.is_file() {
                            continue;
                        }
                        let raw = if classpath {
                            RawResource::classpath(&display(remainder), candidate)
                        } else {
                            RawResource::file(&display(remainder), candidate)
                        };
                        resources.push(raw);
                    }
                }
            }
        }
        Ok(resources)
    }
}

/// A resolved configuration resource: a [`Reference`] plus the byte
/// resource it landed on, or an empty-directory marker.
///
/// Equality and hashing go through the byte-resource identity, not the
/// reference, so one file reached through two references loads only once.
#[derive(Debug, Clone)]
pub struct ConfigResource {
    reference: Reference,
    raw: RawResource,
    empty_directory: bool,
    identity: String,
}

impl ConfigResource {
    pub(crate) fn new(reference: Reference, raw: RawResource) -> ConfigResource {
        let identity = raw.identity();
        ConfigResource {
            reference,
            raw,
            empty_directory: false,
            identity,
        }
    }

    pub(crate) fn empty_directory(reference: Reference, raw: RawResource) -> ConfigResource {
        let identity = raw.identity();
        ConfigResource {
            reference,
            raw,
            empty_directory: true,
            identity,
        }
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn raw(&self) -> &RawResource {
        &self.raw
    }

    pub fn location(&self) -> &Location {
        self.reference.location()
    }

    pub fn is_empty_directory(&self) -> bool {
        self.empty_directory
    }

    pub fn is_optional(&self) -> bool {
        self.reference.location().is_optional()
    }

    pub fn profile(&self) -> Option<&str> {
        self.reference.profile()
    }

    pub fn is_profile_specific(&self) -> bool {
        self.reference.profile().is_some()
    }
}

impl PartialEq for ConfigResource {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity && self.empty_directory == other.empty_directory
    }
}

impl Eq for ConfigResource {}

impl Hash for ConfigResource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
        self.empty_directory.hash(state);
    }
}

impl fmt::Display for ConfigResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw.description())
    }
}
