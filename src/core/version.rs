//! Shared-library version stored as `__version__ = "X.Y.Z"` in a metadata file.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::utils::{io, parser};

const VERSION_MARKER: &str = "__version__";

// Captures the quoted value of a `__version__ = "X.Y.Z"` line.
static MARKER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*__version__[ \t]*=[ \t]*["']([^"'\r\n]*)["']"#).unwrap()
});

/// A MAJOR.MINOR.PATCH triple with no pre-release or build metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a strict three-part numeric version. Returns None for anything
    /// semver accepts beyond that (pre-release tags, build metadata).
    pub fn parse(raw: &str) -> Option<Self> {
        let parsed = semver::Version::parse(raw.trim()).ok()?;
        if !parsed.pre.is_empty() || !parsed.build.is_empty() {
            return None;
        }
        Some(Self::new(parsed.major, parsed.minor, parsed.patch))
    }

    /// Next patch release. Major and minor never change.
    pub fn increment(&self) -> Self {
        Self::new(self.major, self.minor, self.patch + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionBump {
    pub path: String,
    pub old_version: Version,
    pub new_version: Version,
}

/// Reads and rewrites the version marker of one metadata file.
#[derive(Debug, Clone)]
pub struct VersionStore {
    path: PathBuf,
}

impl VersionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    fn read_content(&self) -> Result<String> {
        if !self.path.is_file() {
            return Err(Error::version_not_found(self.display_path(), None));
        }
        io::read_file(&self.path, "read metadata file")
    }

    pub fn read(&self) -> Result<Version> {
        let content = self.read_content()?;
        let raw = parser::extract_first(&content, &MARKER_PATTERN).ok_or_else(|| {
            Error::version_not_found(self.display_path(), Some(VERSION_MARKER.to_string()))
        })?;

        Version::parse(&raw).ok_or_else(|| Error::version_invalid_format(self.display_path(), raw))
    }

    /// Replace the marker's value with `version`. Only the quoted value of the
    /// first marker line changes.
    pub fn write(&self, version: &Version) -> Result<()> {
        let content = self.read_content()?;
        let updated = parser::replace_first_capture(&content, &MARKER_PATTERN, &version.to_string())
            .ok_or_else(|| {
                Error::version_not_found(self.display_path(), Some(VERSION_MARKER.to_string()))
            })?;

        io::write_file(&self.path, &updated, "write metadata file")
            .map_err(|e| {
                let cause = e.details["error"].as_str().unwrap_or(&e.message).to_string();
                Error::version_write_failed(self.display_path(), cause)
            })
    }

    /// Read, increment and persist in one call.
    pub fn bump(&self) -> Result<VersionBump> {
        let old_version = self.read()?;
        let new_version = old_version.increment();
        self.write(&new_version)?;
        crate::log_status!("version", "{} -> {}", old_version, new_version);

        Ok(VersionBump {
            path: self.display_path(),
            old_version,
            new_version,
        })
    }
}
