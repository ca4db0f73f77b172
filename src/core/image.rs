//! Container image references: `namespace/pos-<service>` plus exactly one of
//! a tag or a content digest.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::service::ServiceName;

static DIGEST_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sha256:[0-9a-f]+$").unwrap());

/// Content address of an image, `sha256:<hex>`. Opaque beyond that shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if DIGEST_PATTERN.is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(Error::validation_invalid_argument(
                "digest",
                format!("'{}' is not a sha256:<hex> digest", trimmed),
                Some(trimmed.to_string()),
                None,
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full-length digests carry 64 hex characters.
    pub fn is_canonical(&self) -> bool {
        self.0.len() == "sha256:".len() + 64
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum ImageTarget {
    Tag(String),
    Digest(Digest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReference {
    pub namespace: String,
    pub service: ServiceName,
    pub target: ImageTarget,
}

impl ImageReference {
    pub fn tagged(namespace: &str, service: ServiceName, tag: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            service,
            target: ImageTarget::Tag(tag.to_string()),
        }
    }

    /// `namespace/pos-<service>` without tag or digest.
    pub fn repository(&self) -> String {
        format!("{}/{}", self.namespace, self.service.image_name())
    }

    /// Parse `namespace/pos-<service>:<tag>` or `namespace/pos-<service>@sha256:<hex>`.
    /// Returns None for anything that is not one of the known services.
    pub fn parse(raw: &str) -> Option<Self> {
        let (repo, target) = if let Some((repo, digest)) = raw.split_once('@') {
            (repo, ImageTarget::Digest(Digest::parse(digest).ok()?))
        } else {
            let (repo, tag) = raw.rsplit_once(':')?;
            if tag.is_empty() || tag.contains('/') {
                return None;
            }
            (repo, ImageTarget::Tag(tag.to_string()))
        };

        let (namespace, image) = repo.rsplit_once('/')?;
        if namespace.is_empty() {
            return None;
        }
        let service = ServiceName::from_image_name(image)?;

        Some(Self {
            namespace: namespace.to_string(),
            service,
            target,
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            ImageTarget::Tag(tag) => write!(f, "{}:{}", self.repository(), tag),
            ImageTarget::Digest(digest) => write!(f, "{}@{}", self.repository(), digest),
        }
    }
}
