//! Digest pinning for the orchestration manifest.
//!
//! The manifest is read into lines; `image:` lines naming a known service are
//! parsed into [`ImageReference`]s, edited as values, and rendered back with
//! their original indentation, quoting, and trailing comment. Every other
//! byte of the file is left alone. The rewritten text is checked with a YAML
//! parse before it replaces the original.
//!
//! Each mutating pass runs under an exclusive lock file and is preceded by a
//! timestamped backup copy.

use chrono::Local;
use regex::Regex;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::image::{Digest, ImageReference, ImageTarget};
use crate::service::ServiceName;
use crate::utils::io;

static IMAGE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?P<lead>[ \t]*image:[ \t]*)(?P<quote>["']?)(?P<reference>[^\s"'#]+)(?P<rest>.*)$"#)
        .unwrap()
});

#[derive(Debug, Clone)]
struct ImageLine {
    lead: String,
    quote: String,
    reference: ImageReference,
    rest: String,
}

impl ImageLine {
    fn render(&self) -> String {
        format!("{}{}{}{}", self.lead, self.quote, self.reference, self.rest)
    }
}

#[derive(Debug, Clone)]
enum Line {
    Image(ImageLine),
    Text(String),
}

/// Manifest text split into editable image lines and opaque text.
#[derive(Debug, Clone)]
struct ManifestDocument {
    lines: Vec<Line>,
}

impl ManifestDocument {
    fn parse(content: &str) -> Self {
        let lines = content
            .split('\n')
            .map(|raw| {
                IMAGE_LINE
                    .captures(raw)
                    .and_then(|caps| {
                        let reference = ImageReference::parse(&caps["reference"])?;
                        Some(Line::Image(ImageLine {
                            lead: caps["lead"].to_string(),
                            quote: caps["quote"].to_string(),
                            reference,
                            rest: caps["rest"].to_string(),
                        }))
                    })
                    .unwrap_or_else(|| Line::Text(raw.to_string()))
            })
            .collect();
        Self { lines }
    }

    fn render(&self) -> String {
        self.lines
            .iter()
            .map(|line| match line {
                Line::Image(image) => image.render(),
                Line::Text(text) => text.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn images(&self) -> impl Iterator<Item = &ImageReference> {
        self.lines.iter().filter_map(|line| match line {
            Line::Image(image) => Some(&image.reference),
            Line::Text(_) => None,
        })
    }

    /// Point every pinnable reference of `service` at `target`.
    /// Returns (matched, changed) line counts.
    fn retarget(&mut self, scope: &Scope, service: ServiceName, target: &ImageTarget) -> (usize, usize) {
        let mut matched = 0;
        let mut changed = 0;
        for line in &mut self.lines {
            let Line::Image(image) = line else { continue };
            if image.reference.service != service || !scope.is_pinnable(&image.reference) {
                continue;
            }
            matched += 1;
            if image.reference.target != *target {
                image.reference.target = target.clone();
                changed += 1;
            }
        }
        (matched, changed)
    }
}

/// Which references a pass may touch: the configured namespace, referenced
/// either by the mutable tag or by any digest.
#[derive(Debug, Clone)]
struct Scope {
    namespace: String,
    tag: String,
}

impl Scope {
    fn is_pinnable(&self, reference: &ImageReference) -> bool {
        reference.namespace == self.namespace
            && match &reference.target {
                ImageTarget::Tag(tag) => *tag == self.tag,
                ImageTarget::Digest(_) => true,
            }
    }
}

/// One requested change to the manifest.
#[derive(Debug, Clone)]
pub enum Edit {
    Pin(ServiceName, Digest),
    Revert(ServiceName),
}

impl Edit {
    fn service(&self) -> ServiceName {
        match self {
            Edit::Pin(service, _) | Edit::Revert(service) => *service,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRewrite {
    pub service: ServiceName,
    pub reference: String,
    pub matched: usize,
    pub changed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteReport {
    pub path: String,
    pub backup: String,
    pub written: bool,
    pub services: Vec<ServiceRewrite>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStatus {
    pub service: ServiceName,
    pub references: Vec<ImageReference>,
}

/// Exclusive lock on the manifest, held for one read-modify-write pass.
struct ManifestLock {
    path: PathBuf,
}

impl ManifestLock {
    fn acquire(manifest: &Path) -> Result<Self> {
        let path = PathBuf::from(format!("{}.lock", manifest.display()));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::manifest_locked(path.display().to_string()))
            }
            Err(e) => Err(Error::internal_io(
                e.to_string(),
                Some(format!("create {}", path.display())),
            )),
        }
    }
}

impl Drop for ManifestLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[derive(Debug, Clone)]
pub struct ManifestPinner {
    path: PathBuf,
    scope: Scope,
}

impl ManifestPinner {
    pub fn new(path: impl Into<PathBuf>, namespace: &str, tag: &str) -> Self {
        Self {
            path: path.into(),
            scope: Scope {
                namespace: namespace.to_string(),
                tag: tag.to_string(),
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `image: ns/pos-<service>:latest` or `@<old digest>` becomes `@<digest>`.
    pub fn pin_to_digest(&self, service: ServiceName, digest: &Digest) -> Result<RewriteReport> {
        self.apply(&[Edit::Pin(service, digest.clone())])
    }

    /// `image: ns/pos-<service>@<digest>` becomes `:latest`. Zero matches is not an error.
    pub fn revert_to_latest(&self, service: ServiceName) -> Result<RewriteReport> {
        self.apply(&[Edit::Revert(service)])
    }

    pub fn revert_all(&self) -> Result<RewriteReport> {
        let edits: Vec<Edit> = ServiceName::ALL.into_iter().map(Edit::Revert).collect();
        self.apply(&edits)
    }

    /// Pin several services in one locked, backed-up pass.
    pub fn pin_all(&self, pins: &[(ServiceName, Digest)]) -> Result<RewriteReport> {
        let edits: Vec<Edit> = pins
            .iter()
            .map(|(service, digest)| Edit::Pin(*service, digest.clone()))
            .collect();
        self.apply(&edits)
    }

    /// Current image references per known service. Read-only.
    pub fn status(&self) -> Result<Vec<ImageStatus>> {
        self.ensure_exists()?;
        let content = io::read_file(&self.path, "read manifest")?;
        let doc = ManifestDocument::parse(&content);

        Ok(ServiceName::ALL
            .into_iter()
            .map(|service| ImageStatus {
                service,
                references: doc
                    .images()
                    .filter(|r| r.service == service && r.namespace == self.scope.namespace)
                    .cloned()
                    .collect(),
            })
            .collect())
    }

    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.is_file() {
            Ok(())
        } else {
            Err(Error::manifest_not_found(self.path.display().to_string()))
        }
    }

    /// Apply `edits` as one read-modify-write pass.
    pub fn apply(&self, edits: &[Edit]) -> Result<RewriteReport> {
        self.ensure_exists()?;
        let _lock = ManifestLock::acquire(&self.path)?;

        let original = io::read_file(&self.path, "read manifest")?;
        let mut doc = ManifestDocument::parse(&original);

        let mut services = Vec::with_capacity(edits.len());
        for edit in edits {
            let service = edit.service();
            let target = match edit {
                Edit::Pin(_, digest) => ImageTarget::Digest(digest.clone()),
                Edit::Revert(_) => ImageTarget::Tag(self.scope.tag.clone()),
            };
            let (matched, changed) = doc.retarget(&self.scope, service, &target);
            let reference = ImageReference {
                namespace: self.scope.namespace.clone(),
                service,
                target,
            };
            services.push(ServiceRewrite {
                service,
                reference: reference.to_string(),
                matched,
                changed,
            });
        }

        let updated = doc.render();
        self.verify(&updated, &doc)?;

        let backup = self.backup()?;
        let written = updated != original;
        if written {
            io::write_file_atomic(&self.path, &updated, "write manifest")?;
        }

        for rewrite in services.iter().filter(|s| s.changed > 0) {
            crate::log_status!("manifest", "{} -> {}", rewrite.service, rewrite.reference);
        }

        Ok(RewriteReport {
            path: self.path.display().to_string(),
            backup: backup.display().to_string(),
            written,
            services,
        })
    }

    /// The rewritten text must still parse as YAML, and every image the YAML
    /// declares for our namespace must agree with the edited line model.
    fn verify(&self, text: &str, doc: &ManifestDocument) -> Result<()> {
        let path = self.path.display().to_string();
        let yaml: serde_yml::Value =
            serde_yml::from_str(text).map_err(|e| Error::manifest_invalid(&path, e.to_string()))?;

        let declared: Vec<ImageReference> = yaml
            .get("services")
            .and_then(|s| s.as_mapping())
            .map(|services| {
                services
                    .values()
                    .filter_map(|svc| svc.get("image").and_then(|i| i.as_str()))
                    .filter_map(ImageReference::parse)
                    .filter(|r| self.scope.is_pinnable(r))
                    .collect()
            })
            .unwrap_or_default();

        let mut edited: Vec<String> = doc
            .images()
            .filter(|r| self.scope.is_pinnable(r))
            .map(|r| r.to_string())
            .collect();
        let mut parsed: Vec<String> = declared.iter().map(|r| r.to_string()).collect();
        edited.sort();
        parsed.sort();

        if edited != parsed {
            return Err(Error::manifest_invalid(
                path,
                format!(
                    "image lines disagree with parsed services (lines: {:?}, yaml: {:?})",
                    edited, parsed
                ),
            ));
        }
        Ok(())
    }

    /// Copy the manifest to `<path>.backup.<timestamp>` before it is modified.
    fn backup(&self) -> Result<PathBuf> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();
        let base = format!("{}.backup.{}", self.path.display(), stamp);

        let mut candidate = PathBuf::from(&base);
        let mut n = 1;
        while candidate.exists() {
            candidate = PathBuf::from(format!("{}_{}", base, n));
            n += 1;
        }

        fs::copy(&self.path, &candidate).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("backup to {}", candidate.display())))
        })?;
        Ok(candidate)
    }
}
