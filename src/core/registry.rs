//! Registry digest lookup for `namespace/pos-<service>:<tag>`.
//!
//! The registry is only ever asked one question: which digest does this tag
//! point at right now. No retries happen here; callers decide.

use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde_json::Value;

use crate::config::{RegistryBackend, RegistryConfig};
use crate::error::{Error, Result};
use crate::image::{Digest, ImageReference};
use crate::service::ServiceName;
use crate::utils::command;

/// Something that can inspect an image reference and report its digest.
///
/// `Ok(None)` means the query completed but carried no digest.
pub trait DigestSource {
    fn inspect(&self, host: &str, reference: &ImageReference) -> Result<Option<String>>;
}

/// Uses `docker buildx imagetools inspect`, which handles registry auth
/// through the local docker login.
#[derive(Debug, Clone)]
pub struct DockerInspect {
    pub program: String,
}

impl DigestSource for DockerInspect {
    fn inspect(&self, host: &str, reference: &ImageReference) -> Result<Option<String>> {
        let full = format!("{}/{}", host, reference);
        let args = [
            "buildx",
            "imagetools",
            "inspect",
            full.as_str(),
            "--format",
            "{{json .Manifest}}",
        ];
        let output = command::exec(&self.program, &args, None);
        if !output.success {
            return Err(Error::registry_request_failed(full, output.error_text()));
        }

        let trimmed = output.stdout.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(None);
        }
        let manifest: Value = serde_json::from_str(trimmed)
            .map_err(|e| Error::registry_request_failed(full, e.to_string()))?;
        Ok(manifest
            .get("digest")
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

const MANIFEST_TYPES: &str = "application/vnd.oci.image.index.v1+json, \
application/vnd.docker.distribution.manifest.list.v2+json, \
application/vnd.docker.distribution.manifest.v2+json, \
application/vnd.oci.image.manifest.v1+json";

/// Queries the registry's HTTP API directly. Unauthenticated.
pub struct RegistryApi {
    client: Client,
}

impl RegistryApi {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn manifest_url(host: &str, reference: &ImageReference, tag: &str) -> String {
        format!(
            "https://{}/v2/{}/manifests/{}",
            host,
            reference.repository(),
            tag
        )
    }
}

impl Default for RegistryApi {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestSource for RegistryApi {
    fn inspect(&self, host: &str, reference: &ImageReference) -> Result<Option<String>> {
        let tag = match &reference.target {
            crate::image::ImageTarget::Tag(tag) => tag.as_str(),
            crate::image::ImageTarget::Digest(digest) => return Ok(Some(digest.to_string())),
        };
        let url = Self::manifest_url(host, reference, tag);

        let response = self
            .client
            .head(&url)
            .header(ACCEPT, MANIFEST_TYPES)
            .send()
            .map_err(|e| Error::registry_request_failed(reference.to_string(), e.to_string()))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::registry_request_failed(
                reference.to_string(),
                format!("HTTP {}", response.status()),
            ));
        }

        Ok(response
            .headers()
            .get("docker-content-digest")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string))
    }
}

/// Resolves the current digest for a service image.
pub struct DigestResolver {
    host: String,
    source: Box<dyn DigestSource + Send + Sync>,
}

impl DigestResolver {
    pub fn new(host: impl Into<String>, source: Box<dyn DigestSource + Send + Sync>) -> Self {
        Self {
            host: host.into(),
            source,
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        let source: Box<dyn DigestSource + Send + Sync> = match config.backend {
            RegistryBackend::Docker => Box::new(DockerInspect {
                program: config.docker_command.clone(),
            }),
            RegistryBackend::Http => Box::new(RegistryApi::new()),
        };
        Self::new(config.host.clone(), source)
    }

    /// Digest for `host/namespace/pos-<service>:<tag>`.
    ///
    /// An absent, empty, `null`, or truncated answer is `registry.digest_unavailable`.
    pub fn resolve(&self, namespace: &str, service: ServiceName, tag: &str) -> Result<Digest> {
        let reference = ImageReference::tagged(namespace, service, tag);
        let label = format!("{}/{}", self.host, reference);

        let raw = self.source.inspect(&self.host, &reference)?;
        let value = raw.as_deref().map(str::trim).unwrap_or_default();
        if value.is_empty() || value == "null" {
            return Err(Error::digest_unavailable(label, raw));
        }

        match Digest::parse(value) {
            Ok(digest) if digest.is_canonical() => Ok(digest),
            _ => Err(Error::digest_unavailable(label, raw.clone())),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// In-memory registry keyed by image name.
    #[derive(Default)]
    pub(crate) struct FakeRegistry {
        pub answers: HashMap<String, Result<Option<String>>>,
        pub queries: Arc<Mutex<Vec<String>>>,
    }

    impl FakeRegistry {
        pub(crate) fn with(mut self, service: ServiceName, answer: Result<Option<String>>) -> Self {
            self.answers.insert(service.image_name(), answer);
            self
        }
    }

    impl DigestSource for FakeRegistry {
        fn inspect(&self, host: &str, reference: &ImageReference) -> Result<Option<String>> {
            self.queries
                .lock()
                .unwrap()
                .push(format!("{}/{}", host, reference));
            self.answers
                .get(&reference.service.image_name())
                .cloned()
                .unwrap_or(Ok(None))
        }
    }

    fn resolver(fake: FakeRegistry) -> DigestResolver {
        DigestResolver::new("docker.io", Box::new(fake))
    }

    #[test]
    fn resolves_digest_for_service_tag() {
        let full = format!("sha256:{}", "ab".repeat(32));
        let fake = FakeRegistry::default()
            .with(ServiceName::Cart, Ok(Some(format!("{}\n", full))));
        let digest = resolver(fake)
            .resolve("zyg5467", ServiceName::Cart, "latest")
            .unwrap();
        assert_eq!(digest.as_str(), full);
    }

    #[test]
    fn truncated_digest_is_unavailable() {
        let fake = FakeRegistry::default()
            .with(ServiceName::Cart, Ok(Some("sha256:abc123".to_string())));
        let err = resolver(fake)
            .resolve("zyg5467", ServiceName::Cart, "latest")
            .unwrap_err();
        assert_eq!(err.code.as_str(), "registry.digest_unavailable");
        assert_eq!(err.details["value"], "sha256:abc123");
    }

    #[test]
    fn queries_full_reference() {
        let fake = FakeRegistry::default();
        let queries = Arc::clone(&fake.queries);
        let _ = resolver(fake).resolve("zyg5467", ServiceName::Stock, "latest");

        assert_eq!(
            queries.lock().unwrap().as_slice(),
            ["docker.io/zyg5467/pos-stock:latest"]
        );
    }

    #[test]
    fn empty_null_and_absent_answers_are_unavailable() {
        for answer in [None, Some(String::new()), Some("null".to_string()), Some("  ".to_string())] {
            let fake = FakeRegistry::default().with(ServiceName::Report, Ok(answer.clone()));
            let err = resolver(fake)
                .resolve("zyg5467", ServiceName::Report, "nonexistent")
                .unwrap_err();
            assert_eq!(err.code.as_str(), "registry.digest_unavailable", "answer={:?}", answer);
        }
    }

    #[test]
    fn garbage_digest_is_unavailable() {
        let fake = FakeRegistry::default()
            .with(ServiceName::Journal, Ok(Some("not-a-digest".to_string())));
        let err = resolver(fake)
            .resolve("zyg5467", ServiceName::Journal, "latest")
            .unwrap_err();
        assert_eq!(err.code.as_str(), "registry.digest_unavailable");
        assert_eq!(err.details["value"], "not-a-digest");
    }

    #[test]
    fn transport_errors_propagate_unchanged() {
        let fake = FakeRegistry::default().with(
            ServiceName::Account,
            Err(Error::registry_request_failed("x", "connection refused")),
        );
        let err = resolver(fake)
            .resolve("zyg5467", ServiceName::Account, "latest")
            .unwrap_err();
        assert_eq!(err.code.as_str(), "registry.request_failed");
    }
}
