//! Project configuration (`posctl.json` at the project root).
//!
//! Every component receives absolute paths resolved here; nothing below this
//! layer looks at the process working directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::service::ServiceName;
use crate::utils::io;

pub const CONFIG_FILE: &str = "posctl.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub distribute: DistributeConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub manifest: ManifestConfig,

    #[serde(default)]
    pub digests: DigestsConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    #[serde(default = "default_build_command")]
    pub command: String,
    #[serde(default = "default_build_working_dir")]
    pub working_dir: String,
    /// Artifact path template; `{version}` is substituted.
    #[serde(default = "default_artifact")]
    pub artifact: String,
    #[serde(default = "default_true")]
    pub clean_output_dir: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributeConfig {
    /// Destination directory template; `{service}` is substituted.
    #[serde(default = "default_destination")]
    pub destination: String,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default = "default_prune_pattern")]
    pub prune_pattern: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    Docker,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    #[serde(default = "default_registry_host")]
    pub host: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default = "default_backend")]
    pub backend: RegistryBackend,
    #[serde(default = "default_docker_command")]
    pub docker_command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestConfig {
    #[serde(default = "default_manifest_path")]
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestsConfig {
    /// Exit non-zero when any service is skipped during a digest update.
    #[serde(default)]
    pub fail_on_unresolved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    #[serde(default = "default_workflow")]
    pub default: String,
    #[serde(default = "default_log_tail")]
    pub log_tail: usize,
    #[serde(default = "default_gh_command")]
    pub gh_command: String,
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_metadata_file() -> String {
    "services/commons/src/kugel_common/__about__.py".to_string()
}

fn default_build_command() -> String {
    "python -m build --wheel".to_string()
}

fn default_build_working_dir() -> String {
    "services/commons".to_string()
}

fn default_artifact() -> String {
    "services/commons/dist/kugel_common-{version}-py3-none-any.whl".to_string()
}

fn default_destination() -> String {
    "services/{service}/commons/dist".to_string()
}

fn default_log_file() -> String {
    ".posctl/distribute.log".to_string()
}

fn default_prune_pattern() -> Option<String> {
    Some("kugel_common-*.whl".to_string())
}

fn default_registry_host() -> String {
    "docker.io".to_string()
}

fn default_namespace() -> String {
    "zyg5467".to_string()
}

fn default_tag() -> String {
    "latest".to_string()
}

fn default_backend() -> RegistryBackend {
    RegistryBackend::Docker
}

fn default_docker_command() -> String {
    "docker".to_string()
}

fn default_manifest_path() -> String {
    "docker-compose.prod.yml".to_string()
}

fn default_workflow() -> String {
    "docker-publish.yml".to_string()
}

fn default_log_tail() -> usize {
    50
}

fn default_gh_command() -> String {
    "gh".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: default_build_command(),
            working_dir: default_build_working_dir(),
            artifact: default_artifact(),
            clean_output_dir: true,
        }
    }
}

impl Default for DistributeConfig {
    fn default() -> Self {
        Self {
            destination: default_destination(),
            log_file: default_log_file(),
            prune_pattern: default_prune_pattern(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: default_registry_host(),
            namespace: default_namespace(),
            tag: default_tag(),
            backend: default_backend(),
            docker_command: default_docker_command(),
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            path: default_manifest_path(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            default: default_workflow(),
            log_tail: default_log_tail(),
            gh_command: default_gh_command(),
        }
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            metadata_file: default_metadata_file(),
            build: BuildConfig::default(),
            distribute: DistributeConfig::default(),
            registry: RegistryConfig::default(),
            manifest: ManifestConfig::default(),
            digests: DigestsConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Expand `~` and environment references in a user-supplied root and make
/// it absolute against the current directory. This is the only place the
/// working directory is consulted.
pub fn expand_root(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw).map_err(|e| {
        Error::validation_invalid_argument("root", e.to_string(), Some(raw.to_string()), None)
    })?;
    std::path::absolute(expanded.as_ref()).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("resolve root {}", raw)))
    })
}

/// Loaded configuration bound to the project root it was read from.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config: ProjectConfig,
}

impl Project {
    /// Load `posctl.json` from `root`, falling back to built-in defaults
    /// when the file does not exist.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        let config = if path.exists() {
            let content = io::read_file(&path, "read config")?;
            serde_json::from_str(&content)
                .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))?
        } else {
            ProjectConfig::default()
        };

        let project = Self {
            root: root.to_path_buf(),
            config,
        };
        project.validate()?;
        Ok(project)
    }

    pub fn with_config(root: &Path, config: ProjectConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.config.build.artifact.contains("{version}") {
            return Err(Error::config_invalid_value(
                "build.artifact",
                Some(self.config.build.artifact.clone()),
                "artifact template must contain {version}",
            ));
        }
        if !self.config.distribute.destination.contains("{service}") {
            return Err(Error::config_invalid_value(
                "distribute.destination",
                Some(self.config.distribute.destination.clone()),
                "destination template must contain {service}",
            ));
        }
        if self.config.registry.namespace.trim().is_empty() {
            return Err(Error::config_invalid_value(
                "registry.namespace",
                None,
                "namespace must not be empty",
            ));
        }
        Ok(())
    }

    pub fn resolve(&self, relative: &str) -> PathBuf {
        let path = Path::new(relative);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.resolve(&self.config.metadata_file)
    }

    pub fn artifact_path(&self, version: &str) -> PathBuf {
        self.resolve(&self.config.build.artifact.replace("{version}", version))
    }

    pub fn build_dir(&self) -> PathBuf {
        self.resolve(&self.config.build.working_dir)
    }

    pub fn destination(&self, service: ServiceName) -> PathBuf {
        self.resolve(
            &self
                .config
                .distribute
                .destination
                .replace("{service}", service.as_str()),
        )
    }

    pub fn destinations(&self, services: &[ServiceName]) -> Vec<PathBuf> {
        services.iter().map(|s| self.destination(*s)).collect()
    }

    pub fn distribution_log(&self) -> PathBuf {
        self.resolve(&self.config.distribute.log_file)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.resolve(&self.config.manifest.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let project = Project::load(dir.path()).unwrap();

        assert_eq!(project.config.registry.namespace, "zyg5467");
        assert_eq!(project.config.workflow.log_tail, 50);
        assert_eq!(
            project.destination(ServiceName::Cart),
            dir.path().join("services/cart/commons/dist")
        );
    }

    #[test]
    fn partial_config_merges_with_defaults() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"registry": {"namespace": "acme"}, "digests": {"failOnUnresolved": true}}"#,
        )
        .unwrap();

        let project = Project::load(dir.path()).unwrap();
        assert_eq!(project.config.registry.namespace, "acme");
        assert_eq!(project.config.registry.tag, "latest");
        assert!(project.config.digests.fail_on_unresolved);
    }

    #[test]
    fn invalid_json_is_config_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();

        let err = Project::load(dir.path()).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_json");
    }

    #[test]
    fn artifact_template_requires_version_placeholder() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"build": {"artifact": "dist/app.whl"}}"#,
        )
        .unwrap();

        let err = Project::load(dir.path()).unwrap_err();
        assert_eq!(err.details["key"], "build.artifact");
    }

    #[test]
    fn absolute_paths_are_not_rebased() {
        let dir = tempdir().unwrap();
        let mut config = ProjectConfig::default();
        config.manifest.path = "/srv/compose.yml".to_string();
        let project = Project::with_config(dir.path(), config);

        assert_eq!(project.manifest_path(), PathBuf::from("/srv/compose.yml"));
        assert_eq!(
            project.artifact_path("1.2.3"),
            dir.path()
                .join("services/commons/dist/kugel_common-1.2.3-py3-none-any.whl")
        );
    }

    #[test]
    fn default_root_becomes_absolute() {
        let root = expand_root(".").unwrap();
        assert!(root.is_absolute());
        assert_eq!(root, std::env::current_dir().unwrap());

        let project = Project::with_config(&expand_root("services/..").unwrap(), ProjectConfig::default());
        assert!(project.manifest_path().is_absolute());
        assert!(project.distribution_log().is_absolute());
    }
}
