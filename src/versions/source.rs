//! Where latest-version information comes from.
//!
//! `VersionSource` abstracts the registry lookup so update checks stay
//! testable. `HttpVersionSource` queries the npm registry for libraries and
//! Docker Hub for containers; `StaticVersionSource` serves canned releases.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::semver::Version;
use crate::error::{GateError, Result};
use crate::integrations::{Integration, IntegrationConfig};

/// Latest published release of an integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub version: String,
    /// The source explicitly marks this release as breaking.
    #[serde(default)]
    pub breaking: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ReleaseInfo {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            breaking: false,
            notes: None,
        }
    }

    pub fn breaking(mut self) -> Self {
        self.breaking = true;
        self
    }
}

/// Type-specific latest-version lookup.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// `Ok(None)` when the source has nothing for this integration.
    async fn latest(&self, integration: &Integration) -> Result<Option<ReleaseInfo>>;
}

// ---------------------------------------------------------------------------
// HTTP source
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NpmManifest {
    version: String,
    #[serde(default)]
    deprecated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DockerTagPage {
    #[serde(default)]
    results: Vec<DockerTag>,
}

#[derive(Debug, Deserialize)]
struct DockerTag {
    name: String,
}

/// Registry-backed source: npm for libraries, Docker Hub for containers.
pub struct HttpVersionSource {
    client: reqwest::Client,
    npm_registry: String,
    docker_hub: String,
}

impl HttpVersionSource {
    pub fn new(npm_registry: &str, docker_hub: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("zeptogate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            npm_registry: npm_registry.trim_end_matches('/').to_string(),
            docker_hub: docker_hub.trim_end_matches('/').to_string(),
        })
    }

    async fn npm_latest(&self, registry: &str, name: &str) -> Result<Option<ReleaseInfo>> {
        let url = format!("{}/{}/latest", registry.trim_end_matches('/'), name);
        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let manifest: NpmManifest = response.error_for_status()?.json().await?;
        Ok(Some(ReleaseInfo {
            version: manifest.version,
            breaking: false,
            notes: manifest.deprecated,
        }))
    }

    async fn docker_latest(&self, image: &str) -> Result<Option<ReleaseInfo>> {
        let repo = if image.contains('/') {
            image.to_string()
        } else {
            format!("library/{}", image)
        };
        let url = format!(
            "{}/v2/repositories/{}/tags?page_size=100",
            self.docker_hub, repo
        );
        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let page: DockerTagPage = response.error_for_status()?.json().await?;
        Ok(newest_tag(page.results.iter().map(|t| t.name.as_str())).map(ReleaseInfo::new))
    }
}

/// Highest stable version among registry tags; non-version tags are skipped.
pub fn newest_tag<'a>(tags: impl Iterator<Item = &'a str>) -> Option<String> {
    tags.filter_map(|tag| Version::parse_lenient(tag).ok().map(|v| (v, tag)))
        .filter(|(v, _)| !v.is_prerelease())
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, tag)| tag.to_string())
}

#[async_trait]
impl VersionSource for HttpVersionSource {
    async fn latest(&self, integration: &Integration) -> Result<Option<ReleaseInfo>> {
        match &integration.config {
            IntegrationConfig::Library(c) => {
                let registry = c.registry.as_deref().unwrap_or(&self.npm_registry);
                self.npm_latest(registry, &integration.name).await
            }
            IntegrationConfig::Container(c) => self.docker_latest(&c.image).await,
            other => {
                debug!(
                    component = "versions",
                    integration = %integration.name,
                    kind = %other.kind(),
                    "No update source for this integration type"
                );
                Ok(None)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Static source
// ---------------------------------------------------------------------------

/// In-memory source keyed by integration name.
#[derive(Default)]
pub struct StaticVersionSource {
    releases: RwLock<HashMap<String, ReleaseInfo>>,
    failures: RwLock<HashMap<String, String>>,
}

impl StaticVersionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_release(self, name: &str, release: ReleaseInfo) -> Self {
        self.set_release(name, release);
        self
    }

    pub fn set_release(&self, name: &str, release: ReleaseInfo) {
        self.releases
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), release);
    }

    /// Make lookups for `name` fail with `message`.
    pub fn fail_for(&self, name: &str, message: &str) {
        self.failures
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), message.to_string());
    }
}

#[async_trait]
impl VersionSource for StaticVersionSource {
    async fn latest(&self, integration: &Integration) -> Result<Option<ReleaseInfo>> {
        if let Some(msg) = self
            .failures
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&integration.name)
        {
            return Err(GateError::Operation(msg.clone()));
        }
        Ok(self
            .releases
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&integration.name)
            .cloned())
    }
}
