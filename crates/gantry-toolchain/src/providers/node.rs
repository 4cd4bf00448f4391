//! Node.js toolchain — versions installed under the user tools directory
//!
//! Versions are resolved against the nodejs.org release index and
//! installed by extracting the official tarball into
//! `~/.gantry/tools/node/<version>`. Install is idempotent: an existing
//! install directory short-circuits the download.

use std::path::PathBuf;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use semver::{Version, VersionReq};
use serde::Deserialize;
use tar::Archive;
use tracing::{debug, info};

use crate::error::{Result, ToolchainError};
use crate::provider::{ResolvedToolchain, ToolchainProvider};

const NODE_DIST_URL: &str = "https://nodejs.org/dist";

/// One entry of the nodejs.org release index
#[derive(Debug, Deserialize)]
struct ReleaseEntry {
    version: String,
}

/// Provider that manages Node.js installs
#[derive(Debug)]
pub struct NodeToolchain {
    tools_dir: PathBuf,
    dist_url: String,
}

impl NodeToolchain {
    /// Create a provider rooted at the given tools directory,
    /// typically `~/.gantry/tools`
    pub fn new(tools_dir: PathBuf) -> Self {
        Self {
            tools_dir,
            dist_url: NODE_DIST_URL.to_string(),
        }
    }

    /// Override the distribution URL (used by tests and mirrors)
    pub fn with_dist_url(mut self, url: impl Into<String>) -> Self {
        self.dist_url = url.into();
        self
    }

    fn install_dir(&self, version: &str) -> PathBuf {
        self.tools_dir.join("node").join(version)
    }

    fn bin_dir(&self, version: &str) -> PathBuf {
        if cfg!(windows) {
            self.install_dir(version)
        } else {
            self.install_dir(version).join("bin")
        }
    }

    fn platform_triple() -> String {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            "windows" => "win",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "x64",
            "aarch64" => "arm64",
            other => other,
        };
        format!("{}-{}", os, arch)
    }

    async fn fetch_index(&self) -> Result<Vec<ReleaseEntry>> {
        let url = format!("{}/index.json", self.dist_url);
        debug!(url, "fetching node release index");

        let response = reqwest::get(&url)
            .await
            .map_err(|e| ToolchainError::Download(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| ToolchainError::Download(e.to_string()))
    }

    fn resolved(&self, version: &str) -> ResolvedToolchain {
        ResolvedToolchain {
            tool: "node".to_string(),
            version: version.to_string(),
            bin_dirs: vec![self.bin_dir(version)],
            env: vec![("GANTRY_NODE_VERSION".to_string(), version.to_string())],
        }
    }
}

#[async_trait]
impl ToolchainProvider for NodeToolchain {
    fn id(&self) -> &'static str {
        "node"
    }

    async fn resolve_version(&self, requirement: Option<&str>) -> Result<String> {
        let requirement = requirement.unwrap_or("*");
        let req = VersionReq::parse(requirement).map_err(|e| {
            ToolchainError::InvalidRequirement {
                tool: "node".to_string(),
                requirement: requirement.to_string(),
                message: e.to_string(),
            }
        })?;

        let index = self.fetch_index().await?;
        let mut best: Option<Version> = None;

        for entry in index {
            let Ok(version) = Version::parse(entry.version.trim_start_matches('v')) else {
                continue;
            };
            if req.matches(&version) && best.as_ref().map_or(true, |b| version > *b) {
                best = Some(version);
            }
        }

        best.map(|v| v.to_string())
            .ok_or_else(|| ToolchainError::UnresolvedVersion {
                tool: "node".to_string(),
                requirement: requirement.to_string(),
            })
    }

    async fn install(&self, version: &str) -> Result<ResolvedToolchain> {
        let install_dir = self.install_dir(version);
        if install_dir.exists() {
            debug!(version, "node already installed");
            return Ok(self.resolved(version));
        }

        let triple = Self::platform_triple();
        let archive_name = format!("node-v{}-{}", version, triple);
        let url = format!("{}/v{}/{}.tar.gz", self.dist_url, version, archive_name);
        info!(version, url, "installing node toolchain");

        let response = reqwest::get(&url)
            .await
            .map_err(|e| ToolchainError::Download(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ToolchainError::Download(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ToolchainError::Download(e.to_string()))?;

        // Extract to a staging directory, then move the versioned
        // subdirectory into place so partial extracts are never visible
        let staging = self.tools_dir.join("node").join(format!(".{}", version));
        if staging.exists() {
            std::fs::remove_dir_all(&staging)?;
        }
        std::fs::create_dir_all(&staging)?;

        let decoder = GzDecoder::new(bytes.as_ref());
        let mut archive = Archive::new(decoder);
        archive
            .unpack(&staging)
            .map_err(|e| ToolchainError::Archive(e.to_string()))?;

        std::fs::rename(staging.join(&archive_name), &install_dir)?;
        std::fs::remove_dir_all(&staging)?;

        info!(version, dir = %install_dir.display(), "node toolchain installed");
        Ok(self.resolved(version))
    }

    fn locate_executable(&self, version: &str, bin: &str) -> Result<PathBuf> {
        let bin_name = if cfg!(windows) {
            format!("{}.exe", bin)
        } else {
            bin.to_string()
        };

        let path = self.bin_dir(version).join(bin_name);
        if path.exists() {
            return Ok(path);
        }

        // Fall back to PATH when the binary isn't managed by the install
        which::which(bin).map_err(|_| ToolchainError::ExecutableNotFound {
            tool: "node".to_string(),
            bin: bin.to_string(),
        })
    }
}
