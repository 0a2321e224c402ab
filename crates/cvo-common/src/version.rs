//! ---
//! cvo_section: "14-versioning"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Build and release version metadata."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use serde::Serialize;

/// Version metadata. Git and build fields are filled by `vergen` in the daemon's
/// build script and read back at compile time of the calling crate.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VersionInfo {
    /// Workspace semantic version.
    pub semver: String,
    /// Git commit hash captured at build time.
    pub git_sha: String,
    /// Build timestamp from the compilation environment.
    pub build_timestamp: String,
}

impl VersionInfo {
    /// Construct from explicit values; the daemon passes its own `env!` readings.
    #[must_use]
    pub fn new(
        semver: impl Into<String>,
        git_sha: Option<&str>,
        build_timestamp: Option<&str>,
    ) -> Self {
        Self {
            semver: semver.into(),
            git_sha: git_sha.unwrap_or("UNKNOWN").to_owned(),
            build_timestamp: build_timestamp.unwrap_or("UNKNOWN").to_owned(),
        }
    }

    /// Version of this library crate, without build metadata.
    #[must_use]
    pub fn current() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"), None, None)
    }

    /// Concise string combining semantic version and git hash, printed by `--version`.
    #[must_use]
    pub fn cli_string(&self) -> String {
        format!("{} ({})", self.semver, self.git_sha)
    }

    /// Human readable banner used in logging surfaces.
    #[must_use]
    pub fn banner(&self) -> String {
        format!(
            "cluster-version-operator v{} (git {}, built {})",
            self.semver, self.git_sha, self.build_timestamp
        )
    }
}
