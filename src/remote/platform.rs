// dtbackuptool/src/remote/platform.rs
use regex::Regex;
use std::sync::LazyLock;

use crate::config::PlatformConfig;

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\d+\.\d+\.\d+").expect("version pattern is valid"));

/// Command listing the platform agent process; its command line carries the
/// installed version in the binary path.
pub fn agent_listing_command(agent_process: &str) -> String {
    format!("ps aux | grep {} | grep -v grep", agent_process)
}

/// First dotted-quad in the process listing, e.g. `8.3.21.1234`.
pub fn extract_platform_version(process_listing: &str) -> Option<String> {
    VERSION_PATTERN
        .find(process_listing)
        .map(|m| m.as_str().to_string())
}

/// Resolved location of the platform command-line tools on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformLocation {
    version: String,
    root: String,
}

impl PlatformLocation {
    pub fn new(platform: &PlatformConfig, version: &str) -> Self {
        PlatformLocation {
            version: version.to_string(),
            root: format!("{}/{}/{}", platform.base_path, platform.arch, version),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Remote administration client.
    pub fn rac(&self) -> String {
        format!("{}/rac", self.root)
    }

    /// Standalone infobase tool used for dumps.
    pub fn ibcmd(&self) -> String {
        format!("{}/ibcmd", self.root)
    }
}
