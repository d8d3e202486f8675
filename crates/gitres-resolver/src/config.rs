use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ResolveError, ResolveResult};

/// Configuration for resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Maximum number of redirects a single resolution may issue.
    pub max_redirects: usize,
    /// Wall-clock limit for each engine request.
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    /// User filled into ssh URLs that name none.
    pub default_ssh_user: String,
    /// The `git` executable used by [`GitCli`](crate::transport::GitCli).
    pub git_binary: String,
    /// Run ssh with `BatchMode=yes` so it never prompts.
    pub ssh_batch_mode: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_redirects: 4,
            request_timeout: Duration::from_secs(120),
            default_ssh_user: "git".into(),
            git_binary: "git".into(),
            ssh_batch_mode: true,
        }
    }
}

impl ResolverConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> ResolveResult<Self> {
        toml::from_str(s).map_err(|e| ResolveError::InvalidInput(format!("invalid config: {e}")))
    }

    /// Load a TOML config file.
    pub fn load(path: &Path) -> ResolveResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ResolveError::InvalidInput(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
