//! Git remote URLs.
//!
//! A [`GitUrl`] always carries an explicit [`Protocol`]. Strings that do not
//! name one (`github.com/org/repo`) fail with [`TypeError::UnknownProtocol`]
//! so callers can tell an ambiguous specification apart from a malformed one.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::TypeError;

/// Transport protocol of a git remote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Ssh,
    Git,
    File,
}

impl Protocol {
    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "ssh" | "git+ssh" | "ssh+git" => Some(Self::Ssh),
            "git" => Some(Self::Git),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Ssh => "ssh",
            Self::Git => "git",
            Self::File => "file",
        }
    }

    /// Returns `true` for `http` and `https`.
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http | Self::Https)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed git remote URL with an explicit protocol.
///
/// scp-like addresses (`git@host:org/repo`) are normalized to
/// `ssh://git@host/org/repo`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct GitUrl {
    url: Url,
    protocol: Protocol,
}

impl GitUrl {
    /// Parse a git remote URL.
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TypeError::InvalidUrl {
                url: raw.to_string(),
                reason: "empty URL".into(),
            });
        }

        if let Some((scheme, _)) = raw.split_once("://") {
            let protocol =
                Protocol::from_scheme(&scheme.to_ascii_lowercase()).ok_or_else(|| {
                    TypeError::InvalidUrl {
                        url: raw.to_string(),
                        reason: format!("unsupported protocol {scheme:?}"),
                    }
                })?;
            let mut url = Url::parse(raw).map_err(|e| TypeError::InvalidUrl {
                url: raw.to_string(),
                reason: e.to_string(),
            })?;
            if url.scheme() != protocol.as_str() {
                // git+ssh:// and friends collapse onto ssh://
                url = Url::parse(&format!("{}{}", protocol.as_str(), &raw[scheme.len()..]))
                    .map_err(|e| TypeError::InvalidUrl {
                        url: raw.to_string(),
                        reason: e.to_string(),
                    })?;
            }
            if protocol != Protocol::File && url.host_str().map_or(true, str::is_empty) {
                return Err(TypeError::InvalidUrl {
                    url: raw.to_string(),
                    reason: "missing host".into(),
                });
            }
            return Ok(Self { url, protocol });
        }

        if let Some(scp) = parse_scp_like(raw) {
            let url = Url::parse(&scp).map_err(|e| TypeError::InvalidUrl {
                url: raw.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(Self {
                url,
                protocol: Protocol::Ssh,
            });
        }

        Err(TypeError::UnknownProtocol(raw.to_string()))
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn port(&self) -> Option<u16> {
        self.url.port()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// The user component, if any.
    pub fn user(&self) -> Option<&str> {
        Some(self.url.username()).filter(|u| !u.is_empty())
    }

    /// Returns a copy with `user` set, unless the URL already names one.
    pub fn with_default_user(&self, user: &str) -> Self {
        let mut out = self.clone();
        if out.user().is_none() {
            let _ = out.url.set_username(user);
        }
        out
    }

    /// Canonical remote string: protocol, user, host, port and path.
    ///
    /// Passwords, query strings and fragments never appear here.
    pub fn remote(&self) -> String {
        let mut out = format!("{}://", self.protocol);
        if let Some(user) = self.user() {
            out.push_str(user);
            out.push('@');
        }
        out.push_str(self.host());
        if let Some(port) = self.port() {
            out.push_str(&format!(":{port}"));
        }
        out.push_str(self.path());
        out
    }

    /// The URL with any username and password replaced, for log output.
    pub fn redacted(&self) -> String {
        let mut url = self.url.clone();
        if !url.username().is_empty() {
            let _ = url.set_username("redacted");
        }
        if url.password().is_some() {
            let _ = url.set_password(Some("redacted"));
        }
        url.to_string()
    }

    /// The full underlying URL, including any embedded password.
    pub fn as_url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for GitUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.remote())
    }
}

impl fmt::Debug for GitUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GitUrl({})", self.redacted())
    }
}

/// `user@host:path` → `ssh://user@host/path`.
fn parse_scp_like(raw: &str) -> Option<String> {
    let (user, rest) = raw.split_once('@')?;
    let (host, path) = rest.split_once(':')?;
    if user.is_empty() || host.is_empty() || path.is_empty() {
        return None;
    }
    if user.contains('/') || host.contains('/') {
        return None;
    }
    let path = path.trim_start_matches('/');
    Some(format!("ssh://{user}@{host}/{path}"))
}
