//! The version-control transport.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::process::Command;
use tracing::debug;

use gitres_contenthash::Definition;
use gitres_types::GitUrl;

use crate::config::ResolverConfig;
use crate::error::TransportError;

/// Credential material for one transport call.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    pub ssh_auth_socket: Option<PathBuf>,
    pub ssh_known_hosts: Option<String>,
    pub username: Option<String>,
    pub token: Option<String>,
    pub header: Option<String>,
}

impl AuthConfig {
    pub fn none() -> Self {
        Self::default()
    }

    /// Short label of the auth method in use, for definitions and logs.
    pub fn method(&self) -> &'static str {
        if self.ssh_auth_socket.is_some() {
            "ssh-agent"
        } else if self.header.is_some() {
            "http-header"
        } else if self.token.is_some() {
            "http-token"
        } else {
            "none"
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("ssh_auth_socket", &self.ssh_auth_socket)
            .field("ssh_known_hosts", &self.ssh_known_hosts.as_ref().map(|_| "..."))
            .field("username", &self.username)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("header", &self.header.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Shape of a checkout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchOptions {
    pub keep_git_dir: bool,
    pub depth: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            keep_git_dir: false,
            depth: 1,
        }
    }
}

/// Network access to git remotes.
#[async_trait]
pub trait GitTransport: Send + Sync {
    /// Raw `ls-remote --symref` output for `url`.
    async fn ls_remote(&self, url: &GitUrl, auth: &AuthConfig) -> Result<String, TransportError>;

    /// The best common ancestor of two commits.
    async fn merge_base(
        &self,
        url: &GitUrl,
        auth: &AuthConfig,
        a: &str,
        b: &str,
    ) -> Result<String, TransportError>;

    /// A build definition that checks out `sha` from `url`.
    async fn fetch(
        &self,
        url: &GitUrl,
        auth: &AuthConfig,
        sha: &str,
        options: &FetchOptions,
    ) -> Result<Definition, TransportError>;
}

/// The checkout definition for `sha` of `url`.
///
/// The commit is the definition's source, so every checkout of the same
/// commit builds the same tree; remote, auth method and shape are attrs.
pub fn checkout_definition(
    url: &GitUrl,
    auth: &AuthConfig,
    sha: &str,
    options: &FetchOptions,
) -> Definition {
    Definition::new(sha)
        .with_attr("remote", url.remote())
        .with_attr("auth", auth.method())
        .with_attr("keep-git-dir", options.keep_git_dir.to_string())
        .with_attr("depth", options.depth.to_string())
}

/// Stderr fragments git and ssh print when credentials are missing or
/// rejected.
const AUTH_FAILURE_MARKERS: &[&str] = &[
    "Authentication failed",
    "Permission denied",
    "could not read Username",
    "could not read Password",
    "terminal prompts disabled",
    "Host key verification failed",
];

const NOT_FOUND_MARKERS: &[&str] = &["Repository not found", "does not appear to be a git repository"];

fn classify_failure(stderr: &str) -> TransportError {
    let message = stderr.trim().to_string();
    if AUTH_FAILURE_MARKERS.iter().any(|m| stderr.contains(m)) {
        TransportError::Auth(message)
    } else if NOT_FOUND_MARKERS.iter().any(|m| stderr.contains(m)) {
        TransportError::NotFound(message)
    } else {
        TransportError::Failed(message)
    }
}

/// Value of the `Authorization` header for `auth`, if it carries one.
fn authorization(auth: &AuthConfig) -> Option<String> {
    if let Some(header) = &auth.header {
        return Some(header.clone());
    }
    let token = auth.token.as_ref()?;
    let username = auth.username.as_deref().unwrap_or("x-access-token");
    Some(format!("Basic {}", STANDARD.encode(format!("{username}:{token}"))))
}

/// [`GitTransport`] that shells out to the `git` binary.
#[derive(Clone, Debug)]
pub struct GitCli {
    git: String,
    batch_mode: bool,
}

impl GitCli {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            git: config.git_binary.clone(),
            batch_mode: config.ssh_batch_mode,
        }
    }

    /// The command and environment for one invocation.
    fn command(&self, auth: &AuthConfig) -> Result<(Command, Option<tempfile::NamedTempFile>), TransportError> {
        let mut cmd = Command::new(&self.git);
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .env_remove("GIT_DIR")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // config from the environment stays out of the process list
        if let Some(authorization) = authorization(auth) {
            cmd.env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", "http.extraHeader")
                .env("GIT_CONFIG_VALUE_0", format!("Authorization: {authorization}"));
        }

        let mut known_hosts_file = None;
        let mut ssh = std::env::var("GIT_SSH").unwrap_or_else(|_| "ssh".to_string());
        if self.batch_mode {
            ssh.push_str(" -o BatchMode=yes");
        }
        if let Some(known_hosts) = &auth.ssh_known_hosts {
            let mut file = tempfile::NamedTempFile::new()?;
            std::io::Write::write_all(&mut file, known_hosts.as_bytes())?;
            ssh.push_str(&format!(
                " -o StrictHostKeyChecking=yes -o UserKnownHostsFile={}",
                file.path().display()
            ));
            known_hosts_file = Some(file);
        }
        if std::env::var_os("GIT_SSH_COMMAND").is_none() || known_hosts_file.is_some() {
            cmd.env("GIT_SSH_COMMAND", ssh);
        }
        if let Some(socket) = &auth.ssh_auth_socket {
            cmd.env("SSH_AUTH_SOCK", socket);
        }
        Ok((cmd, known_hosts_file))
    }

    async fn run(&self, mut cmd: Command) -> Result<String, TransportError> {
        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }
        String::from_utf8(output.stdout)
            .map_err(|e| TransportError::Failed(format!("git printed invalid UTF-8: {e}")))
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new(&ResolverConfig::default())
    }
}

#[async_trait]
impl GitTransport for GitCli {
    async fn ls_remote(&self, url: &GitUrl, auth: &AuthConfig) -> Result<String, TransportError> {
        debug!(url = %url.redacted(), auth = auth.method(), "git ls-remote");
        let (mut cmd, _known_hosts) = self.command(auth)?;
        cmd.args(["ls-remote", "--symref"]).arg(url.as_url().as_str());
        self.run(cmd).await
    }

    async fn merge_base(
        &self,
        url: &GitUrl,
        auth: &AuthConfig,
        a: &str,
        b: &str,
    ) -> Result<String, TransportError> {
        let scratch = tempfile::tempdir()?;
        let dir = scratch.path().to_string_lossy().into_owned();
        debug!(url = %url.redacted(), a, b, "git merge-base");

        let (mut cmd, _known_hosts) = self.command(&AuthConfig::none())?;
        cmd.args(["init", "--bare", "--quiet", &dir]);
        self.run(cmd).await?;

        let (mut cmd, _known_hosts) = self.command(auth)?;
        cmd.args(["-C", &dir, "fetch", "--quiet", "--filter=blob:none"])
            .arg(url.as_url().as_str())
            .args([a, b]);
        self.run(cmd).await?;

        let (mut cmd, _known_hosts) = self.command(&AuthConfig::none())?;
        cmd.args(["-C", &dir, "merge-base", a, b]);
        let out = self.run(cmd).await?;
        let sha = out.trim();
        if sha.is_empty() {
            return Err(TransportError::NotFound(format!("no common ancestor of {a} and {b}")));
        }
        Ok(sha.to_string())
    }

    async fn fetch(
        &self,
        url: &GitUrl,
        auth: &AuthConfig,
        sha: &str,
        options: &FetchOptions,
    ) -> Result<Definition, TransportError> {
        Ok(checkout_definition(url, auth, sha, options))
    }
}
