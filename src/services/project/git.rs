//! Git capability used by project import.
//!
//! [`GitClient`] clones a remote repository and hands back a [`GitRepo`]
//! for the checkout. [`GitCli`] is the production implementation backed by
//! the `git` executable; tests inject their own.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::models::EdaCredential;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to execute git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
}

/// Archive formats written by [`GitRepo::archive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
}

impl ArchiveFormat {
    /// Name passed to `git archive --format`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

/// Options for a clone.
#[derive(Debug, Clone)]
pub struct CloneOptions {
    pub credential: Option<EdaCredential>,
    /// History depth; `None` clones the full history
    pub depth: Option<u32>,
    pub verify_ssl: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            credential: None,
            depth: None,
            verify_ssl: true,
        }
    }
}

/// Clones remote repositories.
#[async_trait]
pub trait GitClient: Send + Sync {
    async fn clone_repo(
        &self,
        url: &str,
        dest: &Path,
        options: &CloneOptions,
    ) -> Result<Box<dyn GitRepo>, GitError>;
}

/// A local checkout.
#[async_trait]
pub trait GitRepo: Send + Sync {
    /// Resolve a revision to a commit hash.
    async fn rev_parse(&self, rev: &str) -> Result<String, GitError>;

    /// Write an archive of `rev` to `dest`.
    async fn archive(&self, rev: &str, dest: &Path, format: ArchiveFormat)
        -> Result<(), GitError>;
}

/// [`GitClient`] backed by the `git` command line tool.
#[derive(Debug, Clone)]
pub struct GitCli {
    git_bin: String,
}

impl GitCli {
    pub fn new(git_bin: impl Into<String>) -> Self {
        Self {
            git_bin: git_bin.into(),
        }
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

#[async_trait]
impl GitClient for GitCli {
    async fn clone_repo(
        &self,
        url: &str,
        dest: &Path,
        options: &CloneOptions,
    ) -> Result<Box<dyn GitRepo>, GitError> {
        let auth = CloneAuth::new(options.credential.as_ref())?;

        let mut cmd = Command::new(&self.git_bin);
        if !options.verify_ssl {
            cmd.args(["-c", "http.sslVerify=false"]);
        }
        cmd.args(["clone", "--quiet"]);
        if let Some(depth) = options.depth {
            cmd.arg("--depth").arg(depth.to_string());
        }
        cmd.arg("--").arg(url).arg(dest);
        cmd.envs(auth.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(key) = &auth.ssh_key {
            cmd.env("GIT_SSH_COMMAND", ssh_command(key.path(), options.verify_ssl));
        }

        debug!(url, dest = %dest.display(), depth = ?options.depth, "Cloning repository");
        run(cmd, "clone").await?;

        Ok(Box::new(GitCliRepo {
            git_bin: self.git_bin.clone(),
            path: dest.to_path_buf(),
        }))
    }
}

struct GitCliRepo {
    git_bin: String,
    path: PathBuf,
}

impl GitCliRepo {
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.git_bin);
        cmd.arg("-C").arg(&self.path);
        cmd
    }
}

#[async_trait]
impl GitRepo for GitCliRepo {
    async fn rev_parse(&self, rev: &str) -> Result<String, GitError> {
        let mut cmd = self.command();
        cmd.args(["rev-parse", rev]);
        let stdout = run(cmd, "rev-parse").await?;
        Ok(stdout.trim().to_string())
    }

    async fn archive(
        &self,
        rev: &str,
        dest: &Path,
        format: ArchiveFormat,
    ) -> Result<(), GitError> {
        let mut cmd = self.command();
        cmd.arg("archive")
            .arg(format!("--format={}", format.as_str()))
            .arg("--output")
            .arg(dest)
            .arg(rev);
        run(cmd, "archive").await?;
        Ok(())
    }
}

/// Run a git command, returning stdout on success.
async fn run(mut cmd: Command, command: &str) -> Result<String, GitError> {
    let output = cmd
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError::CommandFailed {
            command: command.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Authentication material for one clone.
///
/// Secrets are passed through the environment rather than the URL so they
/// never show up in error messages. The key file is removed on drop.
struct CloneAuth {
    env: Vec<(String, String)>,
    ssh_key: Option<NamedTempFile>,
}

impl CloneAuth {
    fn new(credential: Option<&EdaCredential>) -> Result<Self, GitError> {
        let Some(credential) = credential else {
            return Ok(Self {
                env: Vec::new(),
                ssh_key: None,
            });
        };

        let ssh_key = match credential.input_str("ssh_key_data") {
            Some(key) => {
                let mut file = NamedTempFile::new()?;
                file.write_all(key.as_bytes())?;
                if !key.ends_with('\n') {
                    file.write_all(b"\n")?;
                }
                file.flush()?;
                Some(file)
            }
            None => None,
        };

        Ok(Self {
            env: http_auth_env(credential),
            ssh_key,
        })
    }
}

/// Environment that makes git send a basic auth header over http(s).
fn http_auth_env(credential: &EdaCredential) -> Vec<(String, String)> {
    let Some(secret) = credential
        .input_str("password")
        .or_else(|| credential.input_str("token"))
    else {
        return Vec::new();
    };
    let username = credential.input_str("username").unwrap_or("git");
    let header = format!(
        "Authorization: Basic {}",
        STANDARD.encode(format!("{}:{}", username, secret))
    );

    vec![
        ("GIT_CONFIG_COUNT".to_string(), "1".to_string()),
        ("GIT_CONFIG_KEY_0".to_string(), "http.extraHeader".to_string()),
        ("GIT_CONFIG_VALUE_0".to_string(), header),
    ]
}

fn ssh_command(key_path: &Path, verify_host: bool) -> String {
    let mut command = format!("ssh -i '{}' -o IdentitiesOnly=yes", key_path.display());
    if !verify_host {
        command.push_str(" -o StrictHostKeyChecking=no");
    }
    command
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn credential(inputs: serde_json::Value) -> EdaCredential {
        EdaCredential {
            id: 1,
            name: "scm".to_string(),
            description: None,
            credential_type: "scm".to_string(),
            inputs,
            managed: false,
            created_at: String::new(),
            modified_at: String::new(),
        }
    }

    #[test]
    fn test_http_auth_env_uses_basic_header() {
        let env = http_auth_env(&credential(json!({"username": "bob", "password": "pw"})));
        assert_eq!(env.len(), 3);
        assert_eq!(env[1].1, "http.extraHeader");
        assert_eq!(
            env[2].1,
            format!("Authorization: Basic {}", STANDARD.encode("bob:pw"))
        );
    }

    #[test]
    fn test_http_auth_env_token_without_username() {
        let env = http_auth_env(&credential(json!({"token": "abc"})));
        assert_eq!(
            env[2].1,
            format!("Authorization: Basic {}", STANDARD.encode("git:abc"))
        );
    }

    #[test]
    fn test_http_auth_env_without_secret() {
        assert!(http_auth_env(&credential(json!({"username": "bob"}))).is_empty());
    }

    #[test]
    fn test_clone_auth_writes_ssh_key() {
        let cred = credential(json!({"ssh_key_data": "-----BEGIN KEY-----"}));
        let auth = CloneAuth::new(Some(&cred)).unwrap();
        let key = auth.ssh_key.as_ref().unwrap();
        let written = std::fs::read_to_string(key.path()).unwrap();
        assert_eq!(written, "-----BEGIN KEY-----\n");
        assert!(auth.env.is_empty());
    }

    #[test]
    fn test_ssh_command_host_checking() {
        let path = Path::new("/tmp/key");
        assert_eq!(
            ssh_command(path, true),
            "ssh -i '/tmp/key' -o IdentitiesOnly=yes"
        );
        assert!(ssh_command(path, false).ends_with("-o StrictHostKeyChecking=no"));
    }

    #[test]
    fn test_archive_format_names() {
        assert_eq!(ArchiveFormat::TarGz.as_str(), "tar.gz");
    }

    async fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_git_cli_clone_rev_parse_and_archive() {
        if !git_available().await {
            return;
        }

        let dir = tempfile::TempDir::new().unwrap();
        let origin = dir.path().join("origin");
        std::fs::create_dir_all(origin.join("rulebooks")).unwrap();
        std::fs::write(origin.join("rulebooks/app.yml"), "- rules: []\n").unwrap();

        for args in [
            vec!["init", "--quiet"],
            vec!["add", "."],
            vec![
                "-c",
                "user.name=test",
                "-c",
                "user.email=test@example.com",
                "commit",
                "--quiet",
                "-m",
                "initial",
            ],
        ] {
            let status = std::process::Command::new("git")
                .args(&args)
                .current_dir(&origin)
                .status()
                .unwrap();
            assert!(status.success());
        }

        let url = format!("file://{}", origin.display());
        let dest = dir.path().join("src");
        let options = CloneOptions {
            depth: Some(1),
            ..Default::default()
        };
        let repo = GitCli::default()
            .clone_repo(&url, &dest, &options)
            .await
            .unwrap();

        assert!(dest.join("rulebooks/app.yml").exists());
        let hash = repo.rev_parse("HEAD").await.unwrap();
        assert_eq!(hash.len(), 40);

        let archive = dir.path().join("archive.tar.gz");
        repo.archive("HEAD", &archive, ArchiveFormat::TarGz)
            .await
            .unwrap();
        assert!(std::fs::metadata(&archive).unwrap().len() > 0);
    }

    #[tokio::test]
    async fn test_git_cli_clone_failure_reports_stderr() {
        if !git_available().await {
            return;
        }

        let dir = tempfile::TempDir::new().unwrap();
        let missing = format!("file://{}", dir.path().join("missing").display());
        let err = GitCli::default()
            .clone_repo(&missing, &dir.path().join("src"), &CloneOptions::default())
            .await
            .err()
            .unwrap();

        match err {
            GitError::CommandFailed { command, stderr } => {
                assert_eq!(command, "clone");
                assert!(!stderr.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
