//! In-memory [`GitClient`] for tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{ArchiveFormat, CloneOptions, GitClient, GitError, GitRepo};

pub const DEFAULT_HEAD: &str = "0123456789abcdef0123456789abcdef01234567";

/// Arguments of one `clone_repo` call.
#[derive(Debug, Clone)]
pub struct CloneCall {
    pub url: String,
    pub dest: PathBuf,
    pub depth: Option<u32>,
    pub verify_ssl: bool,
    /// Name of the credential passed along, if any
    pub credential: Option<String>,
}

#[derive(Default)]
struct FakeState {
    files: Vec<(String, String)>,
    head: String,
    clone_error: Option<String>,
    archive_error: Option<String>,
    archive_delay: Option<Duration>,
    calls: Vec<CloneCall>,
    probe: Option<SqlitePool>,
    observed_states: Vec<String>,
}

/// Serves a fixed file tree as every cloned repository.
#[derive(Clone)]
pub struct FakeGit {
    state: Arc<Mutex<FakeState>>,
}

impl FakeGit {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                head: DEFAULT_HEAD.to_string(),
                ..Default::default()
            })),
        }
    }

    pub fn set_files(&self, files: &[(&str, &str)]) {
        self.state.lock().unwrap().files = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.to_string()))
            .collect();
    }

    pub fn set_head(&self, head: &str) {
        self.state.lock().unwrap().head = head.to_string();
    }

    pub fn fail_clone_with(&self, stderr: &str) {
        self.state.lock().unwrap().clone_error = Some(stderr.to_string());
    }

    pub fn succeed_clone(&self) {
        self.state.lock().unwrap().clone_error = None;
    }

    /// Make every `archive` call take at least `delay`.
    pub fn delay_archive(&self, delay: Duration) {
        self.state.lock().unwrap().archive_delay = Some(delay);
    }

    pub fn fail_archive_with(&self, stderr: &str) {
        self.state.lock().unwrap().archive_error = Some(stderr.to_string());
    }

    /// Record the newest project's `import_state` on every clone.
    pub fn observe_state_with(&self, pool: SqlitePool) {
        self.state.lock().unwrap().probe = Some(pool);
    }

    pub fn observed_states(&self) -> Vec<String> {
        self.state.lock().unwrap().observed_states.clone()
    }

    pub fn clone_calls(&self) -> Vec<CloneCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Bytes written by `archive` for the current head.
    pub fn archive_content(&self) -> String {
        format!("archive of {}", self.state.lock().unwrap().head)
    }
}

#[async_trait]
impl GitClient for FakeGit {
    async fn clone_repo(
        &self,
        url: &str,
        dest: &Path,
        options: &CloneOptions,
    ) -> Result<Box<dyn GitRepo>, GitError> {
        let probe = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(CloneCall {
                url: url.to_string(),
                dest: dest.to_path_buf(),
                depth: options.depth,
                verify_ssl: options.verify_ssl,
                credential: options.credential.as_ref().map(|c| c.name.clone()),
            });
            state.probe.clone()
        };

        if let Some(pool) = probe {
            let import_state: String =
                sqlx::query_scalar("SELECT import_state FROM projects ORDER BY id DESC LIMIT 1")
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            self.state.lock().unwrap().observed_states.push(import_state);
        }

        let (files, head, clone_error, archive_error, archive_delay) = {
            let state = self.state.lock().unwrap();
            (
                state.files.clone(),
                state.head.clone(),
                state.clone_error.clone(),
                state.archive_error.clone(),
                state.archive_delay,
            )
        };

        if let Some(stderr) = clone_error {
            return Err(GitError::CommandFailed {
                command: "clone".to_string(),
                stderr,
            });
        }

        std::fs::create_dir_all(dest)?;
        for (relpath, content) in files {
            let path = dest.join(relpath);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)?;
        }

        Ok(Box::new(FakeRepo {
            head,
            archive_error,
            archive_delay,
        }))
    }
}

struct FakeRepo {
    head: String,
    archive_error: Option<String>,
    archive_delay: Option<Duration>,
}

#[async_trait]
impl GitRepo for FakeRepo {
    async fn rev_parse(&self, _rev: &str) -> Result<String, GitError> {
        Ok(self.head.clone())
    }

    async fn archive(
        &self,
        _rev: &str,
        dest: &Path,
        _format: ArchiveFormat,
    ) -> Result<(), GitError> {
        if let Some(delay) = self.archive_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(stderr) = &self.archive_error {
            return Err(GitError::CommandFailed {
                command: "archive".to_string(),
                stderr: stderr.clone(),
            });
        }
        std::fs::write(dest, format!("archive of {}", self.head))?;
        Ok(())
    }
}
