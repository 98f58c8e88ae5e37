//! Git repository manager used by the audit action
//!
//! Repositories are cloned once per URL under a working directory and driven
//! by shelling out to `git` with a deploy key. Each repository serializes its
//! own operations; the manager serializes access to its clone map.

use crate::error::ActionError;
use crate::params::GitKey;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9a-zA-Z\-]+").expect("git-safe pattern is valid"));

/// Replace every run of characters outside `[0-9a-zA-Z-]` with a single `-`.
pub fn git_safe_name(name: &str) -> String {
    UNSAFE_CHARS.replace_all(name, "-").into_owned()
}

/// Single-quote `value` for `sh`; git runs `GIT_SSH_COMMAND` through a shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn write_key(key_path: &Path, git_key: &GitKey) -> Result<(), ActionError> {
    let mut key_material = git_key.expose().to_string();
    if !key_material.ends_with('\n') {
        key_material.push('\n');
    }
    fs::write(key_path, key_material)?;
    #[cfg(unix)]
    fs::set_permissions(key_path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        envs: &[(&str, &str)],
    ) -> Result<CommandOutput, ActionError>;
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        envs: &[(&str, &str)],
    ) -> Result<CommandOutput, ActionError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(envs.iter().copied())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let output = cmd.output().map_err(|source| ActionError::GitSpawn {
            command: args.join(" "),
            source,
        })?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Operations the audit action needs from a Git repository
pub trait GitRepo: Send + Sync {
    fn pull_rebase(&self) -> Result<(), ActionError>;

    /// Write `contents` to `dir/file_name`, commit as `author` and push.
    /// Does nothing when the file is unchanged.
    fn commit_push(
        &self,
        contents: &str,
        dir: &str,
        file_name: &str,
        message: &str,
        author: &str,
    ) -> Result<(), ActionError>;

    /// Remove `dir/file_name`, commit as `author` and push.
    /// Does nothing when the file does not exist.
    fn delete_push(
        &self,
        dir: &str,
        file_name: &str,
        message: &str,
        author: &str,
    ) -> Result<(), ActionError>;
}

/// Hands out one repository per Git URL
pub trait GitRepoProvider: Send + Sync {
    fn get_git_repo(&self, git_url: &str, git_key: &GitKey)
        -> Result<Arc<dyn GitRepo>, ActionError>;
}

/// A local clone driven through the `git` CLI
pub struct CliGitRepo {
    git_url: String,
    repo_dir: PathBuf,
    ssh_command: String,
    key_path: PathBuf,
    key: Mutex<GitKey>,
    user_email: String,
    executor: Arc<dyn CommandExecutor>,
    lock: Mutex<()>,
}

impl CliGitRepo {
    /// Write the deploy key under `workdir` and clone `git_url` unless a clone
    /// already exists there.
    pub fn open(
        git_url: &str,
        git_key: &GitKey,
        workdir: &Path,
        user_email: &str,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self, ActionError> {
        fs::create_dir_all(workdir)?;
        let safe_url = git_safe_name(git_url);

        let key_path = workdir.join(format!("{}.key", safe_url));
        write_key(&key_path, git_key)?;

        let repo = Self {
            git_url: git_url.to_string(),
            repo_dir: workdir.join(&safe_url),
            ssh_command: format!(
                "ssh -i {} -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null",
                shell_quote(&key_path.to_string_lossy())
            ),
            key_path,
            key: Mutex::new(git_key.clone()),
            user_email: user_email.to_string(),
            executor,
            lock: Mutex::new(()),
        };

        if repo.repo_dir.join(".git").exists() {
            debug!(git_url = %repo.git_url, "Reusing existing clone");
        } else {
            info!(git_url = %repo.git_url, repo_dir = %repo.repo_dir.display(), "Cloning audit repository");
            let repo_dir = repo.repo_dir.to_string_lossy().to_string();
            repo.run_git(workdir, &["clone", &repo.git_url, &repo_dir])?;
        }

        Ok(repo)
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Rewrite the deploy key file when `git_key` differs from the one in use.
    /// Returns whether the key changed.
    pub fn refresh_key(&self, git_key: &GitKey) -> Result<bool, ActionError> {
        let _guard = self.guard();
        let mut current = self.key.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *current == *git_key {
            return Ok(false);
        }

        write_key(&self.key_path, git_key)?;
        *current = git_key.clone();
        info!(git_url = %self.git_url, "Deploy key rotated");
        Ok(true)
    }

    fn run_git(&self, cwd: &Path, args: &[&str]) -> Result<CommandOutput, ActionError> {
        let output = self.executor.execute(
            "git",
            args,
            Some(cwd),
            &[("GIT_SSH_COMMAND", self.ssh_command.as_str())],
        )?;

        if output.status != 0 {
            return Err(ActionError::GitCommand {
                command: args.join(" "),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    fn git(&self, args: &[&str]) -> Result<CommandOutput, ActionError> {
        self.run_git(&self.repo_dir, args)
    }

    fn commit_and_push(&self, message: &str, author: &str) -> Result<(), ActionError> {
        let user_name = format!("user.name={}", author);
        let user_email = format!("user.email={}", self.user_email);
        self.git(&["-c", &user_name, "-c", &user_email, "commit", "-m", message])?;
        self.git(&["push"])?;
        Ok(())
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GitRepo for CliGitRepo {
    fn pull_rebase(&self) -> Result<(), ActionError> {
        let _guard = self.guard();
        self.git(&["pull", "--rebase"])?;
        Ok(())
    }

    fn commit_push(
        &self,
        contents: &str,
        dir: &str,
        file_name: &str,
        message: &str,
        author: &str,
    ) -> Result<(), ActionError> {
        let _guard = self.guard();
        let relative = format!("{}/{}", dir, file_name);

        fs::create_dir_all(self.repo_dir.join(dir))?;
        fs::write(self.repo_dir.join(&relative), contents)?;
        self.git(&["add", &relative])?;

        let status = self.git(&["status", "--porcelain", "--", &relative])?;
        if status.stdout.trim().is_empty() {
            debug!(path = %relative, "No changes to commit");
            return Ok(());
        }

        self.commit_and_push(message, author)?;
        info!(path = %relative, message = %message, "Pushed audit commit");
        Ok(())
    }

    fn delete_push(
        &self,
        dir: &str,
        file_name: &str,
        message: &str,
        author: &str,
    ) -> Result<(), ActionError> {
        let _guard = self.guard();
        let relative = format!("{}/{}", dir, file_name);

        if !self.repo_dir.join(&relative).exists() {
            info!(path = %relative, "File not tracked, nothing to delete");
            return Ok(());
        }

        self.git(&["rm", "--quiet", &relative])?;
        self.commit_and_push(message, author)?;
        info!(path = %relative, message = %message, "Pushed audit deletion");
        Ok(())
    }
}

/// Keeps one `CliGitRepo` per Git URL under a shared working directory.
///
/// The map lock is held only to find the URL's slot; cloning happens inside
/// the slot, so a slow clone blocks callers of that URL alone.
pub struct GitRepoManager {
    workdir: PathBuf,
    user_email: String,
    executor: Arc<dyn CommandExecutor>,
    repos: Mutex<HashMap<String, Arc<OnceCell<Arc<CliGitRepo>>>>>,
}

impl GitRepoManager {
    pub fn new(
        workdir: impl Into<PathBuf>,
        user_email: impl Into<String>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            workdir: workdir.into(),
            user_email: user_email.into(),
            executor,
            repos: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_system_git(workdir: impl Into<PathBuf>, user_email: impl Into<String>) -> Self {
        Self::new(workdir, user_email, Arc::new(SystemCommandExecutor))
    }

    fn slot(&self, git_url: &str) -> Arc<OnceCell<Arc<CliGitRepo>>> {
        self.repos
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(git_url.to_string())
            .or_default()
            .clone()
    }
}

impl GitRepoProvider for GitRepoManager {
    fn get_git_repo(
        &self,
        git_url: &str,
        git_key: &GitKey,
    ) -> Result<Arc<dyn GitRepo>, ActionError> {
        let slot = self.slot(git_url);
        let repo = slot.get_or_try_init(|| {
            CliGitRepo::open(
                git_url,
                git_key,
                &self.workdir,
                &self.user_email,
                self.executor.clone(),
            )
            .map(Arc::new)
        })?;

        // params may carry a rotated key for a URL that is already cloned
        repo.refresh_key(git_key)?;
        let repo: Arc<dyn GitRepo> = repo.clone();
        Ok(repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_safe_name() {
        assert_eq!(git_safe_name("my_service!1"), "my-service-1");
        assert_eq!(git_safe_name("already-safe-01"), "already-safe-01");
        assert_eq!(git_safe_name("a..b//c"), "a-b-c");
        assert_eq!(
            git_safe_name("git@github.com:org/audit.git"),
            "git-github-com-org-audit-git"
        );
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/tmp/repos/a.key"), "'/tmp/repos/a.key'");
        assert_eq!(shell_quote("/tmp/my repos/a.key"), "'/tmp/my repos/a.key'");
        assert_eq!(shell_quote("/tmp/it's/a.key"), r"'/tmp/it'\''s/a.key'");
    }
}
