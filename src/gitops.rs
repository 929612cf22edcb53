use std::{
   path::{Path, PathBuf},
   process::Command,
   thread,
   time::Duration,
};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
   config::DevlogSettings,
   error::{Result, WormError},
};

/// Subdirectories created on devlog init
const DEVLOG_LAYOUT: &[&str] = &[
   "snippets/python",
   "snippets/typescript",
   "snippets/javascript",
   "snippets/go",
   "snippets/rust",
   "snippets/tsx",
   "analysis/weekly",
   "analysis/monthly",
   "patterns",
   "stats",
];

/// Error substrings that make a push worth retrying
const TRANSIENT_PUSH_ERRORS: &[&str] = &[
   "connection reset",
   "connection refused",
   "connection timed out",
   "network unreachable",
   "could not resolve host",
   "ssl",
   "temporary failure",
];

/// Result of a devlog commit
#[derive(Debug, Clone)]
pub struct CommitResult {
   pub commit_hash:  String,
   pub message:      String,
   pub committed_at: DateTime<Utc>,
   pub branch:       String,
}

/// Whether a push rejection message indicates the remote's secret scanner
/// fired. These are never retried and alert immediately.
pub fn is_secret_rejection(message: &str) -> bool {
   let lower = message.to_lowercase();
   message.contains("GH013") || lower.contains("secret")
}

/// The devlog output repository: snippet writes, commits and pushes over
/// the `git` CLI.
pub struct DevlogRepository {
   repo_path:  PathBuf,
   remote_url: String,
   branch:     String,
}

impl DevlogRepository {
   const PUSH_RETRIES: u32 = 3;
   const PUSH_RETRY_DELAY: Duration = Duration::from_secs(5);

   pub fn new(settings: &DevlogSettings) -> Self {
      Self {
         repo_path:  settings.repo_path.clone(),
         remote_url: settings.remote.clone(),
         branch:     settings.branch.clone(),
      }
   }

   pub const fn repo_path(&self) -> &PathBuf {
      &self.repo_path
   }

   fn git(&self, args: &[&str]) -> Result<std::process::Output> {
      Command::new("git")
         .args(args)
         .current_dir(&self.repo_path)
         .output()
         .map_err(|e| WormError::GitError(format!("Failed to run git {}: {e}", args.join(" "))))
   }

   /// Initialize the repository if the path is not one yet. The daemon
   /// commits unattended, so a local identity is configured when none is
   /// set.
   pub fn ensure_repo(&self) -> Result<()> {
      std::fs::create_dir_all(&self.repo_path)?;

      if !self.repo_path.join(".git").exists() {
         let output = self.git(&["init", "-q", "-b", self.branch.as_str()])?;
         if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WormError::GitError(format!("git init failed: {stderr}")));
         }
         info!(path = %self.repo_path.display(), "initialized devlog repository");
      }

      let email_check = self.git(&["config", "user.email"])?;
      if email_check.stdout.is_empty() {
         self.git(&["config", "user.name", "codeworm"])?;
         self.git(&["config", "user.email", "codeworm@localhost"])?;
      }

      Ok(())
   }

   /// Create the devlog directory structure, keeping empty dirs tracked
   pub fn ensure_directory_structure(&self) -> Result<()> {
      for dir in DEVLOG_LAYOUT {
         let full_path = self.repo_path.join(dir);
         std::fs::create_dir_all(&full_path)?;
         let gitkeep = full_path.join(".gitkeep");
         if !gitkeep.exists() {
            std::fs::write(&gitkeep, "")?;
         }
      }
      Ok(())
   }

   /// Write a snippet file under `snippets/<language>/` and return its path
   pub fn write_snippet(&self, content: &str, filename: &str, language: &str) -> Result<PathBuf> {
      let snippet_dir = self.repo_path.join("snippets").join(language);
      std::fs::create_dir_all(&snippet_dir)?;

      let file_path = snippet_dir.join(filename);
      std::fs::write(&file_path, content)?;
      Ok(file_path)
   }

   /// Stage the given files and commit. An empty index after staging is the
   /// nothing-to-commit error; the cycle treats that as fatal.
   pub fn commit(&self, message: &str, files: &[PathBuf]) -> Result<CommitResult> {
      if files.is_empty() {
         let output = self.git(&["add", "-A"])?;
         if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WormError::GitError(format!("git add -A failed: {stderr}")));
         }
      } else {
         for file in files {
            let rel = file.strip_prefix(&self.repo_path).unwrap_or(file);
            let rel_str = rel.to_string_lossy();
            let output = self.git(&["add", rel_str.as_ref()])?;
            if !output.status.success() {
               let stderr = String::from_utf8_lossy(&output.stderr);
               return Err(WormError::GitError(format!("git add {rel_str} failed: {stderr}")));
            }
         }
      }

      // Exit code 0 means the index matches HEAD: nothing staged
      let staged = self.git(&["diff", "--cached", "--quiet"])?;
      if staged.status.success() {
         return Err(WormError::NothingToCommit(self.repo_path.display().to_string()));
      }

      let output = self.git(&["commit", "-q", "-m", message])?;
      if !output.status.success() {
         let stderr = String::from_utf8_lossy(&output.stderr);
         let stdout = String::from_utf8_lossy(&output.stdout);
         return Err(WormError::GitError(format!(
            "git commit failed:\nstderr: {stderr}\nstdout: {stdout}"
         )));
      }

      let commit_hash = self.head_hash()?;
      let branch = self.current_branch()?;
      debug!(hash = %commit_hash, branch = %branch, "devlog commit created");

      Ok(CommitResult {
         commit_hash,
         message: message.to_string(),
         committed_at: Utc::now(),
         branch,
      })
   }

   /// Push to the configured remote with retry on transient failures.
   /// Returns false when no remote is configured. Conflict rejections and
   /// secret-scanner rejections are raised immediately without retry.
   pub fn push(&self) -> Result<bool> {
      if self.remote_url.is_empty() {
         debug!("no remote configured, skipping push");
         return Ok(false);
      }

      let remote_check = self.git(&["remote", "get-url", "origin"])?;
      if !remote_check.status.success() {
         let output = self.git(&["remote", "add", "origin", self.remote_url.as_str()])?;
         if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WormError::GitPushError(format!("failed to add remote: {stderr}")));
         }
         info!(url = %self.remote_url, "created remote origin");
      }

      let mut last_error = String::new();

      for attempt in 0..Self::PUSH_RETRIES {
         let output = self.git(&["push", "origin", self.branch.as_str()])?;
         if output.status.success() {
            info!(branch = %self.branch, "push successful");
            return Ok(true);
         }

         let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
         let lower = stderr.to_lowercase();

         if is_secret_rejection(&stderr) {
            return Err(WormError::GitPushError(stderr));
         }
         if lower.contains("conflict") || lower.contains("rejected") {
            return Err(WormError::GitConflictError(stderr));
         }

         if TRANSIENT_PUSH_ERRORS.iter().any(|pattern| lower.contains(pattern)) {
            warn!(attempt = attempt + 1, retries = Self::PUSH_RETRIES, error = %stderr, "push retry");
            last_error = stderr;
            thread::sleep(Self::PUSH_RETRY_DELAY * (attempt + 1));
         } else {
            return Err(WormError::GitPushError(stderr));
         }
      }

      Err(WormError::GitPushError(format!(
         "push failed after {} retries: {last_error}",
         Self::PUSH_RETRIES
      )))
   }

   /// Short hash of HEAD
   pub fn head_hash(&self) -> Result<String> {
      let output = self.git(&["rev-parse", "--short=8", "HEAD"])?;
      if !output.status.success() {
         let stderr = String::from_utf8_lossy(&output.stderr);
         return Err(WormError::GitError(format!("git rev-parse HEAD failed: {stderr}")));
      }
      Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
   }

   fn current_branch(&self) -> Result<String> {
      let output = self.git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
      if !output.status.success() {
         let stderr = String::from_utf8_lossy(&output.stderr);
         return Err(WormError::GitError(format!("failed to resolve branch: {stderr}")));
      }
      Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
   }

   /// Recent devlog commits as `(short hash, subject)` pairs
   pub fn recent_commits(&self, count: usize) -> Result<Vec<(String, String)>> {
      let count_arg = format!("-{count}");
      let output = self.git(&["log", &count_arg, "--format=%h %s"])?;
      if !output.status.success() {
         return Ok(Vec::new());
      }
      Ok(String::from_utf8_lossy(&output.stdout)
         .lines()
         .filter_map(|line| {
            line
               .split_once(' ')
               .map(|(hash, subject)| (hash.to_string(), subject.to_string()))
         })
         .collect())
   }
}
