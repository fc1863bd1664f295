//! Git client seam: the primitive version-control operations the engine
//! relies on, and an implementation over the `git` executable.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::domain::change::Revision;

const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';
const LOG_FORMAT: &str = "--format=%H%x1f%an <%ae>%x1f%s%x1f%B%x1e";

/// Errors produced by git operations.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {args} failed: {stderr}")]
    CommandFailed { args: String, stderr: String },

    #[error("merge of {revision} conflicts: {detail}")]
    MergeConflict { revision: String, detail: String },

    #[error("push to {branch} rejected (expected remote tip {expected}): {detail}")]
    PushRejected {
        branch: String,
        expected: String,
        detail: String,
    },

    #[error("unknown revision: {0}")]
    UnknownRevision(String),

    #[error("nothing to commit")]
    NothingToCommit,
}

/// Result type for git operations.
pub type GitResult<T> = std::result::Result<T, GitError>;

/// Metadata of a single commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub revision: Revision,
    /// `Name <email>`.
    pub author: String,
    pub subject: String,
    /// Full message including the subject line.
    pub message: String,
}

/// A checkout of `start_point`, optionally onto a (re)created local branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// Local branch to create. `None` checks out `start_point` directly.
    pub branch: Option<String>,
    pub start_point: String,
    /// Delete an existing local branch of the same name first.
    pub delete_if_exists: bool,
}

impl CheckoutRequest {
    /// Forced checkout of `branch` from `start_point`, replacing any stale local branch.
    pub fn branch(branch: impl Into<String>, start_point: impl Into<String>) -> Self {
        Self {
            branch: Some(branch.into()),
            start_point: start_point.into(),
            delete_if_exists: true,
        }
    }

    /// Checkout of a ref without creating a branch.
    pub fn reference(start_point: impl Into<String>) -> Self {
        Self {
            branch: None,
            start_point: start_point.into(),
            delete_if_exists: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeMode {
    /// Stage the combined changes without committing.
    Squash,
    /// Always create a merge commit with the given message.
    NoFastForward { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub revision: Revision,
    pub mode: MergeMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub message: String,
    pub author: Option<String>,
}

/// A conditional remote update: `branch` moves from `expected_tip` to
/// `new_tip` only if the remote still points at `expected_tip`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    pub remote: String,
    pub branch: String,
    pub expected_tip: Revision,
    pub new_tip: Revision,
}

/// Primitive git operations, bound to one local workspace.
#[async_trait]
pub trait GitClient: Send + Sync {
    /// Update remote-tracking refs of `remote`.
    async fn fetch(&self, remote: &str) -> GitResult<()>;

    /// Forced checkout, discarding local modifications.
    async fn checkout(&self, request: &CheckoutRequest) -> GitResult<()>;

    /// Resolve a ref or object name to a commit.
    async fn rev_parse(&self, rev: &str) -> GitResult<Revision>;

    /// Revision currently checked out.
    async fn head(&self) -> GitResult<Revision>;

    /// Commits reachable from `tip` but not from `base`, newest first.
    async fn commits_between(&self, base: &Revision, tip: &Revision)
        -> GitResult<Vec<CommitSummary>>;

    async fn commit_info(&self, rev: &Revision) -> GitResult<CommitSummary>;

    /// Merge `request.revision` into the checked-out branch.
    async fn merge(&self, request: &MergeRequest) -> GitResult<()>;

    /// Commit the staged changes and return the new head.
    async fn commit(&self, request: &CommitRequest) -> GitResult<Revision>;

    /// Conditional push; fails with [`GitError::PushRejected`] if the remote moved.
    async fn push(&self, request: &PushRequest) -> GitResult<()>;

    /// Drop any index, working-tree or in-progress merge state.
    async fn reset_hard(&self) -> GitResult<()>;
}

/// [`GitClient`] over the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    work_dir: PathBuf,
}

impl GitCli {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Names of the configured remotes.
    pub async fn remotes(&self) -> GitResult<Vec<String>> {
        let out = self.run(&["remote"]).await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn output(&self, args: &[&str]) -> GitResult<Output> {
        tracing::debug!(target: "preint::git", args = ?args, "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.work_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .output()
            .await?;
        Ok(output)
    }

    /// Run git and return trimmed stdout, failing on a non-zero exit.
    async fn run(&self, args: &[&str]) -> GitResult<String> {
        let output = self.output(args).await?;
        if !output.status.success() {
            return Err(command_failed(args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn is_ancestor(&self, ancestor: &Revision, descendant: &Revision) -> GitResult<bool> {
        let args = [
            "merge-base",
            "--is-ancestor",
            ancestor.as_str(),
            descendant.as_str(),
        ];
        let output = self.output(&args).await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(command_failed(&args, &output)),
        }
    }

    async fn conflicted_files(&self) -> GitResult<Vec<String>> {
        let out = self.run(&["diff", "--name-only", "--diff-filter=U"]).await?;
        Ok(out.lines().map(str::to_string).collect())
    }
}

fn command_failed(args: &[&str], output: &Output) -> GitError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stderr = if stderr.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        stderr
    };
    GitError::CommandFailed {
        args: args.join(" "),
        stderr,
    }
}

fn parse_log(raw: &str) -> Vec<CommitSummary> {
    raw.split(RECORD_SEP)
        .map(|record| record.trim_start_matches('\n'))
        .filter(|record| !record.trim().is_empty())
        .filter_map(|record| {
            let mut fields = record.splitn(4, FIELD_SEP);
            let revision = fields.next()?.trim();
            let author = fields.next()?;
            let subject = fields.next()?;
            let message = fields.next().unwrap_or_default();
            Some(CommitSummary {
                revision: Revision::new(revision),
                author: author.to_string(),
                subject: subject.to_string(),
                message: message.trim_end().to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl GitClient for GitCli {
    async fn fetch(&self, remote: &str) -> GitResult<()> {
        self.run(&["fetch", "--prune", remote]).await.map(|_| ())
    }

    async fn checkout(&self, request: &CheckoutRequest) -> GitResult<()> {
        match &request.branch {
            Some(branch) => {
                let flag = if request.delete_if_exists { "-B" } else { "-b" };
                self.run(&["checkout", "-f", flag, branch, &request.start_point])
                    .await?;
            }
            None => {
                self.run(&["checkout", "-f", &request.start_point]).await?;
            }
        }
        Ok(())
    }

    async fn rev_parse(&self, rev: &str) -> GitResult<Revision> {
        let spec = format!("{rev}^{{commit}}");
        match self.run(&["rev-parse", "--verify", "--quiet", &spec]).await {
            Ok(sha) if !sha.is_empty() => Ok(Revision::new(sha)),
            _ => Err(GitError::UnknownRevision(rev.to_string())),
        }
    }

    async fn head(&self) -> GitResult<Revision> {
        self.rev_parse("HEAD").await
    }

    async fn commits_between(
        &self,
        base: &Revision,
        tip: &Revision,
    ) -> GitResult<Vec<CommitSummary>> {
        let range = format!("{base}..{tip}");
        let raw = self.run(&["log", LOG_FORMAT, &range]).await?;
        Ok(parse_log(&raw))
    }

    async fn commit_info(&self, rev: &Revision) -> GitResult<CommitSummary> {
        let raw = self.run(&["log", "-1", LOG_FORMAT, rev.as_str()]).await?;
        parse_log(&raw)
            .into_iter()
            .next()
            .ok_or_else(|| GitError::UnknownRevision(rev.to_string()))
    }

    async fn merge(&self, request: &MergeRequest) -> GitResult<()> {
        let rev = request.revision.as_str();
        let args: Vec<&str> = match &request.mode {
            MergeMode::Squash => vec!["merge", "--squash", rev],
            MergeMode::NoFastForward { message } => {
                vec!["merge", "--no-ff", "--no-edit", "-m", message, rev]
            }
        };
        let output = self.output(&args).await?;
        if output.status.success() {
            return Ok(());
        }
        let conflicts = self.conflicted_files().await.unwrap_or_default();
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !conflicts.is_empty() || stdout.contains("CONFLICT") {
            return Err(GitError::MergeConflict {
                revision: rev.to_string(),
                detail: if conflicts.is_empty() {
                    stdout.trim().to_string()
                } else {
                    conflicts.join(", ")
                },
            });
        }
        Err(command_failed(&args, &output))
    }

    async fn commit(&self, request: &CommitRequest) -> GitResult<Revision> {
        let author_arg = request.author.as_ref().map(|a| format!("--author={a}"));
        let mut args = vec!["commit", "--no-verify", "-m", request.message.as_str()];
        if let Some(author) = &author_arg {
            args.push(author);
        }
        let output = self.output(&args).await?;
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if stdout.contains("nothing to commit") || stdout.contains("nothing added to commit") {
                return Err(GitError::NothingToCommit);
            }
            return Err(command_failed(&args, &output));
        }
        self.head().await
    }

    async fn push(&self, request: &PushRequest) -> GitResult<()> {
        // Only fast-forwards from the expected tip are ever pushed.
        if !self
            .is_ancestor(&request.expected_tip, &request.new_tip)
            .await?
        {
            return Err(GitError::PushRejected {
                branch: request.branch.clone(),
                expected: request.expected_tip.to_string(),
                detail: format!(
                    "{} does not descend from {}",
                    request.new_tip, request.expected_tip
                ),
            });
        }
        let lease = format!(
            "--force-with-lease=refs/heads/{}:{}",
            request.branch, request.expected_tip
        );
        let refspec = format!("{}:refs/heads/{}", request.new_tip, request.branch);
        let args = [
            "push",
            "--porcelain",
            lease.as_str(),
            request.remote.as_str(),
            refspec.as_str(),
        ];
        let output = self.output(&args).await?;
        if output.status.success() {
            return Ok(());
        }
        let detail = format!(
            "{} {}",
            String::from_utf8_lossy(&output.stdout).trim(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
        if detail.contains("rejected") || detail.contains("stale info") {
            return Err(GitError::PushRejected {
                branch: request.branch.clone(),
                expected: request.expected_tip.to_string(),
                detail: detail.trim().to_string(),
            });
        }
        Err(command_failed(&args, &output))
    }

    async fn reset_hard(&self) -> GitResult<()> {
        self.run(&["reset", "--hard", "--quiet"]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "-q"]);
        run_git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/master"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "-q", "--allow-empty", "-m", "initial"]);
        dir
    }

    fn commit_file(repo: &Path, file: &str, content: &str, message: &str) -> String {
        std::fs::write(repo.join(file), content).unwrap();
        run_git(repo, &["add", file]);
        run_git(repo, &["commit", "-q", "-m", message]);
        run_git(repo, &["rev-parse", "HEAD"])
    }

    #[test]
    fn parse_log_reads_multiline_messages() {
        let raw = format!(
            "abc{FIELD_SEP}A <a@x>{FIELD_SEP}subject one{FIELD_SEP}subject one\n\nbody\n{RECORD_SEP}\ndef{FIELD_SEP}B <b@x>{FIELD_SEP}two{FIELD_SEP}two\n{RECORD_SEP}"
        );
        let commits = parse_log(&raw);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].revision.as_str(), "abc");
        assert_eq!(commits[0].message, "subject one\n\nbody");
        assert_eq!(commits[1].author, "B <b@x>");
        assert_eq!(commits[1].subject, "two");
    }

    #[tokio::test]
    async fn head_returns_40_hex_chars() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());
        let sha = git.head().await.unwrap();
        assert_eq!(sha.as_str().len(), 40, "SHA should be 40 hex chars, got: {sha}");
        assert!(sha.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn rev_parse_unknown_ref_fails() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());
        let err = git.rev_parse("no-such-branch").await.unwrap_err();
        assert!(matches!(err, GitError::UnknownRevision(_)));
    }

    #[tokio::test]
    async fn head_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new(dir.path());
        assert!(git.head().await.is_err());
    }

    #[tokio::test]
    async fn commits_between_lists_newest_first() {
        let repo = make_git_repo();
        let base = run_git(repo.path(), &["rev-parse", "HEAD"]);
        commit_file(repo.path(), "a.txt", "a", "add a");
        let tip = commit_file(repo.path(), "b.txt", "b", "add b");

        let git = GitCli::new(repo.path());
        let commits = git
            .commits_between(&Revision::new(base), &Revision::new(tip.clone()))
            .await
            .unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].revision.as_str(), tip);
        assert_eq!(commits[0].subject, "add b");
        assert_eq!(commits[1].subject, "add a");
        assert_eq!(commits[0].author, "test-user <test@example.com>");
    }

    #[tokio::test]
    async fn squash_merge_then_commit_creates_single_commit() {
        let repo = make_git_repo();
        let base = run_git(repo.path(), &["rev-parse", "HEAD"]);
        run_git(repo.path(), &["checkout", "-q", "-b", "feature"]);
        commit_file(repo.path(), "a.txt", "a", "add a");
        let feature = commit_file(repo.path(), "b.txt", "b", "add b");
        run_git(repo.path(), &["checkout", "-q", "master"]);

        let git = GitCli::new(repo.path());
        git.merge(&MergeRequest {
            revision: Revision::new(feature),
            mode: MergeMode::Squash,
        })
        .await
        .unwrap();
        let new_head = git
            .commit(&CommitRequest {
                message: "squashed".to_string(),
                author: Some("Someone <someone@example.com>".to_string()),
            })
            .await
            .unwrap();

        let parent = run_git(repo.path(), &["rev-parse", "HEAD^"]);
        assert_eq!(parent, base);
        let info = git.commit_info(&new_head).await.unwrap();
        assert_eq!(info.subject, "squashed");
        assert_eq!(info.author, "Someone <someone@example.com>");
        assert!(repo.path().join("b.txt").exists());
    }

    #[tokio::test]
    async fn conflicting_merge_reports_conflict() {
        let repo = make_git_repo();
        commit_file(repo.path(), "a.txt", "base", "base a");
        run_git(repo.path(), &["checkout", "-q", "-b", "feature"]);
        let feature = commit_file(repo.path(), "a.txt", "feature", "feature a");
        run_git(repo.path(), &["checkout", "-q", "master"]);
        commit_file(repo.path(), "a.txt", "master", "master a");

        let git = GitCli::new(repo.path());
        let err = git
            .merge(&MergeRequest {
                revision: Revision::new(feature),
                mode: MergeMode::Squash,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::MergeConflict { .. }), "got {err:?}");

        git.reset_hard().await.unwrap();
        let status = run_git(repo.path(), &["status", "--porcelain"]);
        assert!(status.is_empty(), "workspace should be clean: {status}");
    }

    #[tokio::test]
    async fn commit_with_nothing_staged_is_reported() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());
        let err = git
            .commit(&CommitRequest {
                message: "empty".to_string(),
                author: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::NothingToCommit), "got {err:?}");
    }

    #[tokio::test]
    async fn remotes_lists_configured_remotes() {
        let remote = tempfile::tempdir().unwrap();
        run_git(remote.path(), &["init", "-q", "--bare"]);
        let repo = make_git_repo();
        run_git(
            repo.path(),
            &["remote", "add", "origin", remote.path().to_str().unwrap()],
        );
        let git = GitCli::new(repo.path());
        assert_eq!(git.remotes().await.unwrap(), vec!["origin".to_string()]);
    }
}
