//! In-memory git fakes (testing only)
//!
//! `MemoryRemote` is a shared remote repository: a commit graph of full file
//! snapshots plus branch tips. `MemoryGit` is one local workspace cloned from
//! it that implements [`GitClient`], with fault injection for the failure
//! paths the orchestrator has to survive.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::domain::change::Revision;
use crate::git::{
    CheckoutRequest, CommitRequest, CommitSummary, GitClient, GitError, GitResult, MergeMode,
    MergeRequest, PushRequest,
};

/// File path → content.
pub type Tree = BTreeMap<String, String>;

const MERGE_AUTHOR: &str = "preint <preint@localhost>";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn failed(args: &str, stderr: &str) -> GitError {
    GitError::CommandFailed {
        args: args.to_string(),
        stderr: stderr.to_string(),
    }
}

#[derive(Debug, Clone)]
struct CommitNode {
    seq: u64,
    parents: Vec<Revision>,
    author: String,
    message: String,
    tree: Tree,
}

#[derive(Debug, Default)]
struct RemoteState {
    commits: HashMap<Revision, CommitNode>,
    branches: BTreeMap<String, Revision>,
    next_seq: u64,
    pushes: u64,
}

impl RemoteState {
    fn create_commit(&mut self, parents: Vec<Revision>, author: &str, message: &str, tree: Tree) -> Revision {
        self.next_seq += 1;
        let seq = self.next_seq;
        let digest = Sha256::digest(format!("commit-{seq}-{message}").as_bytes());
        let mut id = hex::encode(digest);
        id.truncate(40);
        let rev = Revision::new(id);
        self.commits.insert(
            rev.clone(),
            CommitNode {
                seq,
                parents,
                author: author.to_string(),
                message: message.to_string(),
                tree,
            },
        );
        rev
    }

    fn ancestors(&self, rev: &Revision) -> BTreeSet<Revision> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([rev.clone()]);
        while let Some(r) = queue.pop_front() {
            if !seen.insert(r.clone()) {
                continue;
            }
            if let Some(node) = self.commits.get(&r) {
                queue.extend(node.parents.iter().cloned());
            }
        }
        seen
    }

    fn is_ancestor(&self, ancestor: &Revision, descendant: &Revision) -> bool {
        self.ancestors(descendant).contains(ancestor)
    }

    /// Newest common ancestor by creation order.
    fn merge_base(&self, a: &Revision, b: &Revision) -> Option<Revision> {
        let theirs = self.ancestors(b);
        self.ancestors(a)
            .intersection(&theirs)
            .max_by_key(|r| self.commits.get(*r).map(|n| n.seq).unwrap_or_default())
            .cloned()
    }

    fn tree(&self, rev: &Revision) -> Tree {
        self.commits
            .get(rev)
            .map(|n| n.tree.clone())
            .unwrap_or_default()
    }

    fn summary(&self, rev: &Revision) -> Option<CommitSummary> {
        self.commits.get(rev).map(|n| CommitSummary {
            revision: rev.clone(),
            author: n.author.clone(),
            subject: n.message.lines().next().unwrap_or_default().to_string(),
            message: n.message.clone(),
        })
    }
}

/// Shared in-memory remote repository.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    name: String,
    state: Arc<Mutex<RemoteState>>,
}

impl MemoryRemote {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(RemoteState::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create `branch` with a root commit holding `files`.
    pub fn init_branch(&self, branch: &str, files: &[(&str, &str)]) -> Revision {
        let mut state = lock(&self.state);
        let tree: Tree = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        let rev = state.create_commit(vec![], "dev <dev@example.com>", "initial", tree);
        state.branches.insert(branch.to_string(), rev.clone());
        rev
    }

    /// Point a new branch at `from`.
    pub fn create_branch(&self, branch: &str, from: &Revision) {
        lock(&self.state)
            .branches
            .insert(branch.to_string(), from.clone());
    }

    /// Delete `branch` on the remote; its commits stay in the graph.
    pub fn delete_branch(&self, branch: &str) {
        lock(&self.state).branches.remove(branch);
    }

    /// Commit `files` on top of `branch`, as another developer pushing would.
    pub fn commit_on(&self, branch: &str, files: &[(&str, &str)], message: &str) -> Revision {
        let mut state = lock(&self.state);
        let parent = state.branches.get(branch).cloned();
        let mut tree = parent.as_ref().map(|p| state.tree(p)).unwrap_or_default();
        for (path, content) in files {
            tree.insert(path.to_string(), content.to_string());
        }
        let rev = state.create_commit(
            parent.into_iter().collect(),
            "dev <dev@example.com>",
            message,
            tree,
        );
        state.branches.insert(branch.to_string(), rev.clone());
        rev
    }

    pub fn tip(&self, branch: &str) -> Option<Revision> {
        lock(&self.state).branches.get(branch).cloned()
    }

    pub fn tree(&self, rev: &Revision) -> Tree {
        lock(&self.state).tree(rev)
    }

    pub fn parents(&self, rev: &Revision) -> Vec<Revision> {
        lock(&self.state)
            .commits
            .get(rev)
            .map(|n| n.parents.clone())
            .unwrap_or_default()
    }

    pub fn commit_summary(&self, rev: &Revision) -> Option<CommitSummary> {
        lock(&self.state).summary(rev)
    }

    pub fn is_ancestor(&self, ancestor: &Revision, descendant: &Revision) -> bool {
        lock(&self.state).is_ancestor(ancestor, descendant)
    }

    /// Number of accepted pushes.
    pub fn push_count(&self) -> u64 {
        lock(&self.state).pushes
    }

    /// A fresh local workspace cloned from this remote.
    pub fn workspace(&self) -> MemoryGit {
        MemoryGit::new(self.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Head {
    Unborn,
    Branch(String),
    Detached(Revision),
}

#[derive(Debug)]
struct LocalState {
    tracking: BTreeMap<String, Revision>,
    branches: BTreeMap<String, Revision>,
    head: Head,
    staged: Option<Tree>,
    operations: Vec<String>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_fetch: bool,
    fail_checkout_of: Option<String>,
    race_before_push: Option<(String, Vec<(String, String)>)>,
}

/// One local workspace over a [`MemoryRemote`].
#[derive(Debug)]
pub struct MemoryGit {
    remote: MemoryRemote,
    local: Mutex<LocalState>,
    faults: Mutex<Faults>,
}

impl MemoryGit {
    pub fn new(remote: MemoryRemote) -> Self {
        Self {
            remote,
            local: Mutex::new(LocalState {
                tracking: BTreeMap::new(),
                branches: BTreeMap::new(),
                head: Head::Unborn,
                staged: None,
                operations: Vec::new(),
            }),
            faults: Mutex::new(Faults::default()),
        }
    }

    pub fn remote(&self) -> &MemoryRemote {
        &self.remote
    }

    /// Make every fetch fail.
    pub fn fail_fetch(self) -> Self {
        lock(&self.faults).fail_fetch = true;
        self
    }

    /// Make checkouts of `start_point` fail.
    pub fn fail_checkout_of(self, start_point: impl Into<String>) -> Self {
        lock(&self.faults).fail_checkout_of = Some(start_point.into());
        self
    }

    /// Just before the next push, another party commits `files` on `branch`
    /// of the remote.
    pub fn race_before_push(self, branch: &str, files: &[(&str, &str)]) -> Self {
        lock(&self.faults).race_before_push = Some((
            branch.to_string(),
            files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
        ));
        self
    }

    /// Operations performed so far, in order (`fetch origin`, `checkout ...`).
    pub fn operations(&self) -> Vec<String> {
        lock(&self.local).operations.clone()
    }

    /// Name of the checked-out branch, if any.
    pub fn current_branch(&self) -> Option<String> {
        match &lock(&self.local).head {
            Head::Branch(b) => Some(b.clone()),
            _ => None,
        }
    }

    /// Whether a squash is staged but not committed.
    pub fn has_staged_changes(&self) -> bool {
        lock(&self.local).staged.is_some()
    }

    fn record(&self, op: String) {
        lock(&self.local).operations.push(op);
    }

    fn resolve(&self, name: &str) -> Option<Revision> {
        let local = lock(&self.local);
        if name == "HEAD" {
            return match &local.head {
                Head::Unborn => None,
                Head::Branch(b) => local.branches.get(b).cloned(),
                Head::Detached(r) => Some(r.clone()),
            };
        }
        if let Some(r) = local.tracking.get(name) {
            return Some(r.clone());
        }
        if let Some(r) = local.branches.get(name) {
            return Some(r.clone());
        }
        drop(local);
        let rev = Revision::new(name);
        lock(&self.remote.state)
            .commits
            .contains_key(&rev)
            .then_some(rev)
    }

    fn advance_head(&self, rev: Revision) {
        let mut local = lock(&self.local);
        match local.head.clone() {
            Head::Branch(b) => {
                local.branches.insert(b, rev);
            }
            Head::Detached(_) | Head::Unborn => local.head = Head::Detached(rev),
        }
    }
}

#[async_trait]
impl GitClient for MemoryGit {
    async fn fetch(&self, remote: &str) -> GitResult<()> {
        self.record(format!("fetch {remote}"));
        if lock(&self.faults).fail_fetch {
            return Err(failed("fetch", "fatal: unable to access remote"));
        }
        if remote != self.remote.name {
            return Err(failed(
                "fetch",
                &format!("fatal: '{remote}' does not appear to be a git repository"),
            ));
        }
        let branches = lock(&self.remote.state).branches.clone();
        let mut local = lock(&self.local);
        local.tracking = branches
            .into_iter()
            .map(|(b, r)| (format!("{remote}/{b}"), r))
            .collect();
        Ok(())
    }

    async fn checkout(&self, request: &CheckoutRequest) -> GitResult<()> {
        self.record(match &request.branch {
            Some(b) => format!("checkout -B {b} {}", request.start_point),
            None => format!("checkout {}", request.start_point),
        });
        if lock(&self.faults).fail_checkout_of.as_deref() == Some(request.start_point.as_str()) {
            return Err(failed("checkout", "error: unable to unlink old file"));
        }
        let rev = self.resolve(&request.start_point).ok_or_else(|| {
            failed(
                "checkout",
                &format!("fatal: invalid reference: {}", request.start_point),
            )
        })?;
        let mut local = lock(&self.local);
        match &request.branch {
            Some(branch) => {
                if local.branches.contains_key(branch) && !request.delete_if_exists {
                    return Err(failed(
                        "checkout",
                        &format!("fatal: a branch named '{branch}' already exists"),
                    ));
                }
                local.branches.insert(branch.clone(), rev);
                local.head = Head::Branch(branch.clone());
            }
            None => local.head = Head::Detached(rev),
        }
        local.staged = None;
        Ok(())
    }

    async fn rev_parse(&self, rev: &str) -> GitResult<Revision> {
        self.resolve(rev)
            .ok_or_else(|| GitError::UnknownRevision(rev.to_string()))
    }

    async fn head(&self) -> GitResult<Revision> {
        self.rev_parse("HEAD").await
    }

    async fn commits_between(
        &self,
        base: &Revision,
        tip: &Revision,
    ) -> GitResult<Vec<CommitSummary>> {
        let state = lock(&self.remote.state);
        if !state.commits.contains_key(tip) {
            return Err(GitError::UnknownRevision(tip.to_string()));
        }
        let excluded = state.ancestors(base);
        let mut pending: Vec<(u64, Revision)> = state
            .ancestors(tip)
            .into_iter()
            .filter(|r| !excluded.contains(r))
            .filter_map(|r| state.commits.get(&r).map(|n| (n.seq, r.clone())))
            .collect();
        pending.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(pending
            .into_iter()
            .filter_map(|(_, r)| state.summary(&r))
            .collect())
    }

    async fn commit_info(&self, rev: &Revision) -> GitResult<CommitSummary> {
        lock(&self.remote.state)
            .summary(rev)
            .ok_or_else(|| GitError::UnknownRevision(rev.to_string()))
    }

    async fn merge(&self, request: &MergeRequest) -> GitResult<()> {
        self.record(match &request.mode {
            MergeMode::Squash => format!("merge --squash {}", request.revision),
            MergeMode::NoFastForward { .. } => format!("merge --no-ff {}", request.revision),
        });
        let head = self
            .resolve("HEAD")
            .ok_or_else(|| failed("merge", "fatal: no HEAD"))?;
        let other = &request.revision;

        let mut state = lock(&self.remote.state);
        if !state.commits.contains_key(other) {
            return Err(GitError::UnknownRevision(other.to_string()));
        }
        if state.is_ancestor(other, &head) {
            // Already up to date.
            drop(state);
            if request.mode == MergeMode::Squash {
                let tree = lock(&self.remote.state).tree(&head);
                lock(&self.local).staged = Some(tree);
            }
            return Ok(());
        }

        let base = state
            .merge_base(&head, other)
            .map(|b| state.tree(&b))
            .unwrap_or_default();
        let ours = state.tree(&head);
        let theirs = state.tree(other);

        let paths: BTreeSet<&String> = base.keys().chain(ours.keys()).chain(theirs.keys()).collect();
        let mut merged = Tree::new();
        let mut conflicts = Vec::new();
        for path in paths {
            let (b, o, t) = (base.get(path), ours.get(path), theirs.get(path));
            let pick = if o == t || t == b {
                o
            } else if o == b {
                t
            } else {
                conflicts.push(path.clone());
                continue;
            };
            if let Some(content) = pick {
                merged.insert(path.clone(), content.clone());
            }
        }
        if !conflicts.is_empty() {
            return Err(GitError::MergeConflict {
                revision: other.to_string(),
                detail: conflicts.join(", "),
            });
        }

        match &request.mode {
            MergeMode::Squash => {
                drop(state);
                lock(&self.local).staged = Some(merged);
            }
            MergeMode::NoFastForward { message } => {
                let rev = state.create_commit(
                    vec![head, other.clone()],
                    MERGE_AUTHOR,
                    message,
                    merged,
                );
                drop(state);
                self.advance_head(rev);
            }
        }
        Ok(())
    }

    async fn commit(&self, request: &CommitRequest) -> GitResult<Revision> {
        self.record("commit".to_string());
        let head = self
            .resolve("HEAD")
            .ok_or_else(|| failed("commit", "fatal: no HEAD"))?;
        let staged = lock(&self.local).staged.take();
        let mut state = lock(&self.remote.state);
        let tree = match staged {
            Some(tree) if tree != state.tree(&head) => tree,
            _ => return Err(GitError::NothingToCommit),
        };
        let author = request.author.as_deref().unwrap_or(MERGE_AUTHOR);
        let rev = state.create_commit(vec![head], author, &request.message, tree);
        drop(state);
        self.advance_head(rev.clone());
        Ok(rev)
    }

    async fn push(&self, request: &PushRequest) -> GitResult<()> {
        self.record(format!(
            "push {} {}:{}",
            request.remote, request.new_tip, request.branch
        ));
        let race = lock(&self.faults).race_before_push.take();
        if let Some((branch, files)) = race {
            let files: Vec<(&str, &str)> = files
                .iter()
                .map(|(p, c)| (p.as_str(), c.as_str()))
                .collect();
            self.remote.commit_on(&branch, &files, "concurrent integration");
        }

        let mut state = lock(&self.remote.state);
        if !state.is_ancestor(&request.expected_tip, &request.new_tip) {
            return Err(GitError::PushRejected {
                branch: request.branch.clone(),
                expected: request.expected_tip.to_string(),
                detail: "new tip does not descend from expected tip".to_string(),
            });
        }
        let current = state.branches.get(&request.branch).cloned();
        if current.as_ref() != Some(&request.expected_tip) {
            return Err(GitError::PushRejected {
                branch: request.branch.clone(),
                expected: request.expected_tip.to_string(),
                detail: "! [rejected] (stale info)".to_string(),
            });
        }
        state
            .branches
            .insert(request.branch.clone(), request.new_tip.clone());
        state.pushes += 1;
        drop(state);
        lock(&self.local).tracking.insert(
            format!("{}/{}", request.remote, request.branch),
            request.new_tip.clone(),
        );
        Ok(())
    }

    async fn reset_hard(&self) -> GitResult<()> {
        self.record("reset --hard".to_string());
        lock(&self.local).staged = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_and_checkout_track_remote() {
        let remote = MemoryRemote::new("origin");
        let r0 = remote.init_branch("master", &[("README", "hello")]);
        let git = remote.workspace();
        git.fetch("origin").await.unwrap();
        git.checkout(&CheckoutRequest::branch("master", "origin/master"))
            .await
            .unwrap();
        assert_eq!(git.head().await.unwrap(), r0);
        assert_eq!(git.current_branch().as_deref(), Some("master"));
    }

    #[tokio::test]
    async fn squash_merge_and_commit_combine_trees() {
        let remote = MemoryRemote::new("origin");
        let r0 = remote.init_branch("master", &[("README", "hello")]);
        remote.create_branch("feature", &r0);
        remote.commit_on("feature", &[("a.txt", "a")], "add a");
        let tip = remote.commit_on("feature", &[("b.txt", "b")], "add b");

        let git = remote.workspace();
        git.fetch("origin").await.unwrap();
        git.checkout(&CheckoutRequest::branch("master", "origin/master"))
            .await
            .unwrap();
        let pending = git.commits_between(&r0, &tip).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].subject, "add b");

        git.merge(&MergeRequest {
            revision: tip,
            mode: MergeMode::Squash,
        })
        .await
        .unwrap();
        let r1 = git
            .commit(&CommitRequest {
                message: "squashed".to_string(),
                author: None,
            })
            .await
            .unwrap();
        assert_eq!(remote.parents(&r1), vec![r0]);
        let tree = remote.tree(&r1);
        assert_eq!(tree.get("a.txt").map(String::as_str), Some("a"));
        assert_eq!(tree.get("b.txt").map(String::as_str), Some("b"));
    }

    #[tokio::test]
    async fn diverging_edits_conflict() {
        let remote = MemoryRemote::new("origin");
        let r0 = remote.init_branch("master", &[("a.txt", "base")]);
        remote.create_branch("feature", &r0);
        let tip = remote.commit_on("feature", &[("a.txt", "feature")], "edit a");
        remote.commit_on("master", &[("a.txt", "master")], "edit a too");

        let git = remote.workspace();
        git.fetch("origin").await.unwrap();
        git.checkout(&CheckoutRequest::branch("master", "origin/master"))
            .await
            .unwrap();
        let err = git
            .merge(&MergeRequest {
                revision: tip,
                mode: MergeMode::Squash,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::MergeConflict { .. }));
    }

    #[tokio::test]
    async fn push_is_conditional_on_expected_tip() {
        let remote = MemoryRemote::new("origin");
        let r0 = remote.init_branch("master", &[("a.txt", "a")]);
        let git = remote.workspace();
        git.fetch("origin").await.unwrap();
        git.checkout(&CheckoutRequest::branch("master", "origin/master"))
            .await
            .unwrap();
        let mine = {
            lock(&git.local).staged = Some(Tree::from([("b.txt".to_string(), "b".to_string())]));
            git.commit(&CommitRequest {
                message: "mine".to_string(),
                author: None,
            })
            .await
            .unwrap()
        };

        let theirs = remote.commit_on("master", &[("c.txt", "c")], "theirs");
        let err = git
            .push(&PushRequest {
                remote: "origin".to_string(),
                branch: "master".to_string(),
                expected_tip: r0,
                new_tip: mine,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::PushRejected { .. }));
        assert_eq!(remote.tip("master"), Some(theirs));
        assert_eq!(remote.push_count(), 0);
    }

    #[tokio::test]
    async fn fetch_prunes_deleted_branches() {
        let remote = MemoryRemote::new("origin");
        let r0 = remote.init_branch("master", &[]);
        remote.create_branch("feature/x", &r0);
        let git = remote.workspace();
        git.fetch("origin").await.unwrap();
        assert_eq!(git.rev_parse("origin/feature/x").await.unwrap(), r0);

        remote.delete_branch("feature/x");
        git.fetch("origin").await.unwrap();
        assert!(matches!(
            git.rev_parse("origin/feature/x").await,
            Err(GitError::UnknownRevision(_))
        ));
        assert_eq!(git.rev_parse(r0.as_str()).await.unwrap(), r0);
    }

    #[tokio::test]
    async fn fetch_unknown_remote_fails() {
        let remote = MemoryRemote::new("origin");
        remote.init_branch("master", &[]);
        let git = remote.workspace();
        assert!(git.fetch("upstream").await.is_err());
    }
}
