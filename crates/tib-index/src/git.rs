//! Source-control collaborator for incremental reindexing.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use git2::{Commit, Delta, DiffFindOptions, Repository, Sort, Tree};

use crate::error::Result;

/// Paths touched between a base revision and the current head.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Added, modified or renamed-to paths.
    pub changed: Vec<String>,
    /// Deleted or renamed-from paths.
    pub deleted: Vec<String>,
}

/// Blocking port over a version-control system. Paths are repository-relative
/// with `/` separators.
pub trait SourceControl: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the repository cannot be read.
    fn changed_files(&self, repo_path: &Path, since: Option<&str>) -> Result<Vec<String>>;

    /// # Errors
    ///
    /// Returns an error if the repository cannot be read.
    fn deleted_files(&self, repo_path: &Path, since: Option<&str>) -> Result<Vec<String>>;

    /// # Errors
    ///
    /// Returns an error if the head cannot be resolved.
    fn head_commit(&self, repo_path: &Path) -> Result<String>;

    /// Both sets from one diff when the backend can do that.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be read.
    fn changes(&self, repo_path: &Path, since: Option<&str>) -> Result<ChangeSet> {
        Ok(ChangeSet {
            changed: self.changed_files(repo_path, since)?,
            deleted: self.deleted_files(repo_path, since)?,
        })
    }
}

/// `git2`-backed source control.
#[derive(Debug, Clone)]
pub struct GitSourceControl {
    branch: Option<String>,
    lookback: Duration,
}

impl GitSourceControl {
    #[must_use]
    pub fn new(branch: Option<String>, lookback: Duration) -> Self {
        Self { branch, lookback }
    }

    fn head<'r>(&self, repo: &'r Repository) -> Result<Commit<'r>> {
        if let Some(branch) = self.branch.as_deref() {
            match repo
                .find_reference(&format!("refs/heads/{branch}"))
                .and_then(|r| r.peel_to_commit())
            {
                Ok(commit) => return Ok(commit),
                Err(e) => {
                    tracing::warn!(branch, error = %e, "branch not found, using HEAD");
                }
            }
        }
        Ok(repo.head()?.peel_to_commit()?)
    }

    /// Tree to diff against: the checkpoint commit when it resolves, otherwise
    /// the newest commit older than the lookback window. `None` is the empty
    /// tree, so everything at head counts as changed.
    fn base_tree<'r>(
        &self,
        repo: &'r Repository,
        head: &Commit<'r>,
        since: Option<&str>,
    ) -> Result<Option<Tree<'r>>> {
        if let Some(sha) = since {
            match repo.revparse_single(sha).and_then(|o| o.peel_to_commit()) {
                Ok(commit) => return Ok(Some(commit.tree()?)),
                Err(e) => {
                    tracing::warn!(
                        checkpoint = sha,
                        error = %e,
                        "checkpoint unresolvable, using lookback window"
                    );
                }
            }
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
        let lookback = i64::try_from(self.lookback.as_secs()).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub(lookback);

        let mut walk = repo.revwalk()?;
        walk.set_sorting(Sort::TIME)?;
        walk.push(head.id())?;
        for oid in walk {
            let commit = repo.find_commit(oid?)?;
            if commit.time().seconds() < cutoff {
                return Ok(Some(commit.tree()?));
            }
        }
        Ok(None)
    }

    fn diff(&self, repo_path: &Path, since: Option<&str>) -> Result<ChangeSet> {
        let repo = Repository::open(repo_path)?;
        let head = self.head(&repo)?;
        let head_tree = head.tree()?;
        let base = self.base_tree(&repo, &head, since)?;

        let mut diff = repo.diff_tree_to_tree(base.as_ref(), Some(&head_tree), None)?;
        diff.find_similar(Some(DiffFindOptions::new().renames(true)))?;

        let mut changes = ChangeSet::default();
        for delta in diff.deltas() {
            let old = delta.old_file().path().map(path_string);
            let new = delta.new_file().path().map(path_string);
            match delta.status() {
                Delta::Added | Delta::Modified | Delta::Copied | Delta::Typechange => {
                    changes.changed.extend(new);
                }
                Delta::Deleted => changes.deleted.extend(old),
                Delta::Renamed => {
                    changes.deleted.extend(old);
                    changes.changed.extend(new);
                }
                _ => {}
            }
        }
        changes.changed.sort();
        changes.deleted.sort();
        tracing::debug!(
            repo = %repo_path.display(),
            changed = changes.changed.len(),
            deleted = changes.deleted.len(),
            "computed diff"
        );
        Ok(changes)
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

impl SourceControl for GitSourceControl {
    fn changed_files(&self, repo_path: &Path, since: Option<&str>) -> Result<Vec<String>> {
        Ok(self.diff(repo_path, since)?.changed)
    }

    fn deleted_files(&self, repo_path: &Path, since: Option<&str>) -> Result<Vec<String>> {
        Ok(self.diff(repo_path, since)?.deleted)
    }

    fn head_commit(&self, repo_path: &Path) -> Result<String> {
        let repo = Repository::open(repo_path)?;
        Ok(self.head(&repo)?.id().to_string())
    }

    fn changes(&self, repo_path: &Path, since: Option<&str>) -> Result<ChangeSet> {
        self.diff(repo_path, since)
    }
}

#[cfg(test)]
mod tests {
    use git2::{Oid, Signature, Time};

    use super::*;

    const DAY: Duration = Duration::from_secs(86_400);

    fn commit_all(repo: &Repository, message: &str, when: Option<i64>) -> Oid {
        let sig = match when {
            Some(secs) => Signature::new("Test User", "test@example.com", &Time::new(secs, 0)),
            None => Signature::now("Test User", "test@example.com"),
        }
        .unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.update_all(["*"].iter(), None).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    fn write(root: &Path, rel: &str, body: &str) {
        let full = root.join(rel);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, body).unwrap();
    }

    #[test]
    fn diff_since_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let repo = Repository::init(root).unwrap();
        write(root, "src/X.java", "class X {}");
        write(root, "src/Y.java", "class Y {}");
        write(root, "src/Old.java", "class Old { int keep = 1; int more = 2; }");
        let first = commit_all(&repo, "initial", None);

        write(root, "src/X.java", "class X { int v; }");
        std::fs::remove_file(root.join("src/Y.java")).unwrap();
        std::fs::rename(root.join("src/Old.java"), root.join("src/New.java")).unwrap();
        write(root, "src/Z.java", "class Z {}");
        let second = commit_all(&repo, "change", None);

        let scm = GitSourceControl::new(None, DAY);
        let changes = scm.changes(root, Some(&first.to_string())).unwrap();
        assert_eq!(changes.changed, vec!["src/New.java", "src/X.java", "src/Z.java"]);
        assert_eq!(changes.deleted, vec!["src/Old.java", "src/Y.java"]);
        assert_eq!(scm.head_commit(root).unwrap(), second.to_string());
        assert_eq!(
            scm.changed_files(root, Some(&first.to_string())).unwrap(),
            changes.changed
        );
    }

    #[test]
    fn no_checkpoint_young_history_diffs_against_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let repo = Repository::init(root).unwrap();
        write(root, "a.ts", "export const a = 1;");
        commit_all(&repo, "initial", None);

        let scm = GitSourceControl::new(None, DAY);
        let changes = scm.changes(root, None).unwrap();
        assert_eq!(changes.changed, vec!["a.ts"]);
        assert!(changes.deleted.is_empty());
    }

    #[test]
    fn no_checkpoint_uses_lookback_window() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let repo = Repository::init(root).unwrap();
        let now = i64::try_from(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_secs(),
        )
        .unwrap();
        write(root, "old.ts", "export const old = 1;");
        commit_all(&repo, "old", Some(now - 3 * 86_400));
        write(root, "fresh.ts", "export const fresh = 1;");
        commit_all(&repo, "fresh", None);

        let scm = GitSourceControl::new(None, DAY);
        assert_eq!(scm.changed_files(root, None).unwrap(), vec!["fresh.ts"]);
    }

    #[test]
    fn unresolvable_checkpoint_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let repo = Repository::init(root).unwrap();
        write(root, "a.py", "x = 1\n");
        commit_all(&repo, "initial", None);

        let scm = GitSourceControl::new(None, DAY);
        let changed = scm.changed_files(root, Some("abc123")).unwrap();
        assert_eq!(changed, vec!["a.py"]);
    }

    #[test]
    fn missing_repository_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let scm = GitSourceControl::new(None, DAY);
        assert!(scm.head_commit(dir.path()).is_err());
    }
}
