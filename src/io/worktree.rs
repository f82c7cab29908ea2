//! Isolated git worktrees for parallel groups.
//!
//! The manager owns a root directory (default `<cwd>/.ralphy/worktrees`),
//! every worktree it allocates, and every branch it created. Cleanup can
//! preserve dirty worktrees for inspection; retained records stay on the
//! list so a later cleanup can finish the job.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::task::{slug, unique_name};
use crate::io::git::Git;

/// One allocated worktree.
#[derive(Debug, Clone)]
pub struct Worktree {
    pub group: String,
    pub branch: String,
    pub path: PathBuf,
    pub task_source_path: Option<PathBuf>,
    /// Where the task source was copied to inside the worktree.
    pub copied_task_source: Option<PathBuf>,
}

/// Options for [`WorktreeManager::cleanup`].
#[derive(Debug, Clone, Copy)]
pub struct CleanupOptions {
    /// Delete the branches the manager created (default true).
    pub remove_branches: bool,
    /// Keep worktrees with uncommitted changes.
    pub preserve_dirty: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            remove_branches: true,
            preserve_dirty: false,
        }
    }
}

pub struct WorktreeManager {
    git: Git,
    repo_root: PathBuf,
    root: PathBuf,
    default_base: Option<String>,
    records: Vec<Worktree>,
}

impl WorktreeManager {
    pub fn new(repo_root: impl Into<PathBuf>, root: Option<PathBuf>, default_base: Option<String>) -> Self {
        let repo_root = repo_root.into();
        let root = root.unwrap_or_else(|| repo_root.join(".ralphy").join("worktrees"));
        Self {
            git: Git::new(&repo_root),
            repo_root,
            root,
            default_base,
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[Worktree] {
        &self.records
    }

    /// Allocate a worktree for `group` on a fresh `ralphy/parallel/<slug>`
    /// branch, copying `task_source` into it when given.
    #[instrument(skip_all, fields(group))]
    pub async fn allocate(
        &mut self,
        group: &str,
        base: Option<&str>,
        task_source: Option<&Path>,
    ) -> Result<Worktree> {
        let base = match base.or(self.default_base.as_deref()) {
            Some(base) => base.to_string(),
            None => self.git.current_branch().await?,
        };

        let taken = self.git.branch_list().await?;
        let branch = unique_name(&format!("ralphy/parallel/{}", slug(group)), &taken);

        fs::create_dir_all(&self.root)
            .with_context(|| format!("create worktree root {}", self.root.display()))?;
        let path = unique_path(&self.root, &slug(group));

        self.git.worktree_add(&branch, &path, &base).await?;
        debug!(branch = %branch, path = %path.display(), "allocated worktree");

        let copied_task_source = match task_source {
            Some(source) => Some(self.copy_task_source(source, &path)?),
            None => None,
        };

        let record = Worktree {
            group: group.to_string(),
            branch,
            path,
            task_source_path: task_source.map(Path::to_path_buf),
            copied_task_source,
        };
        self.records.push(record.clone());
        Ok(record)
    }

    /// Copy the task source into the worktree at its repo-relative location
    /// (or its basename when it lives outside the repo).
    fn copy_task_source(&self, source: &Path, worktree: &Path) -> Result<PathBuf> {
        let relative = source
            .strip_prefix(&self.repo_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(source.file_name().unwrap_or(source.as_os_str())));
        let dest = worktree.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::copy(source, &dest).with_context(|| {
            format!("copy {} to {}", source.display(), dest.display())
        })?;
        Ok(dest)
    }

    /// Remove every recorded worktree (and, by default, its branch).
    ///
    /// With `preserve_dirty`, worktrees holding uncommitted changes are kept
    /// and remain recorded. Errors are collected and reported together after
    /// the pass so one stuck worktree doesn't strand the rest.
    #[instrument(skip_all)]
    pub async fn cleanup(&mut self, options: CleanupOptions) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();
        let mut retained: Vec<Worktree> = Vec::new();

        for record in std::mem::take(&mut self.records) {
            if options.preserve_dirty {
                match Git::new(&record.path).is_dirty().await {
                    Ok(true) => {
                        warn!(path = %record.path.display(), "preserving dirty worktree");
                        retained.push(record);
                        continue;
                    }
                    Ok(false) => {}
                    Err(err) => {
                        errors.push(err.to_string());
                        retained.push(record);
                        continue;
                    }
                }
            }

            if let Err(err) = self.git.worktree_remove(&record.path).await {
                errors.push(err.to_string());
                retained.push(record);
                continue;
            }
            if options.remove_branches {
                if let Err(err) = self.git.delete_branch(&record.branch, true).await {
                    errors.push(err.to_string());
                }
            }
        }

        self.records = retained;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("worktree cleanup failed: {}", errors.join("; ")))
        }
    }
}

fn unique_path(root: &Path, name: &str) -> PathBuf {
    let candidate = root.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let mut n = 2usize;
    loop {
        let candidate = root.join(format!("{name}-{n}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[tokio::test]
    async fn allocates_worktree_with_copied_source_and_cleans_up() {
        let repo = TestRepo::new().expect("repo");
        repo.write("PRD.md", "- [ ] A\n");
        repo.commit_all("add backlog");

        let mut manager = WorktreeManager::new(repo.root(), None, None);
        let source = repo.root().join("PRD.md");
        let record = manager
            .allocate("1", None, Some(&source))
            .await
            .expect("allocate");

        assert_eq!(record.branch, "ralphy/parallel/1");
        assert!(record.path.starts_with(repo.root().join(".ralphy/worktrees")));
        let copied = record.copied_task_source.clone().expect("copied");
        assert_eq!(copied, record.path.join("PRD.md"));
        assert!(copied.exists());

        manager.cleanup(CleanupOptions::default()).await.expect("cleanup");
        assert!(!record.path.exists());
        assert!(manager.records().is_empty());

        let git = Git::new(repo.root());
        assert!(
            !git.branch_list()
                .await
                .expect("list")
                .contains(&"ralphy/parallel/1".to_string())
        );
    }

    #[tokio::test]
    async fn same_group_twice_gets_distinct_branch_and_path() {
        let repo = TestRepo::new().expect("repo");
        let mut manager = WorktreeManager::new(repo.root(), None, None);

        let first = manager.allocate("api", None, None).await.expect("first");
        let second = manager.allocate("api", None, None).await.expect("second");
        assert_eq!(first.branch, "ralphy/parallel/api");
        assert_eq!(second.branch, "ralphy/parallel/api-2");
        assert_ne!(first.path, second.path);

        manager.cleanup(CleanupOptions::default()).await.expect("cleanup");
    }

    #[tokio::test]
    async fn preserve_dirty_retains_worktree_and_record() {
        let repo = TestRepo::new().expect("repo");
        let mut manager = WorktreeManager::new(repo.root(), None, None);
        let record = manager.allocate("wip", None, None).await.expect("allocate");
        fs::write(record.path.join("untracked.txt"), "dirty").expect("write");

        manager
            .cleanup(CleanupOptions {
                remove_branches: false,
                preserve_dirty: true,
            })
            .await
            .expect("cleanup");
        assert!(record.path.exists());
        assert_eq!(manager.records().len(), 1);

        // A later unconditional cleanup finishes the job.
        manager.cleanup(CleanupOptions::default()).await.expect("cleanup");
        assert!(!record.path.exists());
    }
}
