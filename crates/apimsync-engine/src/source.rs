//! File sources
//!
//! The publisher reads trees through a narrow seam so the same traversal
//! works against the working directory and against a named git commit.
//! Paths on the trait are always absolute; the git implementation maps them
//! onto repository-relative paths internally.

use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{EngineError, EngineResult};

/// Read-only view of a service directory tree.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Contents of a file, or `None` when it does not exist in this view.
    async fn read_file(&self, path: &Path) -> EngineResult<Option<Vec<u8>>>;

    /// Every file under the service directory, as absolute paths.
    async fn service_files(&self) -> EngineResult<Vec<PathBuf>>;
}

/// View over the live filesystem.
pub struct LiveFileSource {
    service_dir: PathBuf,
}

impl LiveFileSource {
    pub fn new(service_dir: impl Into<PathBuf>) -> Self {
        Self {
            service_dir: service_dir.into(),
        }
    }
}

#[async_trait]
impl FileSource for LiveFileSource {
    async fn read_file(&self, path: &Path) -> EngineResult<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::io(path.display().to_string(), e)),
        }
    }

    async fn service_files(&self) -> EngineResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![self.service_dir.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(EngineError::io(dir.display().to_string(), e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| EngineError::io(dir.display().to_string(), e))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| EngineError::io(entry.path().display().to_string(), e))?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    files.push(entry.path());
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

/// View over a named commit of the repository containing the service
/// directory. All reads go through `git show`/`git ls-tree`.
pub struct GitCommitFileSource {
    repo_root: PathBuf,
    service_dir: PathBuf,
    commit: String,
}

impl GitCommitFileSource {
    /// Open the repository containing `service_dir` at `commit`.
    pub async fn open(service_dir: impl Into<PathBuf>, commit: impl Into<String>) -> EngineResult<Self> {
        let service_dir = service_dir.into();
        let output = run_git(&service_dir, &["rev-parse", "--show-toplevel"]).await?;
        let repo_root = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
        Ok(Self {
            repo_root,
            service_dir,
            commit: commit.into(),
        })
    }

    /// View of the same tree at this commit's first parent.
    pub fn parent(&self) -> Self {
        Self {
            repo_root: self.repo_root.clone(),
            service_dir: self.service_dir.clone(),
            commit: format!("{}^", self.commit),
        }
    }

    fn relative(&self, path: &Path) -> EngineResult<String> {
        path.strip_prefix(&self.repo_root)
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            .map_err(|_| {
                EngineError::git(format!(
                    "'{}' is outside repository '{}'",
                    path.display(),
                    self.repo_root.display()
                ))
            })
    }
}

#[async_trait]
impl FileSource for GitCommitFileSource {
    async fn read_file(&self, path: &Path) -> EngineResult<Option<Vec<u8>>> {
        let spec = format!("{}:{}", self.commit, self.relative(path)?);
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo_root)
            .args(["show", &spec])
            .output()
            .await
            .map_err(|e| EngineError::git(format!("cannot spawn git: {e}")))?;
        if output.status.success() {
            Ok(Some(output.stdout))
        } else {
            // absent path in this commit
            Ok(None)
        }
    }

    async fn service_files(&self) -> EngineResult<Vec<PathBuf>> {
        let prefix = self.relative(&self.service_dir)?;
        let output = run_git(
            &self.repo_root,
            &["ls-tree", "-r", "--name-only", &self.commit, "--", &prefix],
        )
        .await?;
        let mut files: Vec<PathBuf> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| self.repo_root.join(line))
            .collect();
        files.sort();
        Ok(files)
    }
}

/// How a commit touched a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
}

/// A file touched by a commit, as an absolute path.
#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub status: ChangeStatus,
    pub path: PathBuf,
}

/// Files changed by `commit` relative to its first parent.
pub async fn changed_files(
    service_dir: &Path,
    commit: &str,
) -> EngineResult<Vec<ChangedFile>> {
    let output = run_git(service_dir, &["rev-parse", "--show-toplevel"]).await?;
    let repo_root = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());

    let output = run_git(
        &repo_root,
        &[
            "diff-tree",
            "--no-commit-id",
            "--name-status",
            "-r",
            "--root",
            commit,
        ],
    )
    .await?;

    let mut changes = Vec::new();
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        let mut fields = line.split('\t');
        let Some(status) = fields.next() else { continue };
        match status.chars().next() {
            Some('A') => {
                if let Some(path) = fields.next() {
                    changes.push(ChangedFile {
                        status: ChangeStatus::Added,
                        path: repo_root.join(path),
                    });
                }
            }
            Some('M') => {
                if let Some(path) = fields.next() {
                    changes.push(ChangedFile {
                        status: ChangeStatus::Modified,
                        path: repo_root.join(path),
                    });
                }
            }
            Some('D') => {
                if let Some(path) = fields.next() {
                    changes.push(ChangedFile {
                        status: ChangeStatus::Deleted,
                        path: repo_root.join(path),
                    });
                }
            }
            // renames carry both sides: old path deleted, new path added
            Some('R') => {
                if let Some(old) = fields.next() {
                    changes.push(ChangedFile {
                        status: ChangeStatus::Deleted,
                        path: repo_root.join(old),
                    });
                }
                if let Some(new) = fields.next() {
                    changes.push(ChangedFile {
                        status: ChangeStatus::Added,
                        path: repo_root.join(new),
                    });
                }
            }
            _ => {}
        }
    }
    Ok(changes)
}

async fn run_git(cwd: &Path, args: &[&str]) -> EngineResult<Output> {
    let output = Command::new("git")
        .arg("-C")
        .arg(cwd)
        .args(args)
        .output()
        .await
        .map_err(|e| EngineError::git(format!("cannot spawn git: {e}")))?;
    if !output.status.success() {
        return Err(EngineError::git(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn live_source_walks_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("products").join("starter");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("productInformation.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("policy.xml"), b"<p/>").unwrap();

        let source = LiveFileSource::new(dir.path());
        let files = source.service_files().await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|f| f.ends_with("policy.xml")));
        assert!(files
            .iter()
            .any(|f| f.ends_with("products/starter/productInformation.json")));
    }

    #[tokio::test]
    async fn live_source_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let source = LiveFileSource::new(dir.path());
        let absent = source.read_file(&dir.path().join("nope.json")).await.unwrap();
        assert!(absent.is_none());
    }

    #[tokio::test]
    async fn live_source_tolerates_missing_service_dir() {
        let dir = tempfile::tempdir().unwrap();
        let source = LiveFileSource::new(dir.path().join("not-created-yet"));
        assert!(source.service_files().await.unwrap().is_empty());
    }
}
