use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create scratch directory under {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Hands out one fresh scratch directory per execution attempt
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Uses `root` as the parent of all scratch directories, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| WorkspaceError::Create {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates an empty directory with a random name under the root
    pub fn acquire(&self) -> Result<ScratchDir, WorkspaceError> {
        let dir = tempfile::Builder::new()
            .prefix("attempt-")
            .tempdir_in(&self.root)
            .map_err(|source| WorkspaceError::Create {
                path: self.root.clone(),
                source,
            })?;
        log::debug!("Acquired scratch directory {}", dir.path().display());
        Ok(ScratchDir { dir: Some(dir) })
    }
}

/// A scratch directory owned by a single attempt
///
/// The directory is removed by [`ScratchDir::release`], or on drop if the
/// attempt ends any other way.
#[derive(Debug)]
pub struct ScratchDir {
    dir: Option<TempDir>,
}

impl ScratchDir {
    pub fn path(&self) -> &Path {
        // Only `release` takes the directory, and it consumes `self`
        self.dir.as_ref().map(TempDir::path).unwrap_or(Path::new(""))
    }

    /// Writes `content` to `file_name` inside the directory, returning the full path
    pub fn write(&self, file_name: &str, content: &str) -> Result<PathBuf, WorkspaceError> {
        let path = self.path().join(file_name);
        fs::write(&path, content).map_err(|source| WorkspaceError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Removes the directory and everything in it. Failures are logged, not returned.
    pub fn release(mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => log::debug!("Released scratch directory {}", path.display()),
                Err(e) => log::warn!("Failed to remove scratch directory {}: {e}", path.display()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_gives_disjoint_empty_directories() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(root.path()).unwrap();

        let a = workspace.acquire().unwrap();
        let b = workspace.acquire().unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(root.path()));
        assert_eq!(fs::read_dir(a.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_release_removes_directory_and_contents() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(root.path()).unwrap();

        let scratch = workspace.acquire().unwrap();
        let file = scratch.write("solution.py", "print(1)\n").unwrap();
        fs::create_dir(scratch.path().join("nested")).unwrap();
        fs::write(scratch.path().join("nested/out.txt"), "x").unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "print(1)\n");

        let path = scratch.path().to_path_buf();
        scratch.release();

        assert!(!path.exists());
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(root.path()).unwrap();

        let path = {
            let scratch = workspace.acquire().unwrap();
            scratch.write("solution.py", "").unwrap();
            scratch.path().to_path_buf()
        };

        assert!(!path.exists());
    }

    #[test]
    fn test_new_creates_missing_root() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("a/b/c");
        let workspace = Workspace::new(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(workspace.root(), root.as_path());
    }

    #[test]
    fn test_acquire_fails_when_root_is_gone() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(parent.path().join("root")).unwrap();
        fs::remove_dir(workspace.root()).unwrap();

        let err = workspace.acquire().unwrap_err();
        assert!(matches!(err, WorkspaceError::Create { .. }));
    }
}
