use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

/// In-memory file system keyed by lexically normalized absolute paths.
pub struct MockFileSystem {
    files: RwLock<HashMap<PathBuf, String>>,
    root: PathBuf,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from("/mock"))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            root,
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: &str) {
        let path = self.normalize_path(path.as_ref());
        if let Ok(mut files) = self.files.write() {
            files.insert(path, content.to_string());
        }
    }

    fn normalize_path(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    normalized.pop();
                }
                other => normalized.push(other),
            }
        }
        normalized
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        let path = self.normalize_path(path);
        self.files
            .read()
            .map(|files| files.keys().any(|p| p.starts_with(&path)))
            .unwrap_or(false)
    }

    fn is_file(&self, path: &Path) -> bool {
        let path = self.normalize_path(path);
        self.files
            .read()
            .map(|files| files.contains_key(&path))
            .unwrap_or(false)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let path = self.normalize_path(path);
        let files = self
            .files
            .read()
            .map_err(|_| anyhow!("Mock file system lock poisoned"))?;
        files
            .get(&path)
            .cloned()
            .ok_or_else(|| anyhow!("File not found: {:?}", path))
    }

    fn read_first_line(&self, path: &Path) -> Result<Option<String>> {
        let content = self.read_to_string(path)?;
        Ok(content
            .lines()
            .next()
            .map(|line| line.trim_end_matches('\r').to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_file() {
        let fs = MockFileSystem::new();
        fs.add_file("test.env", "A=1");

        assert!(fs.exists(Path::new("/mock/test.env")));
        assert!(fs.is_file(Path::new("/mock/test.env")));
    }

    #[test]
    fn test_parent_dirs_exist_but_are_not_files() {
        let fs = MockFileSystem::new();
        fs.add_file("data/app.conf", "x");

        assert!(fs.exists(Path::new("/mock/data")));
        assert!(!fs.is_file(Path::new("/mock/data")));
    }

    #[test]
    fn test_read_to_string_normalizes_dot_segments() {
        let fs = MockFileSystem::new();
        fs.add_file("data/app.conf", "hello world");

        let content = fs
            .read_to_string(Path::new("/mock/./data/../data/app.conf"))
            .unwrap();
        assert_eq!(content, "hello world");
    }

    #[test]
    fn test_missing_file_is_error() {
        let fs = MockFileSystem::new();
        assert!(fs.read_to_string(Path::new("/mock/nope")).is_err());
    }

    #[test]
    fn test_with_root() {
        let fs = MockFileSystem::with_root(PathBuf::from("/repo"));
        fs.add_file("stack/.env", "A=1");

        assert!(fs.is_file(Path::new("/repo/stack/.env")));
        assert!(!fs.is_file(Path::new("/mock/stack/.env")));
    }

    #[test]
    fn test_read_first_line() {
        let fs = MockFileSystem::new();
        fs.add_file("a.env", "# marker\nA=1\n");
        fs.add_file("empty.env", "");

        assert_eq!(
            fs.read_first_line(Path::new("/mock/a.env")).unwrap().as_deref(),
            Some("# marker")
        );
        assert_eq!(fs.read_first_line(Path::new("/mock/empty.env")).unwrap(), None);
    }
}
