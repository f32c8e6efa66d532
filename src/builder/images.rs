use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Answers whether an image file exists. Consulted only while compiling rules.
pub trait ImageCatalog {
    fn exists(&self, path: &str) -> bool;
}

impl ImageCatalog for HashSet<String> {
    fn exists(&self, path: &str) -> bool {
        self.contains(path)
    }
}

impl<T: ImageCatalog + ?Sized> ImageCatalog for &T {
    fn exists(&self, path: &str) -> bool {
        (**self).exists(path)
    }
}

/// File existence under a root directory, scanned once up front.
///
/// Paths are relative to the root with `/` separators. Paths containing `..`
/// are not in the scan and are checked against the filesystem directly.
#[derive(Debug, Clone)]
pub struct ImageDirectory {
    root: PathBuf,
    files: HashSet<String>,
}

impl ImageDirectory {
    pub fn scan(root: &Path) -> Result<Self, String> {
        let mut files = HashSet::new();
        if root.exists() {
            collect_files(root, root, &mut files)?;
        } else {
            warn!(root = %root.display(), "Image directory not found, no images will resolve");
        }
        debug!(root = %root.display(), count = files.len(), "Image directory scanned");
        Ok(Self {
            root: root.to_path_buf(),
            files,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn collect_files(root: &Path, dir: &Path, files: &mut HashSet<String>) -> Result<(), String> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| format!("Cannot read {}: {}", dir.display(), e))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            collect_files(root, &path, files)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            let key: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            files.insert(key.join("/"));
        }
    }
    Ok(())
}

impl ImageCatalog for ImageDirectory {
    fn exists(&self, path: &str) -> bool {
        if path.contains("..") {
            self.root.join(path).is_file()
        } else {
            self.files.contains(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn scan_finds_nested_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("terrain/grass")).unwrap();
        fs::write(dir.path().join("terrain/grass/green.png"), b"png").unwrap();
        fs::write(dir.path().join("terrain/void.png"), b"png").unwrap();

        let catalog = ImageDirectory::scan(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.exists("terrain/grass/green.png"));
        assert!(catalog.exists("terrain/void.png"));
        assert!(!catalog.exists("terrain/grass/dry.png"));
    }

    #[test]
    fn parent_paths_checked_on_disk() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("terrain")).unwrap();
        fs::create_dir_all(dir.path().join("extra")).unwrap();
        fs::write(dir.path().join("extra/shared.png"), b"png").unwrap();

        let catalog = ImageDirectory::scan(dir.path()).unwrap();
        assert!(catalog.exists("terrain/../extra/shared.png"));
        assert!(!catalog.exists("terrain/../extra/missing.png"));
    }

    #[cfg(unix)]
    #[test]
    fn directory_symlink_loops_are_not_followed() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("terrain")).unwrap();
        fs::write(dir.path().join("terrain/grass.png"), b"png").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("terrain/loop")).unwrap();

        let catalog = ImageDirectory::scan(dir.path()).unwrap();
        assert!(catalog.exists("terrain/grass.png"));
        assert!(!catalog.exists("terrain/loop/terrain/grass.png"));
    }

    #[test]
    fn missing_root_is_empty() {
        let catalog = ImageDirectory::scan(Path::new("/nonexistent/images_12345")).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn hash_set_catalog() {
        let set: HashSet<String> = ["terrain/a.png".to_string()].into_iter().collect();
        assert!(set.exists("terrain/a.png"));
        assert!(!set.exists("terrain/b.png"));
        assert!((&set).exists("terrain/a.png"));
    }
}
