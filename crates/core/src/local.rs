//! Read-only walk of a local site build

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One directory of the local tree with its immediate children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDirectory {
    pub path: PathBuf,
    /// Path relative to the walk root using `/` separators; empty for the root
    pub relative: String,
    pub dirnames: Vec<String>,
    pub filenames: Vec<String>,
}

impl LocalDirectory {
    /// Relative name ending in `/`, with the root written as `/`
    pub fn dirname_key(&self) -> String {
        if self.relative.is_empty() {
            "/".to_string()
        } else {
            format!("{}/", self.relative)
        }
    }
}

/// Walk `root` top-down, parents before children, names sorted
pub fn walk_tree(root: &Path) -> Result<Vec<LocalDirectory>> {
    if !root.is_dir() {
        return Err(Error::InvalidInput(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut directories = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let mut dirnames = Vec::new();
        let mut filenames = Vec::new();
        for child in WalkDir::new(entry.path())
            .follow_links(true)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let child = child?;
            let name = child.file_name().to_string_lossy().into_owned();
            if child.file_type().is_dir() {
                dirnames.push(name);
            } else {
                filenames.push(name);
            }
        }

        directories.push(LocalDirectory {
            path: entry.path().to_path_buf(),
            relative: relative_path(entry.path(), root),
            dirnames,
            filenames,
        });
    }

    Ok(directories)
}

/// `path` relative to `base` with `/` separators
pub fn relative_path(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_site() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/aa")).unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        fs::write(dir.path().join("a/page.html"), "a").unwrap();
        fs::write(dir.path().join("a/aa/deep.css"), "aa").unwrap();
        dir
    }

    #[test]
    fn test_walk_tree_order_and_children() {
        let site = make_site();
        let tree = walk_tree(site.path()).unwrap();

        let relatives: Vec<&str> = tree.iter().map(|d| d.relative.as_str()).collect();
        assert_eq!(relatives, vec!["", "a", "a/aa", "b"]);

        assert_eq!(tree[0].dirnames, vec!["a", "b"]);
        assert_eq!(tree[0].filenames, vec!["index.html"]);
        assert_eq!(tree[1].dirnames, vec!["aa"]);
        assert_eq!(tree[1].filenames, vec!["page.html"]);
        assert!(tree[3].filenames.is_empty());
    }

    #[test]
    fn test_dirname_key() {
        let site = make_site();
        let tree = walk_tree(site.path()).unwrap();
        let keys: Vec<String> = tree.iter().map(|d| d.dirname_key()).collect();
        assert_eq!(keys, vec!["/", "a/", "a/aa/", "b/"]);
    }

    #[test]
    fn test_walk_tree_rejects_file() {
        let site = make_site();
        let result = walk_tree(&site.path().join("index.html"));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
