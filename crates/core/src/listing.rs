//! Directory inference over flat bucket listings.
//!
//! Buckets have no directories; a "directory" exists whenever some key
//! continues past it with another `/`. Classification is a fold over the
//! listed keys, so pages can be fed in as they arrive.

use crate::delete::{delete_exact, delete_listed};
use crate::error::{Error, Result};
use crate::store::ObjectStore;
use std::collections::BTreeSet;
use tracing::debug;

/// Files and subdirectories found directly under one prefix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryListing {
    pub files: Vec<String>,
    pub subdirectories: Vec<String>,
}

#[derive(Default)]
struct Classifier {
    files: Vec<String>,
    subdirectories: BTreeSet<String>,
}

impl Classifier {
    fn push(mut self, prefix: &str, key: &str) -> Self {
        let Some(rest) = relative_to(prefix, key) else {
            return self;
        };
        match rest.split_once('/') {
            None => self.files.push(rest.to_string()),
            Some((dirname, _)) => {
                if !matches!(dirname, "" | "." | "..") {
                    self.subdirectories.insert(dirname.to_string());
                }
            }
        }
        self
    }

    fn finish(self) -> DirectoryListing {
        DirectoryListing {
            files: self.files,
            subdirectories: self.subdirectories.into_iter().collect(),
        }
    }
}

/// Part of `key` below `prefix`, or `None` when the key is not inside
/// the prefix directory (including the bare directory redirect object).
fn relative_to<'k>(prefix: &str, key: &'k str) -> Option<&'k str> {
    let rest = if prefix.is_empty() {
        key
    } else {
        key.strip_prefix(prefix)?.strip_prefix('/')?
    };
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// Classify keys relative to `prefix`.
///
/// `prefix` is compared without trailing separators. A key equal to the
/// prefix (a directory redirect object) appears in neither list.
pub fn classify_keys<'a, I>(prefix: &str, keys: I) -> DirectoryListing
where
    I: IntoIterator<Item = &'a str>,
{
    let prefix = trim_separators(prefix);
    keys.into_iter()
        .fold(Classifier::default(), |acc, key| acc.push(prefix, key))
        .finish()
}

/// Strip trailing `/` so prefix equality is an exact string comparison
pub fn trim_separators(path: &str) -> &str {
    path.trim_end_matches('/')
}

/// Join two key fragments with exactly one `/` between them
pub fn join_key(base: &str, name: &str) -> String {
    let base = trim_separators(base);
    let name = name.trim_start_matches('/');
    match (base.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{}/{}", base, name),
    }
}

/// View of the objects under one root prefix of a bucket
pub struct BucketTree<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    root: String,
}

impl<'a, S: ObjectStore + ?Sized> BucketTree<'a, S> {
    pub fn new(store: &'a S, root: &str) -> Self {
        Self {
            store,
            root: trim_separators(root).to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Absolute prefix of `dirname`, which is relative to the root
    fn directory_prefix(&self, dirname: &str) -> String {
        let dirname = match dirname {
            "." | "/" => "",
            other => other,
        };
        trim_separators(&join_key(&self.root, dirname)).to_string()
    }

    /// Files and subdirectories directly inside `dirname`, from one listing
    pub async fn list_directory(&self, dirname: &str) -> Result<DirectoryListing> {
        let prefix = self.directory_prefix(dirname);
        let keys = self.store.list_keys(&prefix).await?;
        Ok(classify_keys(&prefix, keys.iter().map(String::as_str)))
    }

    pub async fn list_files(&self, dirname: &str) -> Result<Vec<String>> {
        Ok(self.list_directory(dirname).await?.files)
    }

    pub async fn list_subdirectories(&self, dirname: &str) -> Result<Vec<String>> {
        Ok(self.list_directory(dirname).await?.subdirectories)
    }

    /// Delete one file; `filename` is relative to the root
    pub async fn delete_file(&self, filename: &str) -> Result<()> {
        delete_exact(self.store, &join_key(&self.root, filename)).await
    }

    /// Delete a directory and everything beneath it.
    ///
    /// The directory must exist: finding no objects under it is an error.
    pub async fn delete_directory(&self, dirname: &str) -> Result<usize> {
        let prefix = format!("{}/", self.directory_prefix(dirname));
        debug!(prefix = %prefix, "Deleting bucket directory");
        let deleted = delete_listed(self.store, &prefix).await?;
        if deleted == 0 {
            return Err(Error::Precondition(format!(
                "No objects in bucket directory {}",
                dirname
            )));
        }
        Ok(deleted)
    }
}
