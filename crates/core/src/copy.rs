//! Copy a bucket directory to another prefix in the same bucket.
//!
//! Used to promote an immutable build into an edition without uploading
//! the content again.

use crate::delete::delete_prefix;
use crate::error::{Error, Result};
use crate::sync::{create_dir_redirect_object, SURROGATE_CONTROL_METADATA, SURROGATE_KEY_METADATA};
use crate::store::{CopyObjectRequest, ObjectStore};
use std::collections::HashMap;
use tracing::{debug, info};

/// ACL applied to every copied object
const COPY_ACL: &str = "public-read";

/// Header overrides for [`copy_dir`]; `None` keeps the source object's value
#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub surrogate_key: Option<String>,
    pub cache_control: Option<String>,
    pub surrogate_control: Option<String>,
    pub create_directory_redirect_object: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            surrogate_key: None,
            cache_control: None,
            surrogate_control: None,
            create_directory_redirect_object: true,
        }
    }
}

/// Normalize to a trailing `/` and refuse overlapping directories
pub fn check_copy_prefixes(src_path: &str, dest_path: &str) -> Result<(String, String)> {
    let src = with_trailing_separator(src_path);
    let dest = with_trailing_separator(dest_path);

    let common = common_prefix(&src, &dest);
    if common == src {
        return Err(Error::Precondition(format!(
            "Common prefix {} is same as source dir {}",
            common, src
        )));
    }
    if common == dest {
        return Err(Error::Precondition(format!(
            "Common prefix {} is same as dest dir {}",
            common, dest
        )));
    }
    Ok((src, dest))
}

fn with_trailing_separator(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

/// Longest common leading substring, on character boundaries
fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let end = a
        .char_indices()
        .zip(b.chars())
        .find(|((_, ca), cb)| ca != cb)
        .map(|((i, _), _)| i)
        .unwrap_or_else(|| a.len().min(b.len()));
    &a[..end]
}

/// Replace everything under `dest_path` with a copy of `src_path`.
///
/// Existing destination objects are deleted first. Returns the number of
/// objects copied.
pub async fn copy_dir<S>(
    store: &S,
    src_path: &str,
    dest_path: &str,
    options: &CopyOptions,
) -> Result<usize>
where
    S: ObjectStore + ?Sized,
{
    let (src, dest) = check_copy_prefixes(src_path, dest_path)?;

    info!(bucket = %store.bucket(), src = %src, dest = %dest, "Copying directory");
    delete_prefix(store, &dest).await?;

    let mut copied = 0;
    let mut token = None;
    loop {
        let page = store.list_objects_page(&src, token).await?;
        for source_key in page.keys {
            let relative = &source_key[src.len()..];
            let dest_key = format!("{}{}", dest, relative);

            let head = store.head_object(&source_key).await?;
            let mut metadata = head.metadata;
            if let Some(control) = &options.surrogate_control {
                metadata.insert(SURROGATE_CONTROL_METADATA.to_string(), control.clone());
            }
            if let Some(key) = &options.surrogate_key {
                metadata.insert(SURROGATE_KEY_METADATA.to_string(), key.clone());
            }

            debug!(from = %source_key, to = %dest_key, "Copying object");
            store
                .copy_object(CopyObjectRequest {
                    source_key: source_key.clone(),
                    dest_key,
                    content_type: head.content_type,
                    cache_control: options.cache_control.clone().or(head.cache_control),
                    acl: Some(COPY_ACL.to_string()),
                    metadata,
                })
                .await?;
            copied += 1;
        }
        match page.next_continuation_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    if options.create_directory_redirect_object {
        create_dir_redirect_object(
            store,
            &dest,
            &HashMap::new(),
            Some(COPY_ACL),
            options.cache_control.as_deref(),
        )
        .await?;
    }

    info!(count = copied, dest = %dest, "Copy complete");
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemoryStore, StoredObject};

    fn object(content_type: &str, cache_control: Option<&str>, surrogate_key: &str) -> StoredObject {
        let mut metadata = HashMap::new();
        metadata.insert("surrogate-key".to_string(), surrogate_key.to_string());
        StoredObject {
            body: b"content".to_vec(),
            content_type: Some(content_type.to_string()),
            cache_control: cache_control.map(str::to_string),
            acl: None,
            metadata,
        }
    }

    #[test]
    fn test_copy_into_own_subdirectory_is_refused() {
        let err = check_copy_prefixes("a/", "a/sub/").unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn test_copy_into_parent_is_refused() {
        let err = check_copy_prefixes("a/sub/", "a/").unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn test_copy_to_same_dir_is_refused() {
        assert!(check_copy_prefixes("a", "a/").is_err());
    }

    #[test]
    fn test_sibling_prefixes_are_allowed() {
        let (src, dest) = check_copy_prefixes("builds/1", "builds/10").unwrap();
        assert_eq!(src, "builds/1/");
        assert_eq!(dest, "builds/10/");
    }

    #[test]
    fn test_common_prefix() {
        assert_eq!(common_prefix("abc/", "abd/"), "ab");
        assert_eq!(common_prefix("a/", "a/b/"), "a/");
        assert_eq!(common_prefix("é/x", "é/y"), "é/");
    }

    #[tokio::test]
    async fn test_copy_dir_replaces_destination() {
        let store = MemoryStore::new();
        store.insert_object("builds/b1/index.html", object("text/html", Some("max-age=60"), "build-key"));
        store.insert_object("builds/b1/_static/app.js", object("application/javascript", None, "build-key"));
        store.insert("editions/main/stale.html");

        let options = CopyOptions {
            surrogate_key: Some("edition-key".to_string()),
            surrogate_control: Some("max-age=31536000".to_string()),
            ..CopyOptions::default()
        };
        let copied = copy_dir(&store, "builds/b1", "editions/main", &options).await.unwrap();

        assert_eq!(copied, 2);
        assert_eq!(
            store.keys(),
            vec![
                "builds/b1/_static/app.js",
                "builds/b1/index.html",
                "editions/main",
                "editions/main/_static/app.js",
                "editions/main/index.html",
            ]
        );

        let index = store.get("editions/main/index.html").unwrap();
        assert_eq!(index.body, b"content");
        assert_eq!(index.content_type.as_deref(), Some("text/html"));
        assert_eq!(index.cache_control.as_deref(), Some("max-age=60"));
        assert_eq!(index.acl.as_deref(), Some("public-read"));
        assert_eq!(index.metadata.get("surrogate-key").unwrap(), "edition-key");
        assert_eq!(
            index.metadata.get("surrogate-control").unwrap(),
            "max-age=31536000"
        );

        // Cache-Control of one object never leaks into the next
        let script = store.get("editions/main/_static/app.js").unwrap();
        assert!(script.cache_control.is_none());

        assert!(store.get("editions/main").unwrap().is_dir_redirect());
    }

    #[tokio::test]
    async fn test_copy_dir_overrides_cache_control() {
        let store = MemoryStore::new();
        store.insert_object("src/a.html", object("text/html", Some("max-age=60"), "k"));

        let options = CopyOptions {
            cache_control: Some("no-cache".to_string()),
            create_directory_redirect_object: false,
            ..CopyOptions::default()
        };
        copy_dir(&store, "src/", "dest/", &options).await.unwrap();

        let copy = store.get("dest/a.html").unwrap();
        assert_eq!(copy.cache_control.as_deref(), Some("no-cache"));
        assert_eq!(copy.metadata.get("surrogate-key").unwrap(), "k");
        assert!(store.get("dest").is_none());
    }

    #[tokio::test]
    async fn test_copy_dir_refuses_overlap_before_touching_store() {
        let store = MemoryStore::new();
        store.insert("a/sub/file.html");

        let result = copy_dir(&store, "a/", "a/sub/", &CopyOptions::default()).await;

        assert!(matches!(result, Err(Error::Precondition(_))));
        assert!(store.calls().is_empty());
    }
}
