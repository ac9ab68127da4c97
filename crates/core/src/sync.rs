//! Reconcile a bucket prefix with a local directory tree.
//!
//! Objects under the prefix that no longer exist locally are deleted and
//! every local file is uploaded again, whether or not it changed.

use crate::error::{Error, Result};
use crate::listing::{join_key, trim_separators, BucketTree};
use crate::local::walk_tree;
use crate::store::{ObjectBody, ObjectStore, PutObjectRequest};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, error, info};

/// Metadata key telling the CDN to redirect a directory to its index.html
pub const DIR_REDIRECT_METADATA: &str = "dir-redirect";
pub const SURROGATE_KEY_METADATA: &str = "surrogate-key";
pub const SURROGATE_CONTROL_METADATA: &str = "surrogate-control";

/// Headers and behaviour for a [`sync_dir`] run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Write a directory redirect object for every directory
    pub upload_dir_redirect_objects: bool,
    /// Stored as `x-amz-meta-surrogate-key`, used to purge the CDN
    pub surrogate_key: Option<String>,
    /// Browser caching policy (`Cache-Control`)
    pub cache_control: Option<String>,
    /// CDN caching policy, stored as `x-amz-meta-surrogate-control`
    pub surrogate_control: Option<String>,
    /// Canned ACL applied per object; `None` inherits the bucket policy
    pub acl: Option<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            upload_dir_redirect_objects: true,
            surrogate_key: None,
            cache_control: None,
            surrogate_control: None,
            acl: None,
        }
    }
}

impl SyncOptions {
    /// Metadata written on every uploaded object
    pub fn metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        if let Some(key) = &self.surrogate_key {
            metadata.insert(SURROGATE_KEY_METADATA.to_string(), key.clone());
        }
        if let Some(control) = &self.surrogate_control {
            metadata.insert(SURROGATE_CONTROL_METADATA.to_string(), control.clone());
        }
        metadata
    }
}

/// Counts from a completed [`sync_dir`] run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub files_uploaded: usize,
    pub files_deleted: usize,
    pub directories_deleted: usize,
    pub redirect_objects: usize,
}

/// Make `path_prefix` in the bucket mirror `source_dir`.
///
/// Any store error aborts the run; objects already written or deleted stay
/// that way.
pub async fn sync_dir<S>(
    store: &S,
    path_prefix: &str,
    source_dir: &Path,
    options: &SyncOptions,
) -> Result<SyncReport>
where
    S: ObjectStore + ?Sized,
{
    info!(
        bucket = %store.bucket(),
        prefix = %path_prefix,
        source = %source_dir.display(),
        "Syncing directory"
    );

    let metadata = options.metadata();
    let tree = BucketTree::new(store, path_prefix);
    let mut report = SyncReport::default();

    for directory in walk_tree(source_dir)? {
        let bucket_root = directory.relative.as_str();
        let remote = tree.list_directory(bucket_root).await?;

        for dirname in &remote.subdirectories {
            if !directory.dirnames.contains(dirname) {
                let relative = join_key(bucket_root, dirname);
                debug!(directory = %relative, "Deleting bucket directory");
                tree.delete_directory(&relative).await?;
                report.directories_deleted += 1;
            }
        }

        for filename in &remote.files {
            // Redirect object of a local subdirectory; rewritten when that
            // directory is visited.
            if options.upload_dir_redirect_objects && directory.dirnames.contains(filename) {
                continue;
            }
            if !directory.filenames.contains(filename) {
                let relative = join_key(bucket_root, filename);
                debug!(file = %relative, "Deleting bucket file");
                tree.delete_file(&relative).await?;
                report.files_deleted += 1;
            }
        }

        for filename in &directory.filenames {
            let key = join_key(&join_key(path_prefix, bucket_root), filename);
            debug!(key = %key, "Uploading");
            upload_file(
                store,
                &directory.path.join(filename),
                &key,
                &metadata,
                options.acl.as_deref(),
                options.cache_control.as_deref(),
            )
            .await?;
            report.files_uploaded += 1;
        }

        if options.upload_dir_redirect_objects {
            let dir_key = join_key(path_prefix, bucket_root);
            if create_dir_redirect_object(
                store,
                &dir_key,
                &metadata,
                options.acl.as_deref(),
                options.cache_control.as_deref(),
            )
            .await?
            {
                report.redirect_objects += 1;
            }
        }
    }

    info!(
        uploaded = report.files_uploaded,
        deleted_files = report.files_deleted,
        deleted_directories = report.directories_deleted,
        "Sync complete"
    );
    Ok(report)
}

/// Upload one local file, guessing its Content-Type from the name
pub async fn upload_file<S>(
    store: &S,
    local_path: &Path,
    key: &str,
    metadata: &HashMap<String, String>,
    acl: Option<&str>,
    cache_control: Option<&str>,
) -> Result<()>
where
    S: ObjectStore + ?Sized,
{
    let content_type = mime_guess::from_path(local_path)
        .first_or_octet_stream()
        .to_string();

    let mut request = PutObjectRequest::new(key, ObjectBody::File(local_path.to_path_buf()));
    request.content_type = Some(content_type);
    request.cache_control = cache_control.map(str::to_string);
    request.acl = acl.map(str::to_string);
    request.metadata = metadata.clone();
    store.put_object(request).await.map_err(|e| {
        let message = format!("Error uploading {} to {:?}", local_path.display(), key);
        error!(bucket = %store.bucket(), key = %key, error = %e, "{}", message);
        Error::S3(format!("{}: {}", message, e))
    })
}

/// Write the empty object that stands for directory `dir_key`.
///
/// Returns `false` without writing when the key would be empty (the bucket
/// root has no object of its own).
pub async fn create_dir_redirect_object<S>(
    store: &S,
    dir_key: &str,
    metadata: &HashMap<String, String>,
    acl: Option<&str>,
    cache_control: Option<&str>,
) -> Result<bool>
where
    S: ObjectStore + ?Sized,
{
    let key = trim_separators(dir_key);
    if key.is_empty() {
        debug!("Skipping directory redirect object for the bucket root");
        return Ok(false);
    }

    let mut request = PutObjectRequest::new(key, ObjectBody::Empty);
    request.metadata = metadata.clone();
    request
        .metadata
        .insert(DIR_REDIRECT_METADATA.to_string(), "true".to_string());
    request.acl = acl.map(str::to_string);
    request.cache_control = cache_control.map(str::to_string);
    store.put_object(request).await.map_err(|e| {
        let message = format!("Error creating directory redirect object {:?}", key);
        error!(bucket = %store.bucket(), key = %key, error = %e, "{}", message);
        Error::S3(format!("{}: {}", message, e))
    })?;
    Ok(true)
}
