//! Uploads through presigned POST URLs issued by LTD Keeper.
//!
//! Keeper issues one presigned POST per directory of the site; every file in
//! that directory is posted with the same URL and form fields.

use crate::error::{Error, Result};
use crate::local::walk_tree;
use futures::stream::{self, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

/// Most presigned POSTs in flight at once. Each holds an open file and a
/// connection.
pub const MAX_CONCURRENT_UPLOADS: usize = 32;

/// A presigned POST: target URL plus the form fields that authorize it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedPostUrl {
    pub url: String,
    pub fields: BTreeMap<String, String>,
}

/// Presigned POSTs keyed by relative directory name (`/`, `a/`, `a/aa/`)
pub type PresignedPostUrls = BTreeMap<String, PresignedPostUrl>;

/// List every directory under `base_dir`, root first, each ending in `/`.
/// The root itself is `/`.
pub fn enumerate_directories(base_dir: &Path) -> Result<Vec<String>> {
    Ok(walk_tree(base_dir)?
        .iter()
        .map(|directory| directory.dirname_key())
        .collect())
}

/// Posts files to presigned URLs
#[derive(Debug, Clone)]
pub struct PresignedUploader {
    http: Client,
}

impl PresignedUploader {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Upload every file under `base_dir`.
    ///
    /// Every directory must have a presigned URL before anything is sent.
    /// Uploads then run concurrently, at most [`MAX_CONCURRENT_UPLOADS`] at a
    /// time; all of them finish before the first failure is returned.
    /// Returns the number of files uploaded.
    pub async fn upload_tree(&self, post_urls: &PresignedPostUrls, base_dir: &Path) -> Result<usize> {
        let mut jobs: Vec<(PathBuf, &PresignedPostUrl)> = Vec::new();
        for directory in walk_tree(base_dir)? {
            let dirname = directory.dirname_key();
            let post_url = post_urls.get(&dirname).ok_or_else(|| {
                error!(directory = %dirname, "A presigned POST URL is not available");
                Error::MissingPresignedUrl(dirname.clone())
            })?;
            for filename in &directory.filenames {
                jobs.push((directory.path.join(filename), post_url));
            }
        }

        let results: Vec<Result<()>> = stream::iter(&jobs)
            .map(|(path, post_url)| self.upload_file(path, post_url))
            .buffered(MAX_CONCURRENT_UPLOADS)
            .collect()
            .await;

        let uploaded = results.len();
        results.into_iter().collect::<Result<Vec<()>>>()?;
        Ok(uploaded)
    }

    /// Post one file with a Content-Type guessed from its name
    pub async fn upload_file(&self, local_path: &Path, post_url: &PresignedPostUrl) -> Result<()> {
        let filename = local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = mime_guess::from_path(local_path)
            .first_or_octet_stream()
            .to_string();

        let mut fields = post_url.fields.clone();
        fields.insert("Content-Type".to_string(), content_type);

        let file = File::open(local_path).await?;
        let length = file.metadata().await?.len();
        let part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), length)
            .file_name(filename);

        let status = self.post_form(&post_url.url, &fields, part).await?;
        if status.is_success() {
            debug!(path = %local_path.display(), "Uploaded using presigned POST URL");
            Ok(())
        } else {
            error!(
                path = %local_path.display(),
                status = status.as_u16(),
                fields = ?fields,
                "Error uploading using presigned POST URL"
            );
            Err(Error::PresignedUpload {
                path: local_path.display().to_string(),
                status: status.as_u16(),
            })
        }
    }

    /// Post an empty object for each directory so the CDN can redirect it
    /// to its index.html
    pub async fn upload_directory_sentinels(&self, post_urls: &PresignedPostUrls) -> Result<()> {
        let results: Vec<Result<()>> = stream::iter(post_urls)
            .map(|(dirname, post_url)| self.upload_directory_sentinel(dirname, post_url))
            .buffered(MAX_CONCURRENT_UPLOADS)
            .collect()
            .await;
        results.into_iter().collect::<Result<Vec<()>>>()?;
        Ok(())
    }

    async fn upload_directory_sentinel(&self, dirname: &str, post_url: &PresignedPostUrl) -> Result<()> {
        let part = Part::bytes(Vec::new()).file_name("");
        let status = self.post_form(&post_url.url, &post_url.fields, part).await?;
        if status.is_success() {
            debug!(directory = %dirname, "Uploaded directory object");
            Ok(())
        } else {
            error!(
                directory = %dirname,
                status = status.as_u16(),
                "Error uploading directory object"
            );
            Err(Error::PresignedUpload {
                path: dirname.to_string(),
                status: status.as_u16(),
            })
        }
    }

    /// The `file` part has to come after every other field
    async fn post_form(
        &self,
        url: &str,
        fields: &BTreeMap<String, String>,
        file: Part,
    ) -> Result<reqwest::StatusCode> {
        let form = fields
            .iter()
            .fold(Form::new(), |form, (name, value)| form.text(name.clone(), value.clone()))
            .part("file", file);

        let response = self.http.post(url).multipart(form).send().await?;
        Ok(response.status())
    }
}
