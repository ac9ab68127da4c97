//! Object store access: the `ObjectStore` seam and its S3 implementation

use crate::error::{Error, Result};
use async_trait::async_trait;
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion};
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    types::{Delete, MetadataDirective, ObjectCannedAcl, ObjectIdentifier},
    Client,
};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// Region used when neither the caller nor the provider chain names one
const FALLBACK_REGION: &str = "us-east-1";

/// How to authenticate against the object store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCredentials {
    /// Explicit access key pair
    KeyPair {
        access_key_id: String,
        secret_access_key: String,
    },
    /// Named profile from the local AWS configuration files
    Profile(String),
}

/// Connection options that are independent of the credential mode
#[derive(Debug, Clone, Default)]
pub struct BucketOptions {
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores
    pub endpoint_url: Option<String>,
}

/// One page of a prefix listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub next_continuation_token: Option<String>,
}

/// Headers of an existing object that survive a copy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectHead {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Content of an object being written
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectBody {
    Empty,
    File(PathBuf),
}

/// A put-object call
#[derive(Debug, Clone)]
pub struct PutObjectRequest {
    pub key: String,
    pub body: ObjectBody,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub acl: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl PutObjectRequest {
    pub fn new(key: impl Into<String>, body: ObjectBody) -> Self {
        Self {
            key: key.into(),
            body,
            content_type: None,
            cache_control: None,
            acl: None,
            metadata: HashMap::new(),
        }
    }
}

/// A copy-object call within one bucket. Metadata is always replaced.
#[derive(Debug, Clone)]
pub struct CopyObjectRequest {
    pub source_key: String,
    pub dest_key: String,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub acl: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Operations the synchronization code needs from a bucket.
///
/// Implemented by [`S3Bucket`] for real buckets; tests provide an
/// in-memory implementation.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket this handle is bound to
    fn bucket(&self) -> &str;

    /// List one page of keys that start with `prefix`
    async fn list_objects_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage>;

    async fn head_object(&self, key: &str) -> Result<ObjectHead>;

    async fn put_object(&self, request: PutObjectRequest) -> Result<()>;

    async fn copy_object(&self, request: CopyObjectRequest) -> Result<()>;

    /// Delete up to 1000 keys in one request
    async fn delete_objects(&self, keys: &[String]) -> Result<()>;

    /// List every key under `prefix`, following continuation tokens
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token = None;
        loop {
            let page = self.list_objects_page(prefix, token).await?;
            keys.extend(page.keys);
            match page.next_continuation_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(keys)
    }
}

/// S3 bucket handle using the AWS SDK
#[derive(Debug, Clone)]
pub struct S3Bucket {
    client: Client,
    bucket: String,
}

/// Open a handle to `name`.
///
/// No request is made here; a missing bucket or bad credentials surface on
/// the first call that uses the handle.
pub async fn open_bucket(
    name: &str,
    credentials: &StoreCredentials,
    options: &BucketOptions,
) -> Result<S3Bucket> {
    if name.is_empty() {
        return Err(Error::InvalidInput("Bucket name cannot be empty".to_string()));
    }

    let region = RegionProviderChain::first_try(options.region.clone().map(Region::new))
        .or_default_provider()
        .or_else(Region::new(FALLBACK_REGION));

    let loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
    let loader = match credentials {
        StoreCredentials::KeyPair {
            access_key_id,
            secret_access_key,
        } => loader.credentials_provider(Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "ltd-conveyor",
        )),
        StoreCredentials::Profile(profile) => loader.profile_name(profile),
    };
    let sdk_config = loader.load().await;

    let mut config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
    if let Some(endpoint) = &options.endpoint_url {
        config_builder = config_builder.endpoint_url(endpoint).force_path_style(true);
    }

    debug!(bucket = %name, "Opened S3 bucket handle");

    Ok(S3Bucket {
        client: Client::from_conf(config_builder.build()),
        bucket: name.to_string(),
    })
}

impl S3Bucket {
    /// Wrap an already configured SDK client
    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Bucket {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_continuation_token(continuation_token)
            .send()
            .await?;

        let keys = response
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(|k| k.to_string()))
            .collect();

        let next_continuation_token = if response.is_truncated() == Some(true) {
            response.next_continuation_token().map(|s| s.to_string())
        } else {
            None
        };

        Ok(ListPage {
            keys,
            next_continuation_token,
        })
    }

    async fn head_object(&self, key: &str) -> Result<ObjectHead> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;

        Ok(ObjectHead {
            content_type: response.content_type().map(|s| s.to_string()),
            cache_control: response.cache_control().map(|s| s.to_string()),
            metadata: response.metadata().cloned().unwrap_or_default(),
        })
    }

    async fn put_object(&self, request: PutObjectRequest) -> Result<()> {
        let body = match &request.body {
            ObjectBody::Empty => ByteStream::from_static(b""),
            ObjectBody::File(path) => ByteStream::from_path(path).await?,
        };

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&request.key)
            .body(body)
            .set_content_type(request.content_type)
            .set_cache_control(request.cache_control)
            .set_acl(request.acl.as_deref().map(ObjectCannedAcl::from))
            .set_metadata(non_empty(request.metadata))
            .send()
            .await?;

        Ok(())
    }

    async fn copy_object(&self, request: CopyObjectRequest) -> Result<()> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(&request.dest_key)
            .copy_source(copy_source(&self.bucket, &request.source_key))
            .metadata_directive(MetadataDirective::Replace)
            .set_content_type(request.content_type)
            .set_cache_control(request.cache_control)
            .set_acl(request.acl.as_deref().map(ObjectCannedAcl::from))
            .set_metadata(non_empty(request.metadata))
            .send()
            .await?;

        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let delete = Delete::builder().set_objects(Some(objects)).quiet(true).build()?;

        let response = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await?;

        let errors = response.errors();
        if !errors.is_empty() {
            let details = errors
                .iter()
                .map(|e| {
                    format!(
                        "{}: {}",
                        e.key().unwrap_or("<unknown>"),
                        e.message().unwrap_or("unknown error")
                    )
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::S3(format!(
                "S3 could not delete {} of {} objects ({})",
                errors.len(),
                keys.len(),
                details
            )));
        }

        Ok(())
    }
}

/// The SDK rejects an empty metadata map on some S3-compatible stores
fn non_empty(metadata: HashMap<String, String>) -> Option<HashMap<String, String>> {
    if metadata.is_empty() {
        None
    } else {
        Some(metadata)
    }
}

/// `bucket/key` with the key percent-encoded, as `x-amz-copy-source` expects
fn copy_source(bucket: &str, key: &str) -> String {
    let key = key
        .split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", bucket, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemoryStore;

    #[test]
    fn test_copy_source_plain_key() {
        assert_eq!(
            copy_source("docs-bucket", "builds/1/index.html"),
            "docs-bucket/builds/1/index.html"
        );
    }

    #[test]
    fn test_copy_source_escapes_reserved_characters() {
        assert_eq!(
            copy_source("b", "dir/my file+v2.html"),
            "b/dir/my%20file%2Bv2.html"
        );
    }

    #[test]
    fn test_copy_source_escapes_non_ascii_segments() {
        assert_eq!(
            copy_source("b", "docs/résumé/a?b.html"),
            "b/docs/r%C3%A9sum%C3%A9/a%3Fb.html"
        );
    }

    #[test]
    fn test_non_empty_metadata() {
        assert!(non_empty(HashMap::new()).is_none());

        let mut metadata = HashMap::new();
        metadata.insert("surrogate-key".to_string(), "abc".to_string());
        assert_eq!(non_empty(metadata.clone()), Some(metadata));
    }

    #[test]
    fn test_put_object_request_defaults() {
        let request = PutObjectRequest::new("a/b", ObjectBody::Empty);
        assert_eq!(request.key, "a/b");
        assert!(request.acl.is_none());
        assert!(request.metadata.is_empty());
    }

    #[tokio::test]
    async fn test_open_bucket_rejects_empty_name() {
        let credentials = StoreCredentials::Profile("default".to_string());
        let result = open_bucket("", &credentials, &BucketOptions::default()).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_open_bucket_with_key_pair() {
        let credentials = StoreCredentials::KeyPair {
            access_key_id: "id".to_string(),
            secret_access_key: "secret".to_string(),
        };
        let options = BucketOptions {
            region: Some("us-west-2".to_string()),
            endpoint_url: Some("http://127.0.0.1:9000".to_string()),
        };
        let bucket = open_bucket("docs", &credentials, &options).await.unwrap();
        assert_eq!(bucket.bucket(), "docs");
    }

    #[tokio::test]
    async fn test_list_keys_follows_pages() {
        let store = MemoryStore::with_page_size(2);
        for i in 0..5 {
            store.insert(&format!("p/{}", i));
        }
        store.insert("q/0");

        let keys = store.list_keys("p/").await.unwrap();
        assert_eq!(keys, vec!["p/0", "p/1", "p/2", "p/3", "p/4"]);
        assert_eq!(store.list_calls(), 3);
    }
}
