//! ltd-conveyor-core - Core library for the LSST the Docs upload client
//!
//! This library uploads static documentation sites to S3, either directly
//! by reconciling a bucket prefix with a local directory or through the
//! presigned POST URLs that LTD Keeper issues for a registered build.

pub mod build;
pub mod config;
pub mod copy;
pub mod delete;
pub mod error;
pub mod fastly;
pub mod keeper;
pub mod listing;
pub mod local;
pub mod presigned;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testutil;

// Re-export commonly used types
pub use build::upload_build;
pub use config::{
    config_exists, get_config_path, load_config, load_config_from, validate_config,
};
pub use config::{AwsConfig, ConfigFile, FastlyConfig, KeeperConfig, LoggingConfig};
pub use copy::{copy_dir, CopyOptions};
pub use delete::{delete_exact, delete_prefix};
pub use error::{Error, Result};
pub use fastly::FastlyClient;
pub use keeper::{BuildResource, KeeperApi, KeeperClient, KeeperSession, ServerVersion};
pub use listing::{BucketTree, DirectoryListing};
pub use presigned::{PresignedPostUrl, PresignedPostUrls, PresignedUploader};
pub use store::{open_bucket, BucketOptions, ObjectStore, S3Bucket, StoreCredentials};
pub use sync::{sync_dir, SyncOptions, SyncReport};
