//! Upload a complete site build through LTD Keeper

use crate::error::Result;
use crate::keeper::{BuildResource, KeeperSession};
use crate::presigned::{enumerate_directories, PresignedUploader};
use std::path::Path;
use tracing::info;

/// Register, upload and confirm a build of the site in `base_dir`.
///
/// The build is only confirmed when every file and directory object was
/// accepted.
pub async fn upload_build(
    session: &KeeperSession,
    uploader: &PresignedUploader,
    base_dir: &Path,
    project: &str,
    git_refs: &[String],
) -> Result<BuildResource> {
    let dirnames = enumerate_directories(base_dir)?;
    let build = session.register_build(project, git_refs, &dirnames).await?;
    info!(
        build = %build.self_url,
        published = build.published_url.as_deref().unwrap_or("-"),
        "Uploading build"
    );

    let uploaded = uploader.upload_tree(&build.post_prefix_urls, base_dir).await?;
    uploader.upload_directory_sentinels(&build.post_dir_urls).await?;
    session.confirm_build(&build.self_url).await?;

    info!(files = uploaded, build = %build.self_url, "Build upload complete");
    Ok(build)
}
