//! Batched deletion of bucket objects

use crate::error::{Error, Result};
use crate::store::ObjectStore;
use tracing::{debug, error, info};

/// Maximum number of keys accepted by one DeleteObjects request
pub const MAX_DELETE_BATCH: usize = 1000;

/// Delete every object whose key starts with `prefix`.
///
/// Finding nothing to delete is not an error. Returns the number of
/// objects deleted.
pub async fn delete_prefix<S>(store: &S, prefix: &str) -> Result<usize>
where
    S: ObjectStore + ?Sized,
{
    let deleted = delete_listed(store, prefix).await?;
    if deleted == 0 {
        info!(bucket = %store.bucket(), prefix = %prefix, "No objects deleted");
    } else {
        info!(
            bucket = %store.bucket(),
            prefix = %prefix,
            count = deleted,
            "Deleted objects"
        );
    }
    Ok(deleted)
}

/// Delete exactly one object by its full key
pub async fn delete_exact<S>(store: &S, key: &str) -> Result<()>
where
    S: ObjectStore + ?Sized,
{
    debug!(bucket = %store.bucket(), key = %key, "Deleting object");
    flush_batch(store, key, &[key.to_string()]).await
}

/// Page through the listing under `prefix`, deleting in batches as it goes
pub(crate) async fn delete_listed<S>(store: &S, prefix: &str) -> Result<usize>
where
    S: ObjectStore + ?Sized,
{
    let mut batch: Vec<String> = Vec::with_capacity(MAX_DELETE_BATCH);
    let mut deleted = 0;
    let mut token = None;

    loop {
        let page = store.list_objects_page(prefix, token).await?;
        for key in page.keys {
            batch.push(key);
            if batch.len() >= MAX_DELETE_BATCH {
                flush_batch(store, prefix, &batch).await?;
                deleted += batch.len();
                batch.clear();
            }
        }
        match page.next_continuation_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    if !batch.is_empty() {
        flush_batch(store, prefix, &batch).await?;
        deleted += batch.len();
    }

    Ok(deleted)
}

async fn flush_batch<S>(store: &S, prefix: &str, keys: &[String]) -> Result<()>
where
    S: ObjectStore + ?Sized,
{
    debug!(prefix = %prefix, count = keys.len(), "Deleting batch");
    store.delete_objects(keys).await.map_err(|e| {
        let message = format!("Error deleting objects from {:?}", prefix);
        error!(bucket = %store.bucket(), prefix = %prefix, error = %e, "{}", message);
        Error::S3(format!("{}: {}", message, e))
    })
}
