//! Test doubles shared by the unit tests

use crate::error::{Error, Result};
use crate::store::{
    CopyObjectRequest, ListPage, ObjectBody, ObjectHead, ObjectStore, PutObjectRequest,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// An object held by [`MemoryStore`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub acl: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl StoredObject {
    pub fn is_dir_redirect(&self) -> bool {
        self.metadata.get("dir-redirect").map(String::as_str) == Some("true")
    }
}

/// Every mutating call made against a [`MemoryStore`], in order
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Put(String),
    Copy { from: String, to: String },
    Delete(Vec<String>),
}

/// In-memory bucket with S3-like listing semantics
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    calls: Mutex<Vec<StoreCall>>,
    list_calls: Mutex<usize>,
    page_size: usize,
    fail_deletes: bool,
    fail_puts: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(1000)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            list_calls: Mutex::new(0),
            page_size,
            fail_deletes: false,
            fail_puts: false,
        }
    }

    pub fn failing_deletes() -> Self {
        Self {
            fail_deletes: true,
            ..Self::new()
        }
    }

    pub fn failing_puts() -> Self {
        Self {
            fail_puts: true,
            ..Self::new()
        }
    }

    pub fn insert(&self, key: &str) {
        self.insert_object(key, StoredObject::default());
    }

    pub fn insert_object(&self, key: &str, object: StoredObject) {
        self.objects.lock().unwrap().insert(key.to_string(), object);
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Keys that are not directory redirect objects
    pub fn file_keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, object)| !object.is_dir_redirect())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn delete_batches(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Delete(keys) => Some(keys.len()),
                _ => None,
            })
            .collect()
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        "memory-bucket"
    }

    async fn list_objects_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        *self.list_calls.lock().unwrap() += 1;
        let objects = self.objects.lock().unwrap();
        let mut matching = objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| match &continuation_token {
                Some(token) => key.as_str() > token.as_str(),
                None => true,
            });

        let keys: Vec<String> = matching.by_ref().take(self.page_size).cloned().collect();
        let next_continuation_token = if matching.next().is_some() {
            keys.last().cloned()
        } else {
            None
        };
        Ok(ListPage {
            keys,
            next_continuation_token,
        })
    }

    async fn head_object(&self, key: &str) -> Result<ObjectHead> {
        let object = self
            .get(key)
            .ok_or_else(|| Error::S3(format!("NoSuchKey: {}", key)))?;
        Ok(ObjectHead {
            content_type: object.content_type,
            cache_control: object.cache_control,
            metadata: object.metadata,
        })
    }

    async fn put_object(&self, request: PutObjectRequest) -> Result<()> {
        if self.fail_puts {
            return Err(Error::S3("AccessDenied".to_string()));
        }
        let body = match &request.body {
            ObjectBody::Empty => Vec::new(),
            ObjectBody::File(path) => std::fs::read(path)?,
        };
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Put(request.key.clone()));
        self.insert_object(
            &request.key,
            StoredObject {
                body,
                content_type: request.content_type,
                cache_control: request.cache_control,
                acl: request.acl,
                metadata: request.metadata,
            },
        );
        Ok(())
    }

    async fn copy_object(&self, request: CopyObjectRequest) -> Result<()> {
        let source = self
            .get(&request.source_key)
            .ok_or_else(|| Error::S3(format!("NoSuchKey: {}", request.source_key)))?;
        self.calls.lock().unwrap().push(StoreCall::Copy {
            from: request.source_key.clone(),
            to: request.dest_key.clone(),
        });
        self.insert_object(
            &request.dest_key,
            StoredObject {
                body: source.body,
                content_type: request.content_type,
                cache_control: request.cache_control,
                acl: request.acl,
                metadata: request.metadata,
            },
        );
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<()> {
        assert!(keys.len() <= 1000, "delete batch exceeds 1000 keys");
        if self.fail_deletes {
            return Err(Error::S3("AccessDenied".to_string()));
        }
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Delete(keys.to_vec()));
        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }
}

/// Serve `app` on an ephemeral local port and return its base URL
pub async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}
