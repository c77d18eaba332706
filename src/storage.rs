use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::config::S3Config;

/// Object store holding uploaded assets, addressed by `<bucket-dir>/<name>` keys.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    /// Returns whether an object was actually removed. A missing key is not an error.
    async fn delete_object(&self, key: &str) -> anyhow::Result<bool>;
    async fn exists(&self, key: &str) -> anyhow::Result<bool>;
}

/// Files on the local disk under a fixed root directory.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub async fn new(root: impl Into<PathBuf>, dirs: &[&str]) -> anyhow::Result<Self> {
        let root = root.into();
        for dir in dirs {
            let path = root.join(dir);
            tokio::fs::create_dir_all(&path)
                .await
                .with_context(|| format!("create asset dir {}", path.display()))?;
        }
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(key);
        let clean = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        anyhow::ensure!(clean && !key.is_empty(), "unsafe storage key {key:?}");
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        // Write under a temporary name so a half-written file is never visible at `key`.
        let mut tmp = path.clone().into_os_string();
        tmp.push(".partial");
        let tmp = PathBuf::from(tmp);
        let written = match tokio::fs::write(&tmp, &body).await {
            Ok(()) => tokio::fs::rename(&tmp, &path)
                .await
                .with_context(|| format!("rename into {}", path.display())),
            Err(e) => Err(e).with_context(|| format!("write {}", tmp.display())),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(path = %tmp.display(), error = %cleanup, "partial upload not removed");
                }
            }
            return Err(e);
        }
        debug!(key, bytes = body.len(), "asset written");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<bool> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

/// S3 or MinIO bucket.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(cfg: &S3Config) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
        })
    }
}

#[async_trait]
impl StorageClient for S3Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<bool> {
        if !self.exists(key).await? {
            return Ok(false);
        }
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(true)
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().map(|s| s.is_not_found()).unwrap_or(false) => Ok(false),
            Err(e) => Err(e).context("s3 head_object"),
        }
    }
}

/// Process-local object map, used when running without durable storage and in tests.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, (Bytes, String)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| anyhow::anyhow!("storage lock poisoned"))?;
        objects.insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<bool> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| anyhow::anyhow!("storage lock poisoned"))?;
        Ok(objects.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| anyhow::anyhow!("storage lock poisoned"))?;
        Ok(objects.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_put_delete_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = LocalStorage::new(dir.path(), &["images"]).await.expect("storage");

        storage
            .put_object("images/a.png", Bytes::from_static(b"png"), "image/png")
            .await
            .expect("put");
        assert!(storage.exists("images/a.png").await.unwrap());
        assert!(!dir.path().join("images/a.png.partial").exists());

        assert!(storage.delete_object("images/a.png").await.unwrap());
        assert!(!storage.delete_object("images/a.png").await.unwrap());
        assert!(!storage.exists("images/a.png").await.unwrap());
    }

    #[tokio::test]
    async fn failed_local_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = LocalStorage::new(dir.path(), &["images"]).await.expect("storage");
        // A non-empty directory at the key makes the final rename fail.
        std::fs::create_dir_all(dir.path().join("images/a.png/inner")).unwrap();

        assert!(storage
            .put_object("images/a.png", Bytes::from_static(b"png"), "image/png")
            .await
            .is_err());
        assert!(!dir.path().join("images/a.png.partial").exists());
    }

    #[tokio::test]
    async fn local_rejects_traversal_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = LocalStorage::new(dir.path(), &[]).await.expect("storage");
        let err = storage
            .put_object("../escape.txt", Bytes::from_static(b"x"), "text/plain")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsafe storage key"));
        assert!(storage.delete_object("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn memory_storage_tracks_keys() {
        let storage = MemoryStorage::new();
        storage
            .put_object("pdfs/cv.pdf", Bytes::from_static(b"%PDF"), "application/pdf")
            .await
            .unwrap();
        assert_eq!(storage.keys(), vec!["pdfs/cv.pdf".to_string()]);
        assert!(storage.delete_object("pdfs/cv.pdf").await.unwrap());
        assert!(storage.keys().is_empty());
    }
}
