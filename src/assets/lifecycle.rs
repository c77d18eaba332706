use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::router::{name_for, route, Bucket};
use super::upload::UploadedFile;
use super::AssetError;
use crate::storage::StorageClient;

/// A content record that points at stored assets.
pub trait AssetOwner {
    fn asset_refs(&self) -> Vec<&str>;
}

impl<T: AssetOwner> AssetOwner for Option<T> {
    fn asset_refs(&self) -> Vec<&str> {
        self.as_ref().map(|r| r.asset_refs()).unwrap_or_default()
    }
}

impl<T: AssetOwner> AssetOwner for [T] {
    fn asset_refs(&self) -> Vec<&str> {
        self.iter().flat_map(|r| r.asset_refs()).collect()
    }
}

/// Writes uploads into the store and turns them into asset references
/// (`<url prefix>/<bucket dir>/<name>`).
#[derive(Clone)]
pub struct AssetManager {
    storage: Arc<dyn StorageClient>,
    url_prefix: String,
}

impl AssetManager {
    pub fn new(storage: Arc<dyn StorageClient>, url_prefix: impl Into<String>) -> Self {
        Self {
            storage,
            url_prefix: url_prefix.into(),
        }
    }

    pub fn reference_for(&self, key: &str) -> String {
        format!("{}/{}", self.url_prefix, key)
    }

    /// Storage key behind a reference. Anything outside the asset prefix, or
    /// anything that could climb out of it, is refused.
    pub fn key_for<'r>(&self, reference: &'r str) -> Result<&'r str, AssetError> {
        let key = reference
            .strip_prefix(self.url_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| AssetError::InvalidReference(reference.to_string()))?;
        let traversal = key.is_empty()
            || key.contains('\\')
            || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
        if traversal {
            return Err(AssetError::InvalidReference(reference.to_string()));
        }
        Ok(key)
    }

    pub fn check(&self, upload: &UploadedFile, expected: Bucket) -> Result<(), AssetError> {
        let bucket = route(&upload.mime_type);
        if bucket != expected {
            return Err(AssetError::Rejected(format!(
                "{} must be a {expected} upload, got {}",
                upload.original_name, upload.mime_type
            )));
        }
        Ok(())
    }

    /// Write one upload and return its reference. Nothing links to the file yet.
    pub async fn store(&self, upload: UploadedFile) -> Result<String, AssetError> {
        let bucket = route(&upload.mime_type);
        let key = format!("{}/{}", bucket.dir(), name_for(&upload.original_name));
        self.storage
            .put_object(&key, upload.body, &upload.mime_type)
            .await
            .map_err(AssetError::Storage)?;
        debug!(key = %key, %bucket, "asset stored");
        Ok(self.reference_for(&key))
    }

    /// Delete the file behind `reference`. Missing files are fine.
    pub async fn remove(&self, reference: &str) -> Result<bool, AssetError> {
        let key = self.key_for(reference)?;
        self.storage
            .delete_object(key)
            .await
            .map_err(AssetError::Storage)
    }

    pub fn changes(&self) -> AssetChanges<'_> {
        AssetChanges {
            manager: self,
            written: Vec::new(),
            stale: BTreeSet::new(),
        }
    }

    /// Cascade delete for a record that is going away. Never fails: missing
    /// files and store errors are logged and skipped.
    pub async fn delete_all<R: AssetOwner + ?Sized>(&self, record: &R) -> usize {
        let refs: BTreeSet<&str> = record.asset_refs().into_iter().collect();
        let mut removed = 0;
        for reference in refs {
            match self.remove(reference).await {
                Ok(true) => removed += 1,
                Ok(false) => info!(reference, "asset already missing"),
                Err(e) => warn!(reference, error = %e, "asset delete failed; continuing"),
            }
        }
        removed
    }
}

/// Asset writes and deletions staged by one request.
///
/// New files are written as soon as they are staged. Superseded files are only
/// deleted by [`commit`](Self::commit), after the record pointing at the new
/// files has been saved; [`rollback`](Self::rollback) instead removes what this
/// request wrote. Each stale reference is deleted at most once.
pub struct AssetChanges<'a> {
    manager: &'a AssetManager,
    written: Vec<String>,
    stale: BTreeSet<String>,
}

impl AssetChanges<'_> {
    /// Single-asset field. With no upload the old reference is kept and the
    /// store is not touched.
    pub async fn replace(
        &mut self,
        old: Option<&str>,
        upload: Option<UploadedFile>,
        expected: Bucket,
    ) -> Result<Option<String>, AssetError> {
        let Some(upload) = upload else {
            return Ok(old.map(str::to_string));
        };
        self.manager.check(&upload, expected)?;
        let reference = self.manager.store(upload).await?;
        self.written.push(reference.clone());
        if let Some(old) = old {
            self.stale.insert(old.to_string());
        }
        Ok(Some(reference))
    }

    /// Multi-asset field with append semantics: new uploads follow the
    /// existing references, nothing is retired.
    pub async fn replace_many(
        &mut self,
        old: &[String],
        uploads: Vec<UploadedFile>,
        expected: Bucket,
    ) -> Result<Vec<String>, AssetError> {
        for upload in &uploads {
            self.manager.check(upload, expected)?;
        }
        let mut refs = old.to_vec();
        for upload in uploads {
            let reference = self.manager.store(upload).await?;
            self.written.push(reference.clone());
            refs.push(reference);
        }
        Ok(refs)
    }

    /// Store every upload as a fresh asset.
    pub async fn store_all(
        &mut self,
        uploads: Vec<UploadedFile>,
        expected: Bucket,
    ) -> Result<Vec<String>, AssetError> {
        self.replace_many(&[], uploads, expected).await
    }

    /// Mark references for deletion on commit.
    pub fn retire<I, S>(&mut self, refs: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stale.extend(refs.into_iter().map(Into::into));
    }

    /// Retire whatever `before` referenced that `after` no longer does.
    pub fn retire_superseded<B, A>(&mut self, before: &B, after: &A)
    where
        B: AssetOwner + ?Sized,
        A: AssetOwner + ?Sized,
    {
        let kept: BTreeSet<&str> = after.asset_refs().into_iter().collect();
        let gone: Vec<String> = before
            .asset_refs()
            .into_iter()
            .filter(|r| !kept.contains(r))
            .map(str::to_string)
            .collect();
        self.retire(gone);
    }

    /// The record is saved: drop superseded files. Returns how many were removed.
    pub async fn commit(mut self) -> usize {
        let written: BTreeSet<String> = std::mem::take(&mut self.written).into_iter().collect();
        let stale = std::mem::take(&mut self.stale);
        let mut removed = 0;
        for reference in stale.iter().filter(|r| !written.contains(*r)) {
            match self.manager.remove(reference).await {
                Ok(true) => removed += 1,
                Ok(false) => debug!(reference = %reference, "stale asset already gone"),
                Err(e) => warn!(reference = %reference, error = %e, "stale asset not removed"),
            }
        }
        removed
    }

    /// The record was not saved: remove the files this request wrote.
    pub async fn rollback(mut self) {
        while let Some(reference) = self.written.pop() {
            if let Err(e) = self.manager.remove(&reference).await {
                warn!(reference = %reference, error = %e, "rollback could not remove asset");
            }
        }
    }

    /// Commit on success, roll back on failure.
    pub async fn settle<T, E>(self, result: Result<T, E>) -> Result<T, E> {
        match result {
            Ok(value) => {
                self.commit().await;
                Ok(value)
            }
            Err(e) => {
                self.rollback().await;
                Err(e)
            }
        }
    }
}

/// Changes dropped without `commit` or `rollback` (for example when the
/// request future is cancelled) still remove the files they wrote.
impl Drop for AssetChanges<'_> {
    fn drop(&mut self) {
        if self.written.is_empty() {
            return;
        }
        let written = std::mem::take(&mut self.written);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let manager = self.manager.clone();
                handle.spawn(async move {
                    for reference in &written {
                        if let Err(e) = manager.remove(reference).await {
                            warn!(reference = %reference, error = %e, "orphaned asset not removed");
                        }
                    }
                });
            }
            Err(_) => warn!(
                count = written.len(),
                "unsettled asset writes dropped outside a runtime; files left behind"
            ),
        }
    }
}
