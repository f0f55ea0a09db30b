use std::sync::Arc;

use bytes::Bytes;
use zarrs::storage::{ReadableStorageTraits, StorageError, StoreKey};

/// Key-addressed source of whole objects, relative to an array root.
///
/// Only whole-object reads are needed; stores need not be seekable.
/// Retries and timeouts belong to the implementation, not the reader.
pub trait ChunkStore: Send + Sync {
    /// Fetch the object at `key`.
    ///
    /// Returns `Ok(None)` if there is no such object, which is not an error.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the underlying store fails.
    fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError>;
}

impl<S: ChunkStore + ?Sized> ChunkStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        (**self).get(key)
    }
}

impl<S: ChunkStore + ?Sized> ChunkStore for &S {
    fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        (**self).get(key)
    }
}

/// Adapts any `zarrs` readable store (filesystem, memory, HTTP, object store)
/// to a [`ChunkStore`] rooted at an array path within it.
pub struct ZarrsStore<R> {
    inner: R,
    prefix: String,
}

impl<R> ZarrsStore<R> {
    /// Array at the root of `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            prefix: String::new(),
        }
    }

    /// Array at `path` within `inner`, e.g. `"group/array"`.
    pub fn with_prefix(mut self, path: &str) -> Self {
        let trimmed = path.trim_matches('/');
        self.prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}/")
        };
        self
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn store_key(&self, key: &str) -> Result<StoreKey, StorageError> {
        Ok(StoreKey::new(format!("{}{key}", self.prefix))?)
    }
}

impl<R: ReadableStorageTraits> ChunkStore for ZarrsStore<R> {
    fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        self.inner.get(&self.store_key(key)?)
    }
}
