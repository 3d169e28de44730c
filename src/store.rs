// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The pluggable blob key-value store every sequence and table persists through.
//!
//! This module only defines the contract ([`BlobStore`]) and a reference in-memory
//! implementation ([`MemoryStore`]). Every other module is generic over `S: BlobStore`
//! rather than reaching for a `dyn BlobStore` trait object, since `async fn` in traits is
//! not `dyn`-compatible without boxing every future, and nothing in this crate needs
//! runtime store polymorphism.

use std::collections::HashMap;
use std::sync::RwLock;

/// An opaque key-value blob store.
///
/// Implementations must uphold a deep-copy contract: a value handed back from `get` must
/// not alias the value held internally by the store, and a value passed to `set` must not
/// be mutated afterwards through any reference the store retains. This prevents a caller
/// holding on to a loaded segment array from silently corrupting the store's own state (or
/// vice versa).
///
/// No ordering is assumed between concurrent `set` calls to unrelated keys. Implementations
/// must provide read-your-writes: once `set(key, _)` resolves, a subsequent `get(key)` on
/// the same store handle observes it.
pub trait BlobStore: Send + Sync {
    /// The error type this store can fail with.
    type Error: std::fmt::Debug + std::fmt::Display + Send + Sync + 'static;

    /// Fetches the bytes stored at `key`, or `None` if no value has ever been written
    /// there.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Stores `value` at `key`, overwriting any previous value.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;
}

/// An in-memory reference [`BlobStore`].
///
/// Suitable for tests and for embedding the engine without a real backing service. Never
/// persists anything past process lifetime.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys currently stored.
    ///
    /// Mainly useful in tests asserting on chunk fan-out.
    #[must_use]
    pub fn len(&self) -> usize {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        self.inner.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`MemoryStore`] never fails; this type exists only to give it a concrete,
/// well-behaved `Error` associated type.
#[derive(Debug)]
pub enum Infallible {}

impl std::fmt::Display for Infallible {
    fn fmt(&self, _f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        unreachable!("MemoryStore never produces an error")
    }
}

impl BlobStore for MemoryStore {
    type Error = Infallible;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let map = self.inner.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), Self::Error> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut map = self.inner.write().expect("lock poisoned");
        map.insert(key.to_owned(), value);
        Ok(())
    }
}

impl<T: BlobStore> BlobStore for std::sync::Arc<T> {
    type Error = T::Error;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        T::get(self, key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), Self::Error> {
        T::set(self, key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deep_copy_on_read_and_write() {
        let store = MemoryStore::new();
        let mut value = vec![1, 2, 3];
        store.set("k", value.clone()).await.unwrap();

        // Mutating the caller's copy must not affect the stored value.
        value.push(4);

        let mut fetched = store.get("k").await.unwrap().unwrap();
        assert_eq!(fetched, vec![1, 2, 3]);

        // Mutating the fetched copy must not affect the stored value.
        fetched.push(99);
        let fetched_again = store.get("k").await.unwrap().unwrap();
        assert_eq!(fetched_again, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn arc_wrapped_store_is_shareable() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let a = store.clone();
        let b = store.clone();
        a.set("k", vec![1]).await.unwrap();
        assert_eq!(b.get("k").await.unwrap(), Some(vec![1]));
    }
}
