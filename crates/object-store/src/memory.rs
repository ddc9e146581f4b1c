//! In-memory object store with call accounting and failure injection.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::store::ObjectStore;

/// Operations a [`MemoryObjectStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Put,
    Get,
    Compose,
    Delete,
}

/// Object store that keeps everything in a map.
#[derive(Debug)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<StoreOp>>,
    compose_log: Mutex<Vec<(String, Vec<String>)>>,
    puts: AtomicUsize,
    gets: AtomicUsize,
    composes: AtomicUsize,
    deletes: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(BTreeMap::new()),
            failing: Mutex::new(HashSet::new()),
            compose_log: Mutex::new(Vec::new()),
            puts: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            composes: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    /// Make every later call of `op` fail.
    pub fn fail(&self, op: StoreOp) {
        lock(&self.failing).insert(op);
    }

    pub fn recover(&self, op: StoreOp) {
        lock(&self.failing).remove(&op);
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    pub fn insert(&self, key: impl Into<String>, data: Vec<u8>) {
        lock(&self.objects).insert(key.into(), data);
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn composes(&self) -> usize {
        self.composes.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Every composition request seen, as `(destination, sources)`.
    pub fn compose_calls(&self) -> Vec<(String, Vec<String>)> {
        lock(&self.compose_log).clone()
    }

    fn check(&self, op: StoreOp, key: &str) -> StorageResult<()> {
        if !lock(&self.failing).contains(&op) {
            return Ok(());
        }
        let message = "injected failure";
        Err(match op {
            StoreOp::Put => StorageError::upload_failed(key, message),
            StoreOp::Get => StorageError::download_failed(key, message),
            StoreOp::Compose => StorageError::compose_failed(key, message),
            StoreOp::Delete => StorageError::delete_failed(key, message),
        })
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(&self, key: &str, data: Vec<u8>, _content_type: &str) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.check(StoreOp::Put, key)?;
        lock(&self.objects).insert(key.to_string(), data);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check(StoreOp::Get, key)?;
        lock(&self.objects)
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn compose(&self, destination: &str, sources: &[String]) -> StorageResult<()> {
        self.composes.fetch_add(1, Ordering::SeqCst);
        lock(&self.compose_log).push((destination.to_string(), sources.to_vec()));
        self.check(StoreOp::Compose, destination)?;

        let mut objects = lock(&self.objects);
        let mut composed = Vec::new();
        for source in sources {
            let part = objects
                .get(source)
                .ok_or_else(|| StorageError::compose_failed(destination, format!("{source} missing")))?;
            composed.extend_from_slice(part);
        }
        objects.insert(destination.to_string(), composed);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check(StoreOp::Delete, key)?;
        lock(&self.objects).remove(key);
        Ok(())
    }
}
