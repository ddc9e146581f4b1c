//! The object store seam.

use async_trait::async_trait;

use crate::error::StorageResult;

/// Content type used for temporary parts and composed outputs.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Whole-object access to a single bucket.
///
/// Implementations only need whole-object uploads and a server-side
/// composition call; random access is layered on top by
/// [`SeekWriter`](crate::writer::SeekWriter).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket all keys are relative to.
    fn bucket(&self) -> &str;

    /// Upload `data` as the complete content of `key`.
    async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()>;

    /// Fetch the complete content of `key`.
    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Assemble `sources`, in order, into `destination`.
    async fn compose(&self, destination: &str, sources: &[String]) -> StorageResult<()>;

    async fn delete_object(&self, key: &str) -> StorageResult<()>;
}
