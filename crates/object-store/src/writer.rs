//! Part-based seekable writer.
//!
//! The output is split into fixed-size parts indexed by `position / part_size`.
//! A part is either resident (buffered in memory), uploaded (durable under a
//! temporary key, with the SHA-256 of the uploaded bytes recorded), or
//! untouched. Full parts are flushed as soon as a write completes them, so
//! memory stays bounded by the parts still being filled. Closing uploads the
//! remaining parts and composes every temporary part into the destination.

use std::collections::BTreeMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, trace, warn};

use crate::error::{StorageError, StorageResult};
use crate::store::{ObjectStore, OCTET_STREAM};

/// Writer shared between the element that produces output and the driver
/// that finalizes it.
pub type SharedWriter = Arc<tokio::sync::Mutex<SeekWriter>>;

/// Temporary key under which part `index` of `key` is stored.
pub fn part_key(key: &str, index: u64) -> String {
    format!("{}_tmp/{index}", key.trim_end_matches('/'))
}

fn checksum(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Closed,
    Aborted,
}

/// Random-access writer over a store that only accepts whole-part uploads.
///
/// Single producer only: callers serialize `write`/`set_cursor` themselves
/// (see [`SharedWriter`]).
pub struct SeekWriter {
    store: Arc<dyn ObjectStore>,
    key: String,
    part_size: u64,
    position: u64,
    resident: BTreeMap<u64, Vec<u8>>,
    uploaded: BTreeMap<u64, String>,
    state: WriterState,
}

impl std::fmt::Debug for SeekWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeekWriter")
            .field("bucket", &self.store.bucket())
            .field("key", &self.key)
            .field("part_size", &self.part_size)
            .field("position", &self.position)
            .field("resident", &self.resident.keys().collect::<Vec<_>>())
            .field("uploaded", &self.uploaded.keys().collect::<Vec<_>>())
            .field("state", &self.state)
            .finish()
    }
}

impl SeekWriter {
    pub fn new(store: Arc<dyn ObjectStore>, key: impl Into<String>, part_size: u64) -> Self {
        Self {
            store,
            key: key.into(),
            part_size: part_size.max(1),
            position: 0,
            resident: BTreeMap::new(),
            uploaded: BTreeMap::new(),
            state: WriterState::Open,
        }
    }

    /// Wrap in the shared handle used by sinks and the driver.
    pub fn shared(self) -> SharedWriter {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// Where the next write lands.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_finished(&self) -> bool {
        self.state != WriterState::Open
    }

    /// Number of parts currently buffered in memory.
    pub fn resident_parts(&self) -> usize {
        self.resident.len()
    }

    /// Move the cursor. Performs no I/O.
    pub fn set_cursor(&mut self, position: u64) {
        trace!(key = %self.key, position, "Setting writer cursor");
        self.position = position;
    }

    /// Write `data` at the cursor and advance it, then flush full parts.
    pub async fn write(&mut self, data: &[u8]) -> StorageResult<usize> {
        self.ensure_open()?;
        if self.position.checked_add(data.len() as u64).is_none() {
            return Err(StorageError::CursorOverflow {
                key: self.key.clone(),
                position: self.position,
                len: data.len(),
            });
        }
        let part_size = self.part_size as usize;
        let mut remaining = data;

        while !remaining.is_empty() {
            let index = self.position / self.part_size;
            let offset = (self.position % self.part_size) as usize;
            let buffer = self.part_buffer(index).await?;

            let end = (offset + remaining.len()).min(part_size);
            if buffer.len() < end {
                buffer.resize(end, 0);
            }
            let count = end - offset;
            buffer[offset..end].copy_from_slice(&remaining[..count]);

            trace!(key = %self.key, part = index, offset, bytes = count, "Buffered bytes");
            self.position += count as u64;
            remaining = &remaining[count..];
        }

        self.flush_full().await?;
        Ok(data.len())
    }

    /// Flush remaining parts, compose them into the destination, and remove
    /// the temporary parts.
    ///
    /// Parts the cursor skipped over are uploaded zero-filled, and short parts
    /// before the last one are zero-padded, so every composed part except the
    /// last is exactly `part_size` long.
    pub async fn close(&mut self) -> StorageResult<()> {
        self.ensure_open()?;

        let last = self
            .resident
            .keys()
            .chain(self.uploaded.keys())
            .copied()
            .max();
        let Some(last) = last else {
            info!(key = %self.key, "No data was written to object");
            self.state = WriterState::Closed;
            return Ok(());
        };

        info!(key = %self.key, "Flushing remaining parts");
        for index in 0..=last {
            if let Some(buffer) = self.resident.get_mut(&index) {
                if index < last && (buffer.len() as u64) < self.part_size {
                    buffer.resize(self.part_size as usize, 0);
                }
                self.flush_part(index).await?;
            } else if !self.uploaded.contains_key(&index) {
                debug!(key = %self.key, part = index, "Filling skipped part with zeros");
                self.resident.insert(index, vec![0; self.part_size as usize]);
                self.flush_part(index).await?;
            }
        }

        let sources: Vec<String> = (0..=last).map(|i| part_key(&self.key, i)).collect();
        info!(
            bucket = %self.store.bucket(),
            key = %self.key,
            parts = sources.len(),
            "Composing parts into final object"
        );
        self.store.compose(&self.key, &sources).await?;
        self.state = WriterState::Closed;

        info!(key = %self.key, "Cleaning up temporary parts");
        let mut failures = Vec::new();
        for source in &sources {
            if let Err(e) = self.store.delete_object(source).await {
                warn!(key = %source, error = %e, "Failed to remove temporary part");
                failures.push(e.to_string());
            }
        }
        self.uploaded.clear();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(StorageError::CleanupFailed {
                key: self.key.clone(),
                failed: failures.len(),
                message: failures.join("; "),
            })
        }
    }

    /// Drop buffered data and remove uploaded temporary parts without
    /// composing. Failures are logged only.
    pub async fn abort(&mut self) {
        if self.state == WriterState::Aborted {
            return;
        }
        self.state = WriterState::Aborted;
        self.resident.clear();

        let uploaded = std::mem::take(&mut self.uploaded);
        if uploaded.is_empty() {
            return;
        }
        info!(key = %self.key, parts = uploaded.len(), "Removing temporary parts of aborted output");
        for index in uploaded.keys() {
            let key = part_key(&self.key, *index);
            if let Err(e) = self.store.delete_object(&key).await {
                warn!(key = %key, error = %e, "Failed to remove temporary part");
            }
        }
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.state == WriterState::Open {
            Ok(())
        } else {
            Err(StorageError::WriterFinished(self.key.clone()))
        }
    }

    async fn part_buffer(&mut self, index: u64) -> StorageResult<&mut Vec<u8>> {
        if !self.resident.contains_key(&index) {
            let buffer = if self.uploaded.contains_key(&index) {
                debug!(key = %self.key, part = index, "Fetching uploaded part for rewriting");
                self.store.get_object(&part_key(&self.key, index)).await?
            } else {
                Vec::new()
            };
            self.resident.insert(index, buffer);
        }
        Ok(self.resident.entry(index).or_default())
    }

    async fn flush_full(&mut self) -> StorageResult<()> {
        let full: Vec<u64> = self
            .resident
            .iter()
            .filter(|(_, buffer)| buffer.len() as u64 == self.part_size)
            .map(|(index, _)| *index)
            .collect();
        for index in full {
            self.flush_part(index).await?;
        }
        Ok(())
    }

    /// Upload a resident part. The part stays resident until the upload
    /// succeeds, so a failed flush can be retried.
    async fn flush_part(&mut self, index: u64) -> StorageResult<()> {
        let Some(buffer) = self.resident.get(&index) else {
            return Ok(());
        };
        let sum = checksum(buffer);
        if self.uploaded.get(&index) == Some(&sum) {
            debug!(key = %self.key, part = index, "Part unchanged, skipping upload");
            self.resident.remove(&index);
            return Ok(());
        }

        let key = part_key(&self.key, index);
        debug!(key = %key, part = index, bytes = buffer.len(), "Uploading part");
        self.store
            .put_object(&key, buffer.clone(), OCTET_STREAM)
            .await?;
        self.resident.remove(&index);
        self.uploaded.insert(index, sum);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryObjectStore, StoreOp};
    use proptest::prelude::*;

    const PART: u64 = 8;

    fn writer(store: &Arc<MemoryObjectStore>) -> SeekWriter {
        SeekWriter::new(store.clone(), "out/video.mp4", PART)
    }

    fn store() -> Arc<MemoryObjectStore> {
        Arc::new(MemoryObjectStore::new("media"))
    }

    #[test]
    fn test_part_key() {
        assert_eq!(part_key("out/video.mp4", 3), "out/video.mp4_tmp/3");
        assert_eq!(part_key("video.mp4", 0), "video.mp4_tmp/0");
    }

    #[tokio::test]
    async fn test_small_write_single_part() {
        let store = store();
        let mut w = writer(&store);
        w.write(b"abc").await.unwrap();
        assert_eq!(store.puts(), 0);

        w.close().await.unwrap();
        assert_eq!(store.puts(), 1);
        let calls = store.compose_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "out/video.mp4");
        assert_eq!(calls[0].1, vec!["out/video.mp4_tmp/0".to_string()]);
        assert_eq!(store.object("out/video.mp4").unwrap(), b"abc");
        assert_eq!(store.keys(), vec!["out/video.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_full_part_flushes_before_close() {
        let store = store();
        let mut w = writer(&store);
        w.write(&[7u8; PART as usize]).await.unwrap();
        assert_eq!(store.puts(), 1);
        assert_eq!(w.resident_parts(), 0);
        assert!(store.object("out/video.mp4_tmp/0").is_some());
    }

    #[tokio::test]
    async fn test_unchanged_part_is_not_reuploaded() {
        let store = store();
        let mut w = writer(&store);
        let data = [3u8; PART as usize];
        w.write(&data).await.unwrap();
        assert_eq!(store.puts(), 1);

        w.set_cursor(0);
        w.write(&data).await.unwrap();
        assert_eq!(store.gets(), 1);
        assert_eq!(store.puts(), 1);
    }

    #[tokio::test]
    async fn test_empty_close() {
        let store = store();
        let mut w = writer(&store);
        w.close().await.unwrap();
        assert_eq!(store.puts(), 0);
        assert_eq!(store.composes(), 0);
        assert!(w.is_finished());
    }

    #[tokio::test]
    async fn test_write_spanning_parts() {
        let store = store();
        let mut w = writer(&store);
        let data: Vec<u8> = (0..20).collect();
        assert_eq!(w.write(&data).await.unwrap(), 20);
        assert_eq!(w.position(), 20);
        assert_eq!(store.puts(), 2);
        assert_eq!(w.resident_parts(), 1);

        w.close().await.unwrap();
        assert_eq!(store.object("out/video.mp4").unwrap(), data);
        assert_eq!(store.compose_calls()[0].1.len(), 3);
    }

    #[tokio::test]
    async fn test_patch_uploaded_part() {
        let store = store();
        let mut w = writer(&store);
        w.write(b"0123456789abcdef").await.unwrap();
        w.write(b"tail").await.unwrap();

        w.set_cursor(2);
        w.write(b"XY").await.unwrap();
        assert_eq!(store.gets(), 1);
        assert_eq!(store.puts(), 3);

        w.close().await.unwrap();
        assert_eq!(
            store.object("out/video.mp4").unwrap(),
            b"01XY456789abcdeftail"
        );
    }

    #[tokio::test]
    async fn test_skipped_parts_are_zero_filled() {
        let store = store();
        let mut w = writer(&store);
        w.write(b"ab").await.unwrap();
        w.set_cursor(2 * PART);
        w.write(b"cd").await.unwrap();
        w.close().await.unwrap();

        let mut expected = vec![0u8; 2 * PART as usize + 2];
        expected[..2].copy_from_slice(b"ab");
        expected[2 * PART as usize..].copy_from_slice(b"cd");
        assert_eq!(store.object("out/video.mp4").unwrap(), expected);
    }

    #[tokio::test]
    async fn test_upload_failure_is_reported() {
        let store = store();
        store.fail(StoreOp::Put);
        let mut w = writer(&store);
        let err = w.write(&[1u8; PART as usize]).await.unwrap_err();
        assert!(matches!(err, StorageError::UploadFailed { .. }));
    }

    #[tokio::test]
    async fn test_failed_upload_is_retried_on_close() {
        let store = store();
        store.fail(StoreOp::Put);
        let mut w = writer(&store);
        let data: Vec<u8> = (0..PART as u8).collect();
        assert!(w.write(&data).await.is_err());
        assert_eq!(w.resident_parts(), 1);
        assert!(store.keys().is_empty());

        store.recover(StoreOp::Put);
        w.write(b"zz").await.unwrap();
        w.close().await.unwrap();
        let mut expected = data.clone();
        expected.extend_from_slice(b"zz");
        assert_eq!(store.object("out/video.mp4").unwrap(), expected);
    }

    #[tokio::test]
    async fn test_write_past_the_largest_offset_is_rejected() {
        let store = store();
        let mut w = writer(&store);
        w.set_cursor(u64::MAX - 2);
        let err = w.write(b"four").await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::CursorOverflow { len: 4, .. }
        ));
        assert_eq!(w.position(), u64::MAX - 2);
        assert_eq!(w.resident_parts(), 0);

        w.write(b"ab").await.unwrap();
        assert_eq!(w.position(), u64::MAX);
    }

    #[tokio::test]
    async fn test_compose_failure_is_reported() {
        let store = store();
        store.fail(StoreOp::Compose);
        let mut w = writer(&store);
        w.write(b"abc").await.unwrap();
        let err = w.close().await.unwrap_err();
        assert!(matches!(err, StorageError::ComposeFailed { .. }));
    }

    #[tokio::test]
    async fn test_cleanup_failure_keeps_composed_object() {
        let store = store();
        store.fail(StoreOp::Delete);
        let mut w = writer(&store);
        w.write(b"abc").await.unwrap();
        let err = w.close().await.unwrap_err();
        assert!(matches!(err, StorageError::CleanupFailed { failed: 1, .. }));
        assert_eq!(store.object("out/video.mp4").unwrap(), b"abc");
        assert!(w.is_finished());
    }

    #[tokio::test]
    async fn test_abort_removes_temporary_parts() {
        let store = store();
        let mut w = writer(&store);
        w.write(&[9u8; 2 * PART as usize + 1]).await.unwrap();
        assert_eq!(store.keys().len(), 2);

        w.abort().await;
        assert!(store.keys().is_empty());
        assert_eq!(store.composes(), 0);
        assert!(matches!(
            w.write(b"x").await,
            Err(StorageError::WriterFinished(_))
        ));
    }

    #[tokio::test]
    async fn test_write_after_close_rejected() {
        let store = store();
        let mut w = writer(&store);
        w.close().await.unwrap();
        assert!(w.write(b"late").await.is_err());
        assert!(w.close().await.is_err());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Write(Vec<u8>),
        Seek(u64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => proptest::collection::vec(any::<u8>(), 0..20).prop_map(Op::Write),
            1 => (0u64..40).prop_map(Op::Seek),
        ]
    }

    proptest! {
        #[test]
        fn prop_composed_object_matches_flat_model(ops in proptest::collection::vec(op_strategy(), 0..24)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let store = store();
            let mut w = writer(&store);
            let mut model: Vec<u8> = Vec::new();
            let mut cursor = 0usize;

            runtime.block_on(async {
                for op in &ops {
                    match op {
                        Op::Write(data) => {
                            w.write(data).await.unwrap();
                            if !data.is_empty() {
                                let end = cursor + data.len();
                                if model.len() < end {
                                    model.resize(end, 0);
                                }
                                model[cursor..end].copy_from_slice(data);
                            }
                            cursor += data.len();
                        }
                        Op::Seek(pos) => {
                            w.set_cursor(*pos);
                            cursor = *pos as usize;
                        }
                    }
                    for index in 0..=(cursor as u64 / PART) {
                        prop_assert!(w.resident.get(&index).map_or(true, |b| (b.len() as u64) < PART));
                    }
                }
                w.close().await.unwrap();
                Ok(())
            })?;

            if model.is_empty() {
                prop_assert!(store.object("out/video.mp4").is_none());
            } else {
                prop_assert_eq!(store.object("out/video.mp4").unwrap(), model);
            }
            prop_assert_eq!(store.keys().iter().filter(|k| k.contains("_tmp/")).count(), 0);
        }
    }
}
