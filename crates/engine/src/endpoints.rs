//! Binding of the graph's source and sink nodes to object store endpoints.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use gst::prelude::*;
use gstjob_common::config::RunnerConfig;
use gstjob_common::error::{JobError, JobResult};
use gstjob_graph::EndpointFactory;
use gstjob_model::{ObjectDescriptor, StreamType};
use gstjob_object_store::{
    AccessKeys, BlockingWriter, ObjectStore, S3ObjectStore, SeekWriter, SharedWriter,
};
use gstreamer as gst;
use tokio::runtime::Handle;

use crate::sink::ObjectSink;
use crate::source::SourceElement;

/// Which side of the job an object belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRole {
    Source,
    Sink,
}

/// Resolves objects to stores and the source object to a readable element.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    /// Store holding `object`, authenticated for `role`.
    fn store(&self, object: &ObjectDescriptor, role: ObjectRole) -> JobResult<Arc<dyn ObjectStore>>;

    /// Element that reads `source`.
    async fn source_element(&self, source: &ObjectDescriptor) -> JobResult<SourceElement>;
}

/// S3/MinIO endpoints with static credentials; the source is read over a
/// presigned URL.
#[derive(Debug, Clone)]
pub struct S3StoreProvider {
    source_keys: AccessKeys,
    sink_keys: AccessKeys,
    presign_ttl: Duration,
}

impl S3StoreProvider {
    pub fn new(source_keys: AccessKeys, sink_keys: AccessKeys, presign_ttl: Duration) -> Self {
        Self {
            source_keys,
            sink_keys,
            presign_ttl,
        }
    }

    /// Read both credential pairs from the environment.
    pub fn from_env(config: &RunnerConfig) -> JobResult<Self> {
        Ok(Self::new(
            AccessKeys::source_from_env()?,
            AccessKeys::sink_from_env()?,
            Duration::from_secs(config.presign_ttl_secs),
        ))
    }

    fn s3(&self, object: &ObjectDescriptor, role: ObjectRole) -> JobResult<S3ObjectStore> {
        let keys = match role {
            ObjectRole::Source => &self.source_keys,
            ObjectRole::Sink => &self.sink_keys,
        };
        Ok(S3ObjectStore::new(object.endpoint()?, keys)?)
    }
}

#[async_trait]
impl StoreProvider for S3StoreProvider {
    fn store(&self, object: &ObjectDescriptor, role: ObjectRole) -> JobResult<Arc<dyn ObjectStore>> {
        Ok(Arc::new(self.s3(object, role)?))
    }

    async fn source_element(&self, source: &ObjectDescriptor) -> JobResult<SourceElement> {
        let store = self.s3(source, ObjectRole::Source)?;
        let url = store.presign_get(&source.key, self.presign_ttl).await?;
        tracing::info!(bucket = %store.bucket(), key = %source.key, "Presigned source object");
        Ok(SourceElement::http(url))
    }
}

/// A sink node's output writer.
#[derive(Debug, Clone)]
pub struct BoundWriter {
    pub key: String,
    pub stream_type: StreamType,
    pub writer: SharedWriter,
}

/// Creates the source element and one [`ObjectSink`] per materialized sink
/// node, remembering the writer bound to each.
pub struct ObjectEndpoints {
    source: SourceElement,
    sink_stores: Vec<Arc<dyn ObjectStore>>,
    part_size: u64,
    runtime: Handle,
    bound: Mutex<Vec<BoundWriter>>,
}

impl ObjectEndpoints {
    /// `sink_stores[i]` holds the object of sink descriptor `i`.
    pub fn new(
        source: SourceElement,
        sink_stores: Vec<Arc<dyn ObjectStore>>,
        part_size: u64,
        runtime: Handle,
    ) -> Self {
        Self {
            source,
            sink_stores,
            part_size,
            runtime,
            bound: Mutex::new(Vec::new()),
        }
    }

    /// Writers bound so far, in sink creation order.
    pub fn bound_writers(&self) -> Vec<BoundWriter> {
        self.bound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EndpointFactory for ObjectEndpoints {
    fn source_element(&self, _source: &ObjectDescriptor) -> JobResult<gst::Element> {
        self.source.build("source")
    }

    fn sink_element(&self, sink: &ObjectDescriptor, index: usize) -> JobResult<gst::Element> {
        let store = self
            .sink_stores
            .get(index)
            .cloned()
            .ok_or_else(|| JobError::construction(&sink.key, "no object store for sink"))?;

        let writer = SeekWriter::new(store.clone(), sink.key.clone(), self.part_size).shared();
        let element = ObjectSink::new(
            &format!("sink-{index}"),
            BlockingWriter::new(writer.clone(), self.runtime.clone()),
        );
        tracing::info!(
            bucket = %store.bucket(),
            key = %sink.key,
            stream_type = %sink.stream_type,
            part_size = self.part_size,
            "Bound sink to object"
        );

        self.bound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(BoundWriter {
                key: sink.key.clone(),
                stream_type: sink.stream_type,
                writer,
            });
        Ok(element.upcast())
    }
}
