//! A single worker invocation: one pipeline, one source, its sinks.

use gstjob_common::config::{
    optional_env, required_env, PIPELINE_CONFIG_ENV, PIPELINE_KIND_ENV, SINK_OBJECTS_ENV,
    SRC_KEY_ENV, SRC_OBJECT_ENV,
};
use gstjob_common::error::{JobError, JobResult};
use serde::{Deserialize, Serialize};

use crate::kind::PipelineKind;
use crate::object::{ObjectDescriptor, StreamType};
use crate::pipeline::PipelineSpec;

/// Everything a worker needs to process one source object.
///
/// Parsing only checks the wire shape; [`JobSpec::validate`] runs when the
/// job's graph is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub pipeline: PipelineSpec,
    pub source: ObjectDescriptor,
    pub sinks: Vec<ObjectDescriptor>,
}

impl JobSpec {
    pub fn new(
        pipeline: PipelineSpec,
        source: ObjectDescriptor,
        sinks: Vec<ObjectDescriptor>,
    ) -> Self {
        Self {
            pipeline,
            source,
            sinks,
        }
    }

    /// Parse the three serialized job inputs.
    pub fn from_json_parts(pipeline: &str, source: &str, sinks: &str) -> JobResult<Self> {
        let pipeline: PipelineSpec = parse_json(PIPELINE_CONFIG_ENV, pipeline)?;
        let source: ObjectDescriptor = parse_json(SRC_OBJECT_ENV, source)?;
        let sinks: Vec<ObjectDescriptor> = parse_json(SINK_OBJECTS_ENV, sinks)?;
        Ok(Self::new(pipeline, source, sinks))
    }

    /// Derive the job a pipeline kind runs for the object at `src_key`.
    ///
    /// The source lives on the kind's source endpoint; sink keys come from
    /// each sink endpoint's destination key template.
    pub fn from_kind(kind: &PipelineKind, src_key: &str) -> JobResult<Self> {
        let source = ObjectDescriptor {
            key: src_key.to_string(),
            config: kind.src_config(),
            stream_type: StreamType::All,
        };
        Ok(Self::new(
            kind.pipeline().clone(),
            source,
            kind.sink_objects(src_key)?,
        ))
    }

    /// Parse a serialized pipeline kind and derive the job for `src_key`.
    pub fn from_kind_json(kind: &str, src_key: &str) -> JobResult<Self> {
        let kind: PipelineKind = parse_json(PIPELINE_KIND_ENV, kind)?;
        Self::from_kind(&kind, src_key)
    }

    /// Read the job from the worker's environment, either as a pipeline kind
    /// plus source key or as explicit pipeline, source and sink lists.
    pub fn from_env() -> JobResult<Self> {
        if let Some(kind) = optional_env(PIPELINE_KIND_ENV) {
            let src_key = required_env(SRC_KEY_ENV)?;
            return Self::from_kind_json(&kind, &src_key);
        }
        let pipeline = required_env(PIPELINE_CONFIG_ENV)?;
        let source = required_env(SRC_OBJECT_ENV)?;
        let sinks = required_env(SINK_OBJECTS_ENV)?;
        Self::from_json_parts(&pipeline, &source, &sinks)
    }

    pub fn validate(&self) -> JobResult<()> {
        self.pipeline.validate()?;
        self.source.endpoint()?;
        if self.sinks.is_empty() {
            return Err(JobError::spec("No sink configured"));
        }
        for sink in &self.sinks {
            sink.endpoint()?;
            if sink.key.is_empty() {
                return Err(JobError::spec(format!(
                    "{} sink object has an empty key",
                    sink.stream_type
                )));
            }
        }
        Ok(())
    }

    /// Sinks carrying the given stream type, in declaration order.
    pub fn sinks_of(&self, stream_type: StreamType) -> impl Iterator<Item = &ObjectDescriptor> {
        self.sinks
            .iter()
            .filter(move |sink| sink.stream_type == stream_type)
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(what: &str, raw: &str) -> JobResult<T> {
    serde_json::from_str(raw).map_err(|e| JobError::spec(format!("{what} is not valid: {e}")))
}
