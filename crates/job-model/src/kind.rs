//! Pipeline kinds the control plane issues jobs for.

use std::fmt;

use gstjob_common::error::{JobError, JobResult};
use serde::{Deserialize, Serialize};

use crate::object::{ObjectDescriptor, SourceSinkConfig, StreamType};
use crate::pipeline::PipelineSpec;

/// A transform writes the whole processed output to one sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Applied underneath `src` and `sink` where they leave fields empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub globals: Option<SourceSinkConfig>,
    pub src: SourceSinkConfig,
    pub sink: SourceSinkConfig,
    pub pipeline: PipelineSpec,
}

/// A split transform routes video and audio branches to separate sinks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitTransformConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub globals: Option<SourceSinkConfig>,
    pub src: SourceSinkConfig,
    /// Receives the branch linked to `video-out`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<SourceSinkConfig>,
    /// Receives the branch linked to `audio-out`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<SourceSinkConfig>,
    pub pipeline: PipelineSpec,
}

/// Closed set of pipeline kinds, tagged by `kind` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PipelineKind {
    Transform(TransformConfig),
    SplitTransform(SplitTransformConfig),
}

/// Discriminant of a [`PipelineKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindName {
    Transform,
    SplitTransform,
}

impl fmt::Display for KindName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transform => f.write_str("Transform"),
            Self::SplitTransform => f.write_str("SplitTransform"),
        }
    }
}

impl PipelineKind {
    pub fn kind(&self) -> KindName {
        match self {
            Self::Transform(_) => KindName::Transform,
            Self::SplitTransform(_) => KindName::SplitTransform,
        }
    }

    pub fn pipeline(&self) -> &PipelineSpec {
        match self {
            Self::Transform(cfg) => &cfg.pipeline,
            Self::SplitTransform(cfg) => &cfg.pipeline,
        }
    }

    fn globals(&self) -> Option<&SourceSinkConfig> {
        match self {
            Self::Transform(cfg) => cfg.globals.as_ref(),
            Self::SplitTransform(cfg) => cfg.globals.as_ref(),
        }
    }

    /// Source configuration with globals applied.
    pub fn src_config(&self) -> SourceSinkConfig {
        let src = match self {
            Self::Transform(cfg) => &cfg.src,
            Self::SplitTransform(cfg) => &cfg.src,
        };
        src.merged_over(self.globals())
    }

    /// The first configured sink with globals applied. Split transforms
    /// prefer the video sink.
    pub fn sink_config(&self) -> Option<SourceSinkConfig> {
        let sink = match self {
            Self::Transform(cfg) => Some(&cfg.sink),
            Self::SplitTransform(cfg) => cfg.video.as_ref().or(cfg.audio.as_ref()),
        };
        sink.map(|s| s.merged_over(self.globals()))
    }

    /// Sink object descriptors for a job processing `src_key`.
    pub fn sink_objects(&self, src_key: &str) -> JobResult<Vec<ObjectDescriptor>> {
        let targets: Vec<(&SourceSinkConfig, StreamType)> = match self {
            Self::Transform(cfg) => vec![(&cfg.sink, StreamType::All)],
            Self::SplitTransform(cfg) => {
                let mut targets = Vec::with_capacity(2);
                if let Some(video) = &cfg.video {
                    targets.push((video, StreamType::Video));
                }
                if let Some(audio) = &cfg.audio {
                    targets.push((audio, StreamType::Audio));
                }
                targets
            }
        };

        targets
            .into_iter()
            .map(|(config, stream_type)| {
                let config = config.merged_over(self.globals());
                let endpoint = config.minio.as_ref().ok_or_else(|| {
                    JobError::spec(format!(
                        "{} {stream_type} sink has no MinIO configuration",
                        self.kind()
                    ))
                })?;
                Ok(ObjectDescriptor {
                    key: endpoint.destination_key(src_key),
                    config,
                    stream_type,
                })
            })
            .collect()
    }
}
