//! Pipeline configuration: the element chain plus debug and resource settings.

use std::collections::HashMap;
use std::time::Duration;

use gstjob_common::error::{JobError, JobResult};
use serde::{Deserialize, Serialize};

use crate::element::{is_reserved_marker, Directive, ElementSpec};
use crate::object::base_name;

/// Default interval between progress reports and graph snapshots.
pub const DEFAULT_DOT_INTERVAL_SECS: u64 = 3;

/// Declarative description of one processing chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Container image the scheduler runs the worker with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Debug settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugConfig>,

    /// Ordered element chain.
    #[serde(default)]
    pub elements: Vec<ElementSpec>,

    /// Scheduler resource requirements, opaque to the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<serde_json::Value>,
}

/// Debug settings for a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugConfig {
    /// GStreamer debug threshold, 1 (errors) to 9 (memdump).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<u8>,

    /// Periodic graph snapshot settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dot: Option<DotConfig>,
}

/// Periodic graph snapshot settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DotConfig {
    /// Prefix inside the source bucket for snapshot objects.
    #[serde(default)]
    pub path: String,

    /// Optional rendered image format (`png`, `svg`, `jpg`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub render: String,

    /// Keep every snapshot under a timestamped name instead of overwriting.
    #[serde(default)]
    pub timestamped: bool,

    /// Seconds between snapshots.
    #[serde(default)]
    pub interval: u64,
}

/// Image formats graph snapshots can be rendered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFormat {
    Png,
    Svg,
    Jpg,
}

impl RenderFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "svg" => Some(Self::Svg),
            "jpg" | "jpeg" => Some(Self::Jpg),
            _ => None,
        }
    }

    /// File extension, also the Graphviz output type.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
            Self::Jpg => "jpg",
        }
    }
}

impl PipelineSpec {
    pub fn new(elements: Vec<ElementSpec>) -> Self {
        Self {
            elements,
            ..Self::default()
        }
    }

    /// Check the structural rules the resolver relies on.
    pub fn validate(&self) -> JobResult<()> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for (idx, element) in self.elements.iter().enumerate() {
            if !element.go_to.is_empty() && !element.link_to.is_empty() {
                return Err(JobError::spec(format!(
                    "Element #{idx} sets both goto ({}) and linkto ({})",
                    element.go_to, element.link_to
                )));
            }
            if matches!(element.directive(), Directive::Element) && element.name.is_empty() {
                return Err(JobError::spec(format!(
                    "Element #{idx} has no name, goto, or linkto"
                )));
            }
            if element.alias.is_empty() {
                continue;
            }
            if is_reserved_marker(&element.alias) {
                return Err(JobError::spec(format!(
                    "Element #{idx} uses the reserved name '{}' as its alias",
                    element.alias
                )));
            }
            if let Some(first) = seen.insert(&element.alias, idx) {
                return Err(JobError::spec(format!(
                    "Alias '{}' is declared by elements #{first} and #{idx}",
                    element.alias
                )));
            }
        }
        Ok(())
    }

    /// Index of the element declaring `alias`.
    pub fn position_of_alias(&self, alias: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.alias == alias)
    }

    /// Snapshot settings, if snapshots are enabled.
    pub fn dot(&self) -> Option<&DotConfig> {
        self.debug.as_ref().and_then(|d| d.dot.as_ref())
    }

    pub fn gst_debug_level(&self) -> Option<u8> {
        self.debug
            .as_ref()
            .and_then(|d| d.log_level)
            .filter(|level| *level > 0)
    }

    /// Interval between progress reports and snapshots.
    pub fn dot_interval(&self) -> Duration {
        let secs = self
            .dot()
            .map(|d| d.interval)
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_DOT_INTERVAL_SECS);
        Duration::from_secs(secs)
    }
}

impl DotConfig {
    /// Directory inside the source bucket snapshots for `src_key` go to.
    pub fn directory(&self, src_key: &str) -> String {
        let dir = format!("{}_debug", base_name(src_key));
        let prefix = self.path.trim_end_matches('/');
        if prefix.is_empty() {
            dir
        } else {
            format!("{prefix}/{dir}")
        }
    }

    pub fn render_format(&self) -> Option<RenderFormat> {
        if self.render.is_empty() {
            return None;
        }
        let format = RenderFormat::parse(&self.render);
        if format.is_none() {
            tracing::warn!(render = %self.render, "Unsupported dot render format, skipping render");
        }
        format
    }
}
