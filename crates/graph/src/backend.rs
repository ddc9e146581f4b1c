//! The seam between the topology resolver and the media framework.

use gstjob_common::error::JobResult;
use gstjob_model::{ElementSpec, ObjectDescriptor};

/// How a node exposes its outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Outputs exist at build time; link immediately.
    Static,
    /// Outputs only appear once the node processes data; defer linking
    /// until the node reports that all outputs are exposed.
    Deferred,
}

/// Element creation and linking primitives the resolver is written against.
///
/// Every method takes `&self` so one backend can serve both the build pass
/// and deferred link resolution on streaming threads.
pub trait GraphBackend {
    /// Handle to one created element.
    type Node: Clone + Send + Sync;
    /// Handle to one output endpoint of a node.
    type Output;

    /// Create the element an entry describes, with its properties applied.
    fn make_element(&self, spec: &ElementSpec) -> JobResult<Self::Node>;

    /// Create the element that reads the job's source object.
    fn make_source(&self, source: &ObjectDescriptor) -> JobResult<Self::Node>;

    /// Create the element that writes to a sink object.
    fn make_sink(&self, sink: &ObjectDescriptor, index: usize) -> JobResult<Self::Node>;

    fn output_mode(&self, node: &Self::Node) -> OutputMode;

    /// Link `from` to `to` now.
    fn link(&self, from: &Self::Node, to: &Self::Node) -> JobResult<()>;

    /// Outputs of `node` that are not linked yet.
    fn unlinked_outputs(&self, node: &Self::Node) -> Vec<Self::Output>;

    /// Whether `output` is format-compatible with a free input of `peer`.
    fn can_link_output(&self, output: &Self::Output, peer: &Self::Node) -> bool;

    fn link_output(&self, output: &Self::Output, peer: &Self::Node) -> JobResult<()>;

    /// Name used in logs.
    fn output_name(&self, output: &Self::Output) -> String;
}
