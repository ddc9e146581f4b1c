//! gstjob Graph
//!
//! Turns a declared element chain into a linked processing graph.
//!
//! - **Coercion:** textual property values to element-native types
//! - **Topology:** alias, `goto` and `linkto` resolution, sink binding, and
//!   deferred linking of outputs that only appear at run time
//! - **Pipeline:** the GStreamer backend the topology is built with
//!
//! The resolver only talks to [`GraphBackend`], so its behavior can be
//! exercised without a media framework.

pub mod backend;
pub mod coerce;
pub mod pipeline;
pub mod topology;

pub use backend::{GraphBackend, OutputMode};
pub use coerce::{coerce, CoercionError, PropertyKind, PropertyValue};
pub use pipeline::{apply_properties, init_gstreamer, watch_deferred_outputs, EndpointFactory, GstGraph};
pub use topology::{GraphNode, NodeId, NodeRole, Topology};
