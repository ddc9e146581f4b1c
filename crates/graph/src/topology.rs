//! Topology resolver: flat, alias-addressed element chains to linked graphs.
//!
//! Entries are processed in declaration order while tracking the current
//! tail node and an alias registry:
//!
//! - a default entry materializes its element and links the tail to it
//! - `goto` re-points the tail at an aliased node without linking
//! - `linkto` links the tail (through the entry's own element, if it names
//!   one) to an alias or to a sink reserved by `video-out` / `audio-out`
//!
//! Links out of nodes whose outputs only appear at run time are recorded as
//! pending peers and resolved by [`Topology::outputs_ready`].

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use gstjob_common::error::{JobError, JobResult};
use gstjob_model::{Directive, LinkTarget, ObjectDescriptor, PipelineSpec, StreamType};
use tracing::{debug, info, warn};

use crate::backend::{GraphBackend, OutputMode};

/// Index of a node inside a [`Topology`].
pub type NodeId = usize;

/// What a node stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRole {
    /// Reads the job's source object.
    Source,
    /// Materialized from the element chain entry at `entry`.
    Element { entry: usize },
    /// Writes to the sink descriptor at `descriptor`.
    Sink {
        descriptor: usize,
        stream_type: StreamType,
        key: String,
        implicit: bool,
    },
}

/// One node of the resolved graph.
#[derive(Debug)]
pub struct GraphNode<N> {
    pub id: NodeId,
    pub label: String,
    pub role: NodeRole,
    pub handle: N,
    /// Nodes waiting for this node's run-time outputs, in registration order.
    pub pending_peers: Vec<NodeId>,
}

impl<N> GraphNode<N> {
    pub fn is_sink(&self) -> bool {
        matches!(self.role, NodeRole::Sink { .. })
    }
}

/// A resolved processing graph.
///
/// Immutable after [`Topology::build`] except for the table of resolved
/// deferred links, which is guarded by a lock so concurrent "outputs ready"
/// notifications never race on a peer.
#[derive(Debug)]
pub struct Topology<N> {
    nodes: Vec<GraphNode<N>>,
    aliases: HashMap<String, NodeId>,
    source: NodeId,
    sinks: Vec<NodeId>,
    implicit_sink: Option<NodeId>,
    resolved: Mutex<HashSet<(NodeId, NodeId)>>,
}

struct Resolver<'a, B: GraphBackend> {
    backend: &'a B,
    pipeline: &'a PipelineSpec,
    sink_objects: &'a [ObjectDescriptor],
    nodes: Vec<GraphNode<B::Node>>,
    aliases: HashMap<String, NodeId>,
    entries: HashMap<usize, NodeId>,
    consumed: HashSet<usize>,
    sinks: Vec<NodeId>,
}

impl<'a, B: GraphBackend> Resolver<'a, B> {
    fn add_node(&mut self, label: String, role: NodeRole, handle: B::Node) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(GraphNode {
            id,
            label,
            role,
            handle,
            pending_peers: Vec::new(),
        });
        id
    }

    /// The node for chain entry `idx`, materializing it on first use.
    fn entry_node(&mut self, idx: usize) -> JobResult<NodeId> {
        if let Some(id) = self.entries.get(&idx) {
            return Ok(*id);
        }
        let pipeline = self.pipeline;
        let spec = &pipeline.elements[idx];
        let handle = self.backend.make_element(spec)?;
        let id = self.add_node(spec.label().to_string(), NodeRole::Element { entry: idx }, handle);
        debug!(node = id, element = %spec.name, alias = %spec.alias, "Materialized element");

        self.entries.insert(idx, id);
        if !spec.alias.is_empty() {
            self.aliases.insert(spec.alias.clone(), id);
        }
        Ok(id)
    }

    fn resolve_alias(&mut self, alias: &str) -> JobResult<NodeId> {
        if let Some(id) = self.aliases.get(alias) {
            return Ok(*id);
        }
        let idx = self
            .pipeline
            .position_of_alias(alias)
            .filter(|idx| !self.pipeline.elements[*idx].name.is_empty())
            .ok_or_else(|| JobError::unresolved_alias(alias))?;
        self.entry_node(idx)
    }

    fn sink_node(&mut self, stream_type: StreamType, implicit: bool) -> JobResult<NodeId> {
        let sink_objects = self.sink_objects;
        let (descriptor, object) = sink_objects
            .iter()
            .enumerate()
            .find(|(idx, object)| {
                object.stream_type == stream_type && !self.consumed.contains(idx)
            })
            .ok_or_else(|| JobError::missing_sink(stream_type.to_string()))?;
        let handle = self.backend.make_sink(object, descriptor)?;
        self.consumed.insert(descriptor);

        let role = NodeRole::Sink {
            descriptor,
            stream_type,
            key: object.key.clone(),
            implicit,
        };
        let id = self.add_node(format!("{stream_type}-out:{}", object.key), role, handle);
        info!(node = id, key = %object.key, %stream_type, implicit, "Bound sink");
        self.sinks.push(id);
        Ok(id)
    }

    /// Link `from` to `to`, or register `to` as a pending peer when `from`
    /// only exposes outputs at run time.
    fn connect(&mut self, from: NodeId, to: NodeId) -> JobResult<()> {
        let from_label = self.nodes[from].label.clone();
        let to_label = self.nodes[to].label.clone();
        if from == to {
            return Err(JobError::link(from_label, to_label, "cannot link a node to itself"));
        }
        if self.nodes[from].is_sink() {
            return Err(JobError::link(from_label, to_label, "sink nodes have no outputs"));
        }

        match self.backend.output_mode(&self.nodes[from].handle) {
            OutputMode::Static => {
                self.backend
                    .link(&self.nodes[from].handle, &self.nodes[to].handle)?;
                debug!(from = %from_label, to = %to_label, "Linked");
            }
            OutputMode::Deferred => {
                self.nodes[from].pending_peers.push(to);
                debug!(from = %from_label, to = %to_label, "Deferred link until outputs are exposed");
            }
        }
        Ok(())
    }
}

impl<N: Clone + Send + Sync> Topology<N> {
    /// Resolve `pipeline` into a linked graph between `source` and `sinks`.
    pub fn build<B>(
        backend: &B,
        pipeline: &PipelineSpec,
        source: &ObjectDescriptor,
        sinks: &[ObjectDescriptor],
    ) -> JobResult<Self>
    where
        B: GraphBackend<Node = N>,
    {
        pipeline.validate()?;

        let mut resolver = Resolver {
            backend,
            pipeline,
            sink_objects: sinks,
            nodes: Vec::new(),
            aliases: HashMap::new(),
            entries: HashMap::new(),
            consumed: HashSet::new(),
            sinks: Vec::new(),
        };

        let source_handle = backend.make_source(source)?;
        let source_id = resolver.add_node(
            format!("source:{}", source.key),
            NodeRole::Source,
            source_handle,
        );

        let mut tail = source_id;
        let mut routed_to_marker = false;

        for (idx, entry) in pipeline.elements.iter().enumerate() {
            match entry.directive() {
                Directive::GoTo(alias) => {
                    tail = resolver.resolve_alias(alias)?;
                }
                Directive::LinkTo(target) => {
                    let origin = tail;
                    let from = if entry.name.is_empty() {
                        tail
                    } else {
                        let node = resolver.entry_node(idx)?;
                        resolver.connect(tail, node)?;
                        node
                    };
                    match target {
                        LinkTarget::Marker(stream_type) => {
                            let sink = resolver.sink_node(stream_type, false)?;
                            resolver.connect(from, sink)?;
                            routed_to_marker = true;
                            tail = origin;
                        }
                        LinkTarget::Alias(alias) => {
                            let target = resolver.resolve_alias(alias)?;
                            resolver.connect(from, target)?;
                            tail = target;
                        }
                    }
                }
                Directive::Element => {
                    let node = resolver.entry_node(idx)?;
                    resolver.connect(tail, node)?;
                    tail = node;
                }
            }
        }

        let implicit_sink = if routed_to_marker {
            None
        } else {
            let sink = resolver.sink_node(StreamType::All, true)?;
            resolver.connect(tail, sink)?;
            Some(sink)
        };

        info!(
            nodes = resolver.nodes.len(),
            sinks = resolver.sinks.len(),
            deferred = resolver.nodes.iter().filter(|n| !n.pending_peers.is_empty()).count(),
            "Resolved pipeline topology"
        );

        Ok(Self {
            nodes: resolver.nodes,
            aliases: resolver.aliases,
            source: source_id,
            sinks: resolver.sinks,
            implicit_sink,
            resolved: Mutex::new(HashSet::new()),
        })
    }

    pub fn nodes(&self) -> &[GraphNode<N>] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode<N>> {
        self.nodes.get(id)
    }

    pub fn source(&self) -> &GraphNode<N> {
        &self.nodes[self.source]
    }

    pub fn sinks(&self) -> impl Iterator<Item = &GraphNode<N>> {
        self.sinks.iter().map(|id| &self.nodes[*id])
    }

    pub fn implicit_sink(&self) -> Option<&GraphNode<N>> {
        self.implicit_sink.map(|id| &self.nodes[id])
    }

    /// Node registered for `alias`.
    pub fn alias(&self, alias: &str) -> Option<NodeId> {
        self.aliases.get(alias).copied()
    }

    /// Nodes with links waiting on run-time outputs.
    pub fn deferred_nodes(&self) -> impl Iterator<Item = &GraphNode<N>> {
        self.nodes.iter().filter(|n| !n.pending_peers.is_empty())
    }

    /// Link the run-time outputs of node `id` to its pending peers.
    ///
    /// Each unlinked output goes to the first pending peer, in registration
    /// order, that accepts it; outputs nothing accepts stay unlinked. A link
    /// attempt that fails leaves the output unlinked and the peer available.
    /// Safe to call repeatedly: linked outputs and already-linked peers are
    /// skipped.
    /// Returns the number of links made by this call.
    pub fn outputs_ready<B>(&self, backend: &B, id: NodeId) -> JobResult<usize>
    where
        B: GraphBackend<Node = N>,
    {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| JobError::runtime(format!("Unknown graph node {id}")))?;
        if node.pending_peers.is_empty() {
            return Ok(0);
        }

        let mut resolved = self.resolved.lock().unwrap_or_else(PoisonError::into_inner);
        let mut linked = 0;

        for output in backend.unlinked_outputs(&node.handle) {
            let peer = node.pending_peers.iter().copied().find(|peer| {
                !resolved.contains(&(id, *peer))
                    && backend.can_link_output(&output, &self.nodes[*peer].handle)
            });
            let output_name = backend.output_name(&output);
            let Some(peer) = peer else {
                info!(node = %node.label, output = %output_name, "No compatible pending peer, leaving output unlinked");
                continue;
            };

            if let Err(e) = backend.link_output(&output, &self.nodes[peer].handle) {
                warn!(node = %node.label, output = %output_name, peer = %self.nodes[peer].label, error = %e, "Failed to link run-time output, skipping it");
                continue;
            }
            resolved.insert((id, peer));
            linked += 1;
            info!(node = %node.label, output = %output_name, peer = %self.nodes[peer].label, "Linked run-time output");
        }

        let waiting = node
            .pending_peers
            .iter()
            .filter(|peer| !resolved.contains(&(id, **peer)))
            .count();
        if waiting > 0 {
            warn!(node = %node.label, waiting, "Pending peers left without a matching output");
        }
        Ok(linked)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use gstjob_model::{ElementSpec, EndpointConfig};

    use super::*;

    #[derive(Debug)]
    struct FakeOutput {
        name: String,
        media: String,
        linked_to: Option<String>,
    }

    #[derive(Debug)]
    struct FakeElement {
        name: String,
        deferred: bool,
        accepts: Option<String>,
        input_linked: AtomicBool,
        outputs: Mutex<Vec<FakeOutput>>,
    }

    impl FakeElement {
        fn expose(&self, name: &str, media: &str) {
            self.outputs.lock().unwrap().push(FakeOutput {
                name: name.to_string(),
                media: media.to_string(),
                linked_to: None,
            });
        }
    }

    type FakeNode = Arc<FakeElement>;

    #[derive(Default)]
    struct FakeBackend {
        made: Mutex<Vec<String>>,
        links: Mutex<Vec<(String, String)>>,
        /// Output names whose link attempts fail.
        refused: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn create(&self, name: &str, deferred: bool, accepts: Option<&str>) -> FakeNode {
            self.made.lock().unwrap().push(name.to_string());
            Arc::new(FakeElement {
                name: name.to_string(),
                deferred,
                accepts: accepts.map(str::to_string),
                input_linked: AtomicBool::new(false),
                outputs: Mutex::new(Vec::new()),
            })
        }

        fn made(&self, name: &str) -> usize {
            self.made.lock().unwrap().iter().filter(|n| *n == name).count()
        }

        fn links(&self) -> Vec<(String, String)> {
            self.links.lock().unwrap().clone()
        }
    }

    impl GraphBackend for FakeBackend {
        type Node = FakeNode;
        type Output = (FakeNode, usize);

        fn make_element(&self, spec: &ElementSpec) -> JobResult<FakeNode> {
            match spec.name.as_str() {
                "missing" => Err(JobError::construction(&spec.name, "no such element")),
                "demux" => Ok(self.create(&spec.name, true, None)),
                "venc" => Ok(self.create(&spec.name, false, Some("video"))),
                "aenc" => Ok(self.create(&spec.name, false, Some("audio"))),
                other => Ok(self.create(other, false, None)),
            }
        }

        fn make_source(&self, _source: &ObjectDescriptor) -> JobResult<FakeNode> {
            Ok(self.create("source", false, None))
        }

        fn make_sink(&self, sink: &ObjectDescriptor, _index: usize) -> JobResult<FakeNode> {
            Ok(self.create(&format!("sink:{}", sink.key), false, None))
        }

        fn output_mode(&self, node: &FakeNode) -> OutputMode {
            if node.deferred {
                OutputMode::Deferred
            } else {
                OutputMode::Static
            }
        }

        fn link(&self, from: &FakeNode, to: &FakeNode) -> JobResult<()> {
            to.input_linked.store(true, Ordering::SeqCst);
            self.links
                .lock()
                .unwrap()
                .push((from.name.clone(), to.name.clone()));
            Ok(())
        }

        fn unlinked_outputs(&self, node: &FakeNode) -> Vec<(FakeNode, usize)> {
            let outputs = node.outputs.lock().unwrap();
            (0..outputs.len())
                .filter(|idx| outputs[*idx].linked_to.is_none())
                .map(|idx| (node.clone(), idx))
                .collect()
        }

        fn can_link_output(&self, output: &(FakeNode, usize), peer: &FakeNode) -> bool {
            let outputs = output.0.outputs.lock().unwrap();
            let media = &outputs[output.1].media;
            !peer.input_linked.load(Ordering::SeqCst)
                && peer.accepts.as_ref().map_or(true, |a| a == media)
        }

        fn link_output(&self, output: &(FakeNode, usize), peer: &FakeNode) -> JobResult<()> {
            let name = output.0.outputs.lock().unwrap()[output.1].name.clone();
            if self.refused.lock().unwrap().contains(&name) {
                return Err(JobError::link(name, &peer.name, "refused"));
            }
            output.0.outputs.lock().unwrap()[output.1].linked_to = Some(peer.name.clone());
            self.link(&output.0, peer)
        }

        fn output_name(&self, output: &(FakeNode, usize)) -> String {
            let outputs = output.0.outputs.lock().unwrap();
            format!("{}:{}", output.0.name, outputs[output.1].name)
        }
    }

    fn object(key: &str, stream_type: StreamType) -> ObjectDescriptor {
        ObjectDescriptor::new(key, EndpointConfig::default(), stream_type)
    }

    fn source() -> ObjectDescriptor {
        object("in/clip.mp4", StreamType::All)
    }

    fn split_sinks() -> Vec<ObjectDescriptor> {
        vec![
            object("out/video.mkv", StreamType::Video),
            object("out/audio.ogg", StreamType::Audio),
        ]
    }

    fn split_pipeline() -> PipelineSpec {
        PipelineSpec::new(vec![
            ElementSpec::new("demux").with_alias("d"),
            ElementSpec {
                link_to: "video-out".to_string(),
                ..ElementSpec::new("venc")
            },
            ElementSpec {
                link_to: "audio-out".to_string(),
                ..ElementSpec::new("aenc")
            },
        ])
    }

    #[test]
    fn test_linear_chain_gets_implicit_sink() {
        let backend = FakeBackend::default();
        let pipeline = PipelineSpec::new(vec![
            ElementSpec::new("decode"),
            ElementSpec::new("encode"),
        ]);
        let sinks = vec![object("out/a.mp4", StreamType::All)];
        let topology = Topology::build(&backend, &pipeline, &source(), &sinks).unwrap();

        assert_eq!(topology.sinks().count(), 1);
        let sink = topology.implicit_sink().unwrap();
        assert!(matches!(
            &sink.role,
            NodeRole::Sink { implicit: true, key, stream_type: StreamType::All, .. } if key == "out/a.mp4"
        ));
        assert_eq!(
            backend.links(),
            vec![
                ("source".to_string(), "decode".to_string()),
                ("decode".to_string(), "encode".to_string()),
                ("encode".to_string(), "sink:out/a.mp4".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_all_sink_is_fatal() {
        let backend = FakeBackend::default();
        let pipeline = PipelineSpec::new(vec![ElementSpec::new("decode")]);
        let err = Topology::build(&backend, &pipeline, &source(), &split_sinks()).unwrap_err();
        assert!(matches!(err, JobError::MissingSink { ref stream_type } if stream_type == "all"));
    }

    #[test]
    fn test_split_pipeline_defers_both_branches() {
        let backend = FakeBackend::default();
        let topology =
            Topology::build(&backend, &split_pipeline(), &source(), &split_sinks()).unwrap();

        assert_eq!(topology.sinks().count(), 2);
        assert!(topology.implicit_sink().is_none());

        let demux = topology.node(topology.alias("d").unwrap()).unwrap();
        let peers: Vec<&str> = demux
            .pending_peers
            .iter()
            .map(|id| topology.node(*id).unwrap().label.as_str())
            .collect();
        assert_eq!(peers, vec!["venc", "aenc"]);
        assert_eq!(topology.deferred_nodes().count(), 1);

        let links = backend.links();
        assert!(links.contains(&("venc".to_string(), "sink:out/video.mkv".to_string())));
        assert!(links.contains(&("aenc".to_string(), "sink:out/audio.ogg".to_string())));
        assert!(!links.iter().any(|(from, _)| from == "demux"));
    }

    #[test]
    fn test_outputs_ready_links_by_compatibility_and_is_idempotent() {
        let backend = FakeBackend::default();
        let topology =
            Topology::build(&backend, &split_pipeline(), &source(), &split_sinks()).unwrap();
        let demux_id = topology.alias("d").unwrap();
        let demux = topology.node(demux_id).unwrap().handle.clone();

        demux.expose("audio_0", "audio");
        demux.expose("video_0", "video");
        demux.expose("subtitle_0", "text");

        assert_eq!(topology.outputs_ready(&backend, demux_id).unwrap(), 2);
        let before = backend.links().len();
        assert_eq!(topology.outputs_ready(&backend, demux_id).unwrap(), 0);
        assert_eq!(backend.links().len(), before);

        let outputs = demux.outputs.lock().unwrap();
        assert_eq!(outputs[0].linked_to.as_deref(), Some("aenc"));
        assert_eq!(outputs[1].linked_to.as_deref(), Some("venc"));
        assert_eq!(outputs[2].linked_to, None);
    }

    #[test]
    fn test_failed_run_time_link_is_skipped() {
        let backend = FakeBackend::default();
        let topology =
            Topology::build(&backend, &split_pipeline(), &source(), &split_sinks()).unwrap();
        let demux_id = topology.alias("d").unwrap();
        let demux = topology.node(demux_id).unwrap().handle.clone();

        backend.refused.lock().unwrap().push("video_0".to_string());
        demux.expose("video_0", "video");
        demux.expose("audio_0", "audio");

        assert_eq!(topology.outputs_ready(&backend, demux_id).unwrap(), 1);
        {
            let outputs = demux.outputs.lock().unwrap();
            assert_eq!(outputs[0].linked_to, None);
            assert_eq!(outputs[1].linked_to.as_deref(), Some("aenc"));
        }

        backend.refused.lock().unwrap().clear();
        assert_eq!(topology.outputs_ready(&backend, demux_id).unwrap(), 1);
        assert_eq!(
            demux.outputs.lock().unwrap()[0].linked_to.as_deref(),
            Some("venc")
        );
    }

    #[test]
    fn test_first_compatible_peer_wins() {
        let backend = FakeBackend::default();
        let pipeline = PipelineSpec::new(vec![
            ElementSpec::new("demux").with_alias("d"),
            ElementSpec::new("queue").with_alias("q1"),
            ElementSpec::go_to("d"),
            ElementSpec::new("queue").with_alias("q2"),
        ]);
        let sinks = vec![object("out/a.mp4", StreamType::All)];
        let topology = Topology::build(&backend, &pipeline, &source(), &sinks).unwrap();
        let demux_id = topology.alias("d").unwrap();
        let demux = topology.node(demux_id).unwrap().handle.clone();

        demux.expose("src_0", "video");
        assert_eq!(topology.outputs_ready(&backend, demux_id).unwrap(), 1);
        assert_eq!(
            demux.outputs.lock().unwrap()[0].linked_to.as_deref(),
            Some("queue")
        );
        let q1 = topology.node(topology.alias("q1").unwrap()).unwrap();
        assert!(q1.handle.input_linked.load(Ordering::SeqCst));

        demux.expose("src_1", "audio");
        assert_eq!(topology.outputs_ready(&backend, demux_id).unwrap(), 1);
        let q2 = topology.node(topology.alias("q2").unwrap()).unwrap();
        assert!(q2.handle.input_linked.load(Ordering::SeqCst));
    }

    #[test]
    fn test_alias_resolves_to_the_same_node() {
        let backend = FakeBackend::default();
        let pipeline = PipelineSpec::new(vec![
            ElementSpec::new("tee").with_alias("t"),
            ElementSpec::new("queue"),
            ElementSpec::go_to("t"),
            ElementSpec::new("queue"),
            ElementSpec::link_to("mux"),
            ElementSpec::go_to("t"),
            ElementSpec::new("mixer").with_alias("mux"),
        ]);
        let sinks = vec![object("out/a.mp4", StreamType::All)];
        let topology = Topology::build(&backend, &pipeline, &source(), &sinks).unwrap();

        assert_eq!(backend.made("tee"), 1);
        assert_eq!(backend.made("mixer"), 1);
        let tee = topology.alias("t").unwrap();
        let mux = topology.alias("mux").unwrap();
        assert_eq!(topology.node(tee).unwrap().id, tee);

        let links = backend.links();
        assert_eq!(links.iter().filter(|(from, _)| from == "tee").count(), 3);
        assert_eq!(
            links.iter().filter(|(_, to)| to == "mixer").count(),
            2,
            "forward reference and later declaration share one node"
        );
        assert_eq!(
            links.last().unwrap(),
            &("mixer".to_string(), "sink:out/a.mp4".to_string())
        );
        assert_ne!(tee, mux);
    }

    #[test]
    fn test_goto_creates_no_edge() {
        let backend = FakeBackend::default();
        let pipeline = PipelineSpec::new(vec![
            ElementSpec::new("decode").with_alias("dec"),
            ElementSpec::new("scale"),
            ElementSpec::go_to("dec"),
        ]);
        let sinks = vec![object("out/a.mp4", StreamType::All)];
        Topology::build(&backend, &pipeline, &source(), &sinks).unwrap();
        assert_eq!(
            backend.links(),
            vec![
                ("source".to_string(), "decode".to_string()),
                ("decode".to_string(), "scale".to_string()),
                ("decode".to_string(), "sink:out/a.mp4".to_string()),
            ]
        );
    }

    #[test]
    fn test_unresolved_alias_names_the_alias() {
        let backend = FakeBackend::default();
        let pipeline = PipelineSpec::new(vec![
            ElementSpec::new("decode"),
            ElementSpec::go_to("nowhere"),
        ]);
        let sinks = vec![object("out/a.mp4", StreamType::All)];
        let err = Topology::build(&backend, &pipeline, &source(), &sinks).unwrap_err();
        assert!(matches!(err, JobError::UnresolvedAlias { ref alias } if alias == "nowhere"));
    }

    #[test]
    fn test_marker_without_descriptor_is_fatal() {
        let backend = FakeBackend::default();
        let pipeline = PipelineSpec::new(vec![
            ElementSpec::new("demux"),
            ElementSpec::link_to("audio-out"),
        ]);
        let sinks = vec![object("out/video.mkv", StreamType::Video)];
        let err = Topology::build(&backend, &pipeline, &source(), &sinks).unwrap_err();
        assert!(matches!(err, JobError::MissingSink { ref stream_type } if stream_type == "audio"));
    }

    #[test]
    fn test_each_descriptor_is_consumed_once() {
        let backend = FakeBackend::default();
        let pipeline = PipelineSpec::new(vec![
            ElementSpec::new("demux").with_alias("d"),
            ElementSpec::link_to("video-out"),
            ElementSpec::link_to("video-out"),
        ]);
        let err =
            Topology::build(&backend, &pipeline, &source(), &split_sinks()).unwrap_err();
        assert!(matches!(err, JobError::MissingSink { .. }));
    }

    #[test]
    fn test_construction_failure_propagates() {
        let backend = FakeBackend::default();
        let pipeline = PipelineSpec::new(vec![ElementSpec::new("missing")]);
        let sinks = vec![object("out/a.mp4", StreamType::All)];
        let err = Topology::build(&backend, &pipeline, &source(), &sinks).unwrap_err();
        assert!(matches!(err, JobError::Construction { .. }));
    }

    #[test]
    fn test_implicit_sink_after_deferred_tail_is_pending() {
        let backend = FakeBackend::default();
        let pipeline = PipelineSpec::new(vec![ElementSpec::new("demux")]);
        let sinks = vec![object("out/a.mp4", StreamType::All)];
        let topology = Topology::build(&backend, &pipeline, &source(), &sinks).unwrap();

        let demux = topology.deferred_nodes().next().unwrap();
        let sink = topology.implicit_sink().unwrap();
        assert_eq!(demux.pending_peers, vec![sink.id]);
        assert_eq!(topology.source().role, NodeRole::Source);
    }
}
