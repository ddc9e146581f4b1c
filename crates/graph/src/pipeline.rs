//! GStreamer graph backend.

use std::sync::{Arc, OnceLock, Weak};

use gst::glib;
use gst::prelude::*;
use gstjob_common::error::{JobError, JobResult};
use gstjob_model::{ElementSpec, ObjectDescriptor};
use gstreamer as gst;

use crate::backend::{GraphBackend, OutputMode};
use crate::coerce::{coerce_for_type, CoercionError, PropertyValue};
use crate::topology::{NodeId, Topology};

/// Initialize GStreamer once per process.
pub fn init_gstreamer() -> JobResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(JobError::construction(
            "gstreamer",
            format!("Failed to initialize GStreamer: {e}"),
        )),
    }
}

/// Creates the elements that read the source object and write sink objects.
pub trait EndpointFactory: Send + Sync {
    fn source_element(&self, source: &ObjectDescriptor) -> JobResult<gst::Element>;

    fn sink_element(&self, sink: &ObjectDescriptor, index: usize) -> JobResult<gst::Element>;
}

/// Builds nodes as elements of one `gst::Pipeline`.
pub struct GstGraph {
    pipeline: gst::Pipeline,
    endpoints: Arc<dyn EndpointFactory>,
}

impl std::fmt::Debug for GstGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GstGraph")
            .field("pipeline", &self.pipeline.name())
            .finish()
    }
}

impl GstGraph {
    pub fn new(name: &str, endpoints: Arc<dyn EndpointFactory>) -> JobResult<Self> {
        init_gstreamer()?;
        let pipeline = gst::Pipeline::with_name(name);
        Ok(Self {
            pipeline,
            endpoints,
        })
    }

    pub fn pipeline(&self) -> &gst::Pipeline {
        &self.pipeline
    }

    fn add(&self, element: &gst::Element) -> JobResult<()> {
        self.pipeline.add(element).map_err(|e| {
            JobError::construction(
                element.name().as_str(),
                format!("Failed to add element to pipeline: {e}"),
            )
        })
    }
}

impl GraphBackend for GstGraph {
    type Node = gst::Element;
    type Output = gst::Pad;

    fn make_element(&self, spec: &ElementSpec) -> JobResult<gst::Element> {
        let mut builder = gst::ElementFactory::make(spec.name.as_str());
        if !spec.alias.is_empty() {
            builder = builder.name(spec.alias.as_str());
        }
        let element = builder
            .build()
            .map_err(|e| JobError::construction(spec.label(), e.to_string()))?;
        apply_properties(&element, spec)?;
        self.add(&element)?;
        Ok(element)
    }

    fn make_source(&self, source: &ObjectDescriptor) -> JobResult<gst::Element> {
        let element = self.endpoints.source_element(source)?;
        self.add(&element)?;
        Ok(element)
    }

    fn make_sink(&self, sink: &ObjectDescriptor, index: usize) -> JobResult<gst::Element> {
        let element = self.endpoints.sink_element(sink, index)?;
        self.add(&element)?;
        Ok(element)
    }

    fn output_mode(&self, element: &gst::Element) -> OutputMode {
        if !element.src_pads().is_empty() {
            return OutputMode::Static;
        }
        let mut sometimes = false;
        for template in element.pad_template_list() {
            if template.direction() != gst::PadDirection::Src {
                continue;
            }
            match template.presence() {
                gst::PadPresence::Request | gst::PadPresence::Always => {
                    return OutputMode::Static
                }
                gst::PadPresence::Sometimes => sometimes = true,
                _ => {}
            }
        }
        if sometimes {
            OutputMode::Deferred
        } else {
            OutputMode::Static
        }
    }

    fn link(&self, from: &gst::Element, to: &gst::Element) -> JobResult<()> {
        from.link(to).map_err(|e| {
            JobError::link(from.name().as_str(), to.name().as_str(), e.to_string())
        })
    }

    fn unlinked_outputs(&self, element: &gst::Element) -> Vec<gst::Pad> {
        element
            .src_pads()
            .into_iter()
            .filter(|pad| !pad.is_linked())
            .collect()
    }

    fn can_link_output(&self, output: &gst::Pad, peer: &gst::Element) -> bool {
        let caps = output
            .current_caps()
            .unwrap_or_else(|| output.query_caps(None));

        let free_sink = peer
            .sink_pads()
            .into_iter()
            .any(|pad| !pad.is_linked() && pad.query_caps(None).can_intersect(&caps));
        if free_sink {
            return true;
        }
        peer.pad_template_list().into_iter().any(|template| {
            template.direction() == gst::PadDirection::Sink
                && template.presence() == gst::PadPresence::Request
                && template.caps().can_intersect(&caps)
        })
    }

    fn link_output(&self, output: &gst::Pad, peer: &gst::Element) -> JobResult<()> {
        let owner = output.parent_element().ok_or_else(|| {
            JobError::link(output.name().as_str(), peer.name().as_str(), "pad has no parent")
        })?;
        owner
            .link_pads(Some(output.name().as_str()), peer, None)
            .map_err(|e| {
                JobError::link(
                    self.output_name(output),
                    peer.name().as_str(),
                    e.to_string(),
                )
            })
    }

    fn output_name(&self, output: &gst::Pad) -> String {
        match output.parent_element() {
            Some(parent) => format!("{}:{}", parent.name(), output.name()),
            None => output.name().to_string(),
        }
    }
}

/// Coerce and set every declared property of `spec` on `element`.
pub fn apply_properties(element: &gst::Element, spec: &ElementSpec) -> JobResult<()> {
    let label = spec.label();
    for (name, raw) in &spec.properties {
        let pspec = element
            .find_property(name)
            .ok_or_else(|| JobError::coercion(label, name, "no such property"))?;

        let flags = pspec.flags();
        if !flags.contains(glib::ParamFlags::WRITABLE)
            || flags.contains(glib::ParamFlags::CONSTRUCT_ONLY)
        {
            return Err(JobError::coercion(label, name, "property is not writable"));
        }

        let value = coerce_for_type(pspec.value_type(), raw)
            .map_err(|e| JobError::coercion(label, name, e.to_string()))?;
        check_range(&pspec, &value, raw).map_err(|e| JobError::coercion(label, name, e.to_string()))?;

        element.set_property_from_value(name, &value.to_value());
        tracing::debug!(element = %label, property = %name, value = %raw, "Set property");
    }
    Ok(())
}

fn check_range(
    pspec: &glib::ParamSpec,
    value: &PropertyValue,
    raw: &str,
) -> Result<(), CoercionError> {
    let Some(number) = value.as_f64() else {
        return Ok(());
    };
    let bounds = if let Some(p) = pspec.downcast_ref::<glib::ParamSpecInt>() {
        Some((f64::from(p.minimum()), f64::from(p.maximum())))
    } else if let Some(p) = pspec.downcast_ref::<glib::ParamSpecUInt>() {
        Some((f64::from(p.minimum()), f64::from(p.maximum())))
    } else if let Some(p) = pspec.downcast_ref::<glib::ParamSpecInt64>() {
        Some((p.minimum() as f64, p.maximum() as f64))
    } else if let Some(p) = pspec.downcast_ref::<glib::ParamSpecUInt64>() {
        Some((p.minimum() as f64, p.maximum() as f64))
    } else if let Some(p) = pspec.downcast_ref::<glib::ParamSpecFloat>() {
        Some((f64::from(p.minimum()), f64::from(p.maximum())))
    } else if let Some(p) = pspec.downcast_ref::<glib::ParamSpecDouble>() {
        Some((p.minimum(), p.maximum()))
    } else {
        None
    };

    match bounds {
        Some((min, max)) if number < min || number > max => Err(CoercionError::OutOfRange {
            value: raw.to_string(),
            expected: "the property's declared range",
        }),
        _ => Ok(()),
    }
}

/// Resolve pending links of every deferred node once it has exposed all of
/// its outputs.
///
/// The handlers only hold weak references, so they do nothing once the job
/// has released the graph.
pub fn watch_deferred_outputs(topology: &Arc<Topology<gst::Element>>, graph: &Arc<GstGraph>) {
    for node in topology.deferred_nodes() {
        let id: NodeId = node.id;
        let label = node.label.clone();
        let topology: Weak<Topology<gst::Element>> = Arc::downgrade(topology);
        let graph: Weak<GstGraph> = Arc::downgrade(graph);

        node.handle.connect_no_more_pads(move |element| {
            let (Some(topology), Some(graph)) = (topology.upgrade(), graph.upgrade()) else {
                return;
            };
            match topology.outputs_ready(graph.as_ref(), id) {
                Ok(linked) => {
                    tracing::debug!(node = %label, linked, "Resolved run-time outputs");
                }
                Err(e) => {
                    gst::element_error!(
                        element,
                        gst::CoreError::Negotiation,
                        ("Failed to link outputs of {}: {}", label, e)
                    );
                }
            }
        });
        tracing::debug!(node = %node.label, peers = node.pending_peers.len(), "Watching for run-time outputs");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Element with an always sink pad and sometimes src pads that the test
    /// adds by hand, standing in for a demuxer.
    mod split_demux {
        use std::sync::OnceLock;

        use gst::glib;
        use gst::prelude::*;
        use gst::subclass::prelude::*;
        use gstreamer as gst;

        pub const FACTORY: &str = "gstjobsplitdemux";

        mod imp {
            use super::*;

            #[derive(Default)]
            pub struct SplitDemux;

            #[glib::object_subclass]
            impl ObjectSubclass for SplitDemux {
                const NAME: &'static str = "GstJobSplitDemux";
                type Type = super::SplitDemux;
                type ParentType = gst::Element;
            }

            impl ObjectImpl for SplitDemux {
                fn constructed(&self) {
                    self.parent_constructed();
                    let obj = self.obj();
                    let templ = obj.pad_template("sink").unwrap();
                    obj.add_pad(&gst::Pad::from_template(&templ)).unwrap();
                }
            }

            impl GstObjectImpl for SplitDemux {}

            impl ElementImpl for SplitDemux {
                fn metadata() -> Option<&'static gst::subclass::ElementMetadata> {
                    static METADATA: OnceLock<gst::subclass::ElementMetadata> = OnceLock::new();
                    Some(METADATA.get_or_init(|| {
                        gst::subclass::ElementMetadata::new(
                            "Split demuxer",
                            "Codec/Demuxer",
                            "Exposes outputs on request of the test",
                            "gstjob Contributors",
                        )
                    }))
                }

                fn pad_templates() -> &'static [gst::PadTemplate] {
                    static TEMPLATES: OnceLock<Vec<gst::PadTemplate>> = OnceLock::new();
                    TEMPLATES.get_or_init(|| {
                        let caps = gst::Caps::new_any();
                        vec![
                            gst::PadTemplate::new(
                                "sink",
                                gst::PadDirection::Sink,
                                gst::PadPresence::Always,
                                &caps,
                            )
                            .unwrap(),
                            gst::PadTemplate::new(
                                "src_%u",
                                gst::PadDirection::Src,
                                gst::PadPresence::Sometimes,
                                &caps,
                            )
                            .unwrap(),
                        ]
                    })
                }
            }
        }

        glib::wrapper! {
            pub struct SplitDemux(ObjectSubclass<imp::SplitDemux>)
                @extends gst::Element, gst::Object;
        }

        pub fn register() {
            static REGISTERED: OnceLock<()> = OnceLock::new();
            REGISTERED.get_or_init(|| {
                gst::Element::register(None, FACTORY, gst::Rank::NONE, SplitDemux::static_type())
                    .unwrap();
            });
        }

        /// Add a src pad whose template restricts it to `caps`.
        pub fn expose(element: &gst::Element, name: &str, caps: &str) -> gst::Pad {
            let caps: gst::Caps = caps.parse().unwrap();
            let templ = gst::PadTemplate::new(
                "src_%u",
                gst::PadDirection::Src,
                gst::PadPresence::Sometimes,
                &caps,
            )
            .unwrap();
            let pad = gst::Pad::builder_from_template(&templ).name(name).build();
            element.add_pad(&pad).unwrap();
            pad
        }
    }

    struct FakeEndpoints;

    impl EndpointFactory for FakeEndpoints {
        fn source_element(&self, _source: &ObjectDescriptor) -> JobResult<gst::Element> {
            gst::ElementFactory::make("fakesrc")
                .build()
                .map_err(|e| JobError::construction("fakesrc", e.to_string()))
        }

        fn sink_element(&self, _sink: &ObjectDescriptor, index: usize) -> JobResult<gst::Element> {
            gst::ElementFactory::make("fakesink")
                .name(format!("sink-{index}"))
                .build()
                .map_err(|e| JobError::construction("fakesink", e.to_string()))
        }
    }

    fn graph() -> GstGraph {
        GstGraph::new("test", Arc::new(FakeEndpoints)).unwrap()
    }

    #[test]
    fn test_make_element_applies_properties_and_alias() {
        let graph = graph();
        let spec = ElementSpec::new("identity")
            .with_alias("ident")
            .with_property("sleep-time", "5")
            .with_property("silent", "false");
        let element = graph.make_element(&spec).unwrap();
        assert_eq!(element.name().as_str(), "ident");
        assert_eq!(element.property::<u32>("sleep-time"), 5);
        assert!(!element.property::<bool>("silent"));
        assert_eq!(graph.output_mode(&element), OutputMode::Static);
    }

    #[test]
    fn test_unknown_factory_is_construction_error() {
        let graph = graph();
        let err = graph
            .make_element(&ElementSpec::new("definitely-not-an-element"))
            .unwrap_err();
        assert!(matches!(err, JobError::Construction { .. }));
    }

    #[test]
    fn test_bad_property_values() {
        let graph = graph();

        let spec = ElementSpec::new("identity").with_property("silent", "maybe");
        let err = graph.make_element(&spec).unwrap_err();
        assert!(matches!(err, JobError::Coercion { ref property, .. } if property == "silent"));

        let spec = ElementSpec::new("identity").with_property("no-such-thing", "1");
        assert!(matches!(
            graph.make_element(&spec),
            Err(JobError::Coercion { .. })
        ));

        let spec = ElementSpec::new("fakesrc").with_property("sizetype", "fixed");
        let err = graph.make_element(&spec).unwrap_err();
        assert!(err.to_string().contains("not supported"));

        let spec = ElementSpec::new("fakesrc").with_property("sizemax", "-5");
        let err = graph.make_element(&spec).unwrap_err();
        assert!(err.to_string().contains("range"));
    }

    #[test]
    fn test_demuxer_outputs_are_deferred() {
        let graph = graph();
        let Ok(element) = gst::ElementFactory::make("decodebin").build() else {
            return;
        };
        assert_eq!(graph.output_mode(&element), OutputMode::Deferred);
        let tee = gst::ElementFactory::make("tee").build().unwrap();
        assert_eq!(graph.output_mode(&tee), OutputMode::Static);
    }

    #[test]
    fn test_topology_over_gstreamer() {
        let graph = Arc::new(graph());
        let pipeline = gstjob_model::PipelineSpec::new(vec![
            ElementSpec::new("identity").with_alias("first"),
            ElementSpec::new("queue"),
        ]);
        let source = ObjectDescriptor::new(
            "in.bin",
            gstjob_model::EndpointConfig::default(),
            gstjob_model::StreamType::All,
        );
        let sinks = vec![ObjectDescriptor::new(
            "out.bin",
            gstjob_model::EndpointConfig::default(),
            gstjob_model::StreamType::All,
        )];
        let topology =
            Arc::new(Topology::build(graph.as_ref(), &pipeline, &source, &sinks).unwrap());
        watch_deferred_outputs(&topology, &graph);

        let first = graph.pipeline().by_name("first").unwrap();
        let src = first.static_pad("src").unwrap();
        assert!(src.is_linked());
        assert_eq!(graph.pipeline().children().len(), 4);
        assert!(graph.pipeline().by_name("sink-0").is_some());
    }

    #[test]
    fn test_no_more_pads_links_first_compatible_peer() {
        init_gstreamer().unwrap();
        split_demux::register();
        let graph = Arc::new(graph());
        let pipeline = gstjob_model::PipelineSpec::new(vec![
            ElementSpec::new(split_demux::FACTORY).with_alias("demux"),
            ElementSpec::new("capsfilter")
                .with_alias("audio")
                .with_property("caps", "audio/x-raw"),
            ElementSpec::go_to("demux"),
            ElementSpec::new("capsfilter")
                .with_alias("video")
                .with_property("caps", "video/x-raw"),
        ]);
        let source = ObjectDescriptor::new(
            "in.bin",
            gstjob_model::EndpointConfig::default(),
            gstjob_model::StreamType::All,
        );
        let sinks = vec![ObjectDescriptor::new(
            "out.bin",
            gstjob_model::EndpointConfig::default(),
            gstjob_model::StreamType::All,
        )];
        let topology =
            Arc::new(Topology::build(graph.as_ref(), &pipeline, &source, &sinks).unwrap());
        let demux_id = topology.alias("demux").unwrap();
        assert_eq!(topology.node(demux_id).unwrap().pending_peers.len(), 2);
        watch_deferred_outputs(&topology, &graph);

        let demux = graph.pipeline().by_name("demux").unwrap();
        let audio = graph.pipeline().by_name("audio").unwrap();
        let video = graph.pipeline().by_name("video").unwrap();
        assert_eq!(graph.output_mode(&demux), OutputMode::Deferred);

        let video_out = split_demux::expose(&demux, "src_0", "video/x-raw");
        demux.no_more_pads();
        let peer = video_out.peer().unwrap();
        assert_eq!(peer.parent_element().unwrap(), video);
        assert!(!audio.static_pad("sink").unwrap().is_linked());

        let audio_out = split_demux::expose(&demux, "src_1", "audio/x-raw");
        demux.no_more_pads();
        assert_eq!(audio_out.peer().unwrap().parent_element().unwrap(), audio);

        assert_eq!(topology.outputs_ready(graph.as_ref(), demux_id).unwrap(), 0);
        demux.no_more_pads();
        assert_eq!(video_out.peer().unwrap().parent_element().unwrap(), video);
        assert_eq!(audio_out.peer().unwrap().parent_element().unwrap(), audio);
    }

    #[test]
    fn test_output_without_compatible_peer_stays_unlinked() {
        init_gstreamer().unwrap();
        split_demux::register();
        let graph = graph();
        let demux = gst::ElementFactory::make(split_demux::FACTORY).build().unwrap();
        let video = graph
            .make_element(&ElementSpec::new("capsfilter").with_property("caps", "video/x-raw"))
            .unwrap();
        graph.add(&demux).unwrap();

        let text_out = split_demux::expose(&demux, "src_0", "text/x-raw");
        assert!(!graph.can_link_output(&text_out, &video));
        let video_out = split_demux::expose(&demux, "src_1", "video/x-raw");
        assert!(graph.can_link_output(&video_out, &video));
        assert_eq!(graph.unlinked_outputs(&demux).len(), 2);

        graph.link_output(&video_out, &video).unwrap();
        assert_eq!(graph.unlinked_outputs(&demux).len(), 1);
        assert_eq!(graph.output_name(&text_out), format!("{}:src_0", demux.name()));
    }
}
