//! Sink element that streams rendered buffers into an object store object.
//!
//! Muxers that rewrite headers send a byte-format segment event before the
//! rewrite; the element moves the writer cursor to the segment start so the
//! next buffer lands at the right offset.

use std::io::{Seek, SeekFrom, Write};
use std::sync::{Mutex, PoisonError};

use gst::glib;
use gst::subclass::prelude::*;
use gstjob_object_store::BlockingWriter;
use gstreamer as gst;
use gstreamer_base as gst_base;

mod imp {
    use std::sync::OnceLock;

    use gstreamer_base::prelude::*;
    use gstreamer_base::subclass::prelude::*;

    use super::*;

    #[derive(Default)]
    pub struct ObjectSink {
        pub(super) writer: Mutex<Option<BlockingWriter>>,
    }

    impl ObjectSink {
        fn with_writer<T>(
            &self,
            f: impl FnOnce(&mut BlockingWriter) -> std::io::Result<T>,
        ) -> Result<T, String> {
            let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            let writer = guard
                .as_mut()
                .ok_or_else(|| "no output writer bound".to_string())?;
            f(writer).map_err(|e| e.to_string())
        }
    }

    #[glib::object_subclass]
    impl ObjectSubclass for ObjectSink {
        const NAME: &'static str = "GstJobObjectSink";
        type Type = super::ObjectSink;
        type ParentType = gst_base::BaseSink;
    }

    impl ObjectImpl for ObjectSink {
        fn constructed(&self) {
            self.parent_constructed();
            // Output is written as fast as it is produced.
            self.obj().set_sync(false);
        }
    }

    impl GstObjectImpl for ObjectSink {}

    impl ElementImpl for ObjectSink {
        fn metadata() -> Option<&'static gst::subclass::ElementMetadata> {
            static ELEMENT_METADATA: OnceLock<gst::subclass::ElementMetadata> = OnceLock::new();
            Some(ELEMENT_METADATA.get_or_init(|| {
                gst::subclass::ElementMetadata::new(
                    "Object store sink",
                    "Sink/File",
                    "Writes a byte stream into an object store object in parts",
                    "gstjob Contributors",
                )
            }))
        }

        fn pad_templates() -> &'static [gst::PadTemplate] {
            static PAD_TEMPLATES: OnceLock<Vec<gst::PadTemplate>> = OnceLock::new();
            PAD_TEMPLATES.get_or_init(|| {
                gst::PadTemplate::new(
                    "sink",
                    gst::PadDirection::Sink,
                    gst::PadPresence::Always,
                    &gst::Caps::new_any(),
                )
                .into_iter()
                .collect()
            })
        }
    }

    impl BaseSinkImpl for ObjectSink {
        fn start(&self) -> Result<(), gst::ErrorMessage> {
            let bound = self
                .writer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some();
            if !bound {
                return Err(gst::error_msg!(
                    gst::ResourceError::Settings,
                    ["No output writer bound to {}", self.obj().name()]
                ));
            }
            Ok(())
        }

        fn render(&self, buffer: &gst::Buffer) -> Result<gst::FlowSuccess, gst::FlowError> {
            let map = buffer.map_readable().map_err(|_| {
                gst::element_imp_error!(self, gst::CoreError::Failed, ["Failed to map buffer"]);
                gst::FlowError::Error
            })?;

            self.with_writer(|writer| writer.write_all(map.as_slice()))
                .map_err(|e| {
                    gst::element_imp_error!(
                        self,
                        gst::ResourceError::Write,
                        ["Failed to write {} bytes: {}", map.size(), e]
                    );
                    gst::FlowError::Error
                })?;

            Ok(gst::FlowSuccess::Ok)
        }

        fn event(&self, event: gst::Event) -> bool {
            if let gst::EventView::Segment(segment) = event.view() {
                if let Some(segment) = segment.segment().downcast_ref::<gst::format::Bytes>() {
                    if let Some(start) = segment.start() {
                        let offset: u64 = *start;
                        if let Err(e) =
                            self.with_writer(|writer| writer.seek(SeekFrom::Start(offset)))
                        {
                            gst::element_imp_error!(
                                self,
                                gst::ResourceError::Seek,
                                ["Failed to move output cursor to {}: {}", offset, e]
                            );
                            return false;
                        }
                        tracing::trace!(sink = %self.obj().name(), offset, "Moved output cursor");
                    }
                }
            }
            self.parent_event(event)
        }
    }
}

glib::wrapper! {
    /// `BaseSink` writing into a part-based object store writer.
    pub struct ObjectSink(ObjectSubclass<imp::ObjectSink>)
        @extends gstreamer_base::BaseSink, gst::Element, gst::Object;
}

impl ObjectSink {
    pub fn new(name: &str, writer: BlockingWriter) -> Self {
        let sink: Self = glib::Object::builder().property("name", name).build();
        *sink.imp().writer.lock().unwrap_or_else(PoisonError::into_inner) = Some(writer);
        sink
    }

    /// Bytes written so far, or `None` when no writer is bound.
    pub fn position(&self) -> Option<u64> {
        self.imp()
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(BlockingWriter::position)
    }
}
