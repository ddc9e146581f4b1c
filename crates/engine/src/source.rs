//! The element that reads the job's source object.

use gst::prelude::*;
use gstjob_common::error::{JobError, JobResult};
use gstreamer as gst;

/// Factory and property settings for the source node.
///
/// Property values are parsed by GStreamer itself, so enum nicks are allowed
/// here even though they are rejected in pipeline entries.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceElement {
    factory: String,
    properties: Vec<(String, String)>,
}

// Presigned URLs carry signatures; only names are printed.
impl std::fmt::Debug for SourceElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.properties.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("SourceElement")
            .field("factory", &self.factory)
            .field("properties", &names)
            .finish()
    }
}

impl SourceElement {
    pub fn new(factory: impl Into<String>) -> Self {
        Self {
            factory: factory.into(),
            properties: Vec::new(),
        }
    }

    /// HTTP source reading `url`.
    pub fn http(url: impl Into<String>) -> Self {
        Self::new("souphttpsrc").with_property("location", url)
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((name.into(), value.into()));
        self
    }

    pub fn factory(&self) -> &str {
        &self.factory
    }

    /// Create the element, named `name`.
    pub fn build(&self, name: &str) -> JobResult<gst::Element> {
        let element = gst::ElementFactory::make(self.factory.as_str())
            .name(name)
            .build()
            .map_err(|e| JobError::construction(&self.factory, e.to_string()))?;

        for (property, value) in &self.properties {
            if element.find_property(property).is_none() {
                return Err(JobError::coercion(&self.factory, property, "no such property"));
            }
            element.set_property_from_str(property, value);
        }
        tracing::debug!(factory = %self.factory, "Created source element");
        Ok(element)
    }
}
