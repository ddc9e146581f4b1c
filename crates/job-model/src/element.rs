//! Element chain entries and their linking directives.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::object::StreamType;

/// Reserved link target that routes the current branch to the video sink.
pub const LINK_TO_VIDEO_OUT: &str = "video-out";

/// Reserved link target that routes the current branch to the audio sink.
pub const LINK_TO_AUDIO_OUT: &str = "audio-out";

/// One entry of the declared element chain.
///
/// An entry either creates an element (`name`), jumps back to an aliased
/// element (`goto`), or routes the current tail to an alias or a reserved
/// sink marker (`linkto`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSpec {
    /// Element factory name (e.g. `qtdemux`, `x264enc`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// User-assigned name for non-linear references.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alias: String,

    /// Resume linking from the aliased element.
    #[serde(default, rename = "goto", skip_serializing_if = "String::is_empty")]
    pub go_to: String,

    /// Link the current tail to the aliased element or reserved marker.
    #[serde(default, rename = "linkto", skip_serializing_if = "String::is_empty")]
    pub link_to: String,

    /// Element properties as text, coerced to the element's types at build time.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

/// What an [`ElementSpec`] asks the resolver to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive<'a> {
    /// Re-point the tail at an aliased element without creating an edge.
    GoTo(&'a str),
    /// Link the tail to a target.
    LinkTo(LinkTarget<'a>),
    /// Create a new element and link the tail to it.
    Element,
}

/// Target of a `linkto` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget<'a> {
    /// One of the reserved sink markers.
    Marker(StreamType),
    /// A declared alias.
    Alias(&'a str),
}

impl ElementSpec {
    /// Create an element entry for the given factory.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// A `goto` entry.
    pub fn go_to(alias: impl Into<String>) -> Self {
        Self {
            go_to: alias.into(),
            ..Self::default()
        }
    }

    /// A `linkto` entry.
    pub fn link_to(target: impl Into<String>) -> Self {
        Self {
            link_to: target.into(),
            ..Self::default()
        }
    }

    /// The directive this entry expresses. `goto` takes precedence; validation
    /// rejects entries that set both.
    pub fn directive(&self) -> Directive<'_> {
        if !self.go_to.is_empty() {
            return Directive::GoTo(&self.go_to);
        }
        if !self.link_to.is_empty() {
            return Directive::LinkTo(LinkTarget::parse(&self.link_to));
        }
        Directive::Element
    }

    /// Human-readable label used in logs and errors.
    pub fn label(&self) -> &str {
        if !self.alias.is_empty() {
            &self.alias
        } else if !self.name.is_empty() {
            &self.name
        } else if !self.link_to.is_empty() {
            &self.link_to
        } else {
            &self.go_to
        }
    }
}

impl<'a> LinkTarget<'a> {
    pub fn parse(target: &'a str) -> Self {
        match target {
            LINK_TO_VIDEO_OUT => Self::Marker(StreamType::Video),
            LINK_TO_AUDIO_OUT => Self::Marker(StreamType::Audio),
            alias => Self::Alias(alias),
        }
    }
}

/// Whether the given text is one of the reserved sink markers.
pub fn is_reserved_marker(value: &str) -> bool {
    value == LINK_TO_VIDEO_OUT || value == LINK_TO_AUDIO_OUT
}
