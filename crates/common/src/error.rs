//! Error types shared across gstjob crates.

/// Top-level error type for gstjob operations.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Invalid job specification: {message}")]
    Spec { message: String },

    #[error("No element configuration referenced by alias '{alias}'")]
    UnresolvedAlias { alias: String },

    #[error("No {stream_type} sink object configured for pipeline")]
    MissingSink { stream_type: String },

    #[error("Invalid value for property '{property}' on element '{element}': {message}")]
    Coercion {
        element: String,
        property: String,
        message: String,
    },

    #[error("Failed to construct element '{element}': {message}")]
    Construction { element: String, message: String },

    #[error("Failed to link '{from}' to '{to}': {message}")]
    Link {
        from: String,
        to: String,
        message: String,
    },

    #[error("Pipeline error: {message}")]
    Runtime { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

/// Result type alias using JobError.
pub type JobResult<T> = Result<T, JobError>;

/// Coarse classification of a [`JobError`], used to pick the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The job description is invalid or references things that do not exist.
    Configuration,
    /// A textual property value could not be converted for its element.
    Coercion,
    /// An element could not be created, configured, or linked.
    Construction,
    /// The running pipeline reported a failure.
    Runtime,
    /// The object store rejected an upload, fetch, composition, or cleanup.
    Storage,
}

impl JobError {
    pub fn spec(msg: impl Into<String>) -> Self {
        Self::Spec {
            message: msg.into(),
        }
    }

    pub fn unresolved_alias(alias: impl Into<String>) -> Self {
        Self::UnresolvedAlias {
            alias: alias.into(),
        }
    }

    pub fn missing_sink(stream_type: impl Into<String>) -> Self {
        Self::MissingSink {
            stream_type: stream_type.into(),
        }
    }

    pub fn coercion(
        element: impl Into<String>,
        property: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Coercion {
            element: element.into(),
            property: property.into(),
            message: msg.into(),
        }
    }

    pub fn construction(element: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Construction {
            element: element.into(),
            message: msg.into(),
        }
    }

    pub fn link(from: impl Into<String>, to: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Link {
            from: from.into(),
            to: to.into(),
            message: msg.into(),
        }
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime {
            message: msg.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage {
            message: msg.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Spec { .. } | Self::UnresolvedAlias { .. } | Self::MissingSink { .. } => {
                ErrorCategory::Configuration
            }
            Self::Coercion { .. } => ErrorCategory::Coercion,
            Self::Construction { .. } | Self::Link { .. } => ErrorCategory::Construction,
            Self::Runtime { .. } => ErrorCategory::Runtime,
            Self::Storage { .. } => ErrorCategory::Storage,
        }
    }

    /// Whether this error can only be raised before the pipeline starts.
    pub fn is_build_time(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Configuration | ErrorCategory::Coercion | ErrorCategory::Construction
        )
    }
}
