//! gstjob Job Model
//!
//! Defines the immutable data contracts a worker invocation receives:
//! - **Elements:** the flat, alias-addressed processing chain
//! - **Pipeline:** the element chain plus debug and resource settings
//! - **Objects:** source/sink object descriptors and their endpoint configuration
//! - **Kinds:** the pipeline kinds the control plane issues jobs for
//!
//! The JSON wire shape matches what the scheduler serializes into the
//! worker's environment.

pub mod element;
pub mod job;
pub mod kind;
pub mod object;
pub mod pipeline;

pub use element::*;
pub use job::*;
pub use kind::*;
pub use object::*;
pub use pipeline::*;
