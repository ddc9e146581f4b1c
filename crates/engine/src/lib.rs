//! gstjob Engine
//!
//! Runs one transcoding job: builds the element graph for a job spec, binds
//! every sink node to a part-based object store writer, drives the pipeline
//! to end of stream, and finalizes the outputs.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                      JobRunner                        │
//! │  Idle ──▶ Running ──▶ Completed | Failed              │
//! │                                                       │
//! │  source ──▶ elements ...  ──▶ ObjectSink ──┐          │
//! │  (http)      (resolved topology)           │          │
//! │                                            ▼          │
//! │  Monitor (progress, dot snapshots)   SeekWriter       │
//! └────────────────────────────────────────────┬──────────┘
//!                                              ▼
//!                                         ObjectStore
//! ```

pub mod endpoints;
pub mod monitor;
pub mod runner;
pub mod sink;
pub mod source;

pub use endpoints::{BoundWriter, ObjectEndpoints, ObjectRole, S3StoreProvider, StoreProvider};
pub use monitor::{Monitor, SnapshotTarget};
pub use runner::{ExitStatus, JobOutcome, JobRunner, JobState};
pub use sink::ObjectSink;
pub use source::SourceElement;
