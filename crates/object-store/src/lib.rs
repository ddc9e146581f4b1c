//! gstjob Object Store
//!
//! Object store access for job inputs and outputs, plus the part-based
//! seekable writer sinks stream their output through.
//!
//! # Architecture
//!
//! ```text
//!  sink element (streaming thread)
//!          │ io::Write + io::Seek
//!          ▼
//!  ┌────────────────┐      ┌──────────────────────────────┐
//!  │ BlockingWriter │ ───▶ │ SeekWriter                   │
//!  └────────────────┘      │  resident parts (in memory)  │
//!                          │  uploaded parts (checksums)  │
//!                          └──────────────┬───────────────┘
//!                                         │ put / get / compose / delete
//!                                         ▼
//!                          ┌──────────────────────────────┐
//!                          │ ObjectStore (S3 or memory)   │
//!                          └──────────────────────────────┘
//! ```

pub mod blocking;
pub mod error;
pub mod memory;
pub mod s3;
pub mod store;
pub mod writer;

pub use blocking::BlockingWriter;
pub use error::{StorageError, StorageResult};
pub use memory::{MemoryObjectStore, StoreOp};
pub use s3::{AccessKeys, S3ObjectStore};
pub use store::{ObjectStore, OCTET_STREAM};
pub use writer::{part_key, SeekWriter, SharedWriter};
