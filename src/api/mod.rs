//! Purpose: Define the public Rust API boundary for fq queues.
//! Exports: Writer/Reader types, storage handle trait, framing constants, errors.
//! Role: Additive-only surface; internal modules stay private.
//! Invariants: This module is the only public path to queue primitives.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind, StorageFault};
pub use crate::core::frame::{INDEX_ENTRY_LEN, LENGTH_PREFIX_LEN};
pub use crate::core::reader::Reader;
pub use crate::core::storage::{AppendHandle, INDEX_SUFFIX, QueuePaths};
pub use crate::core::writer::{Appended, Durability, Writer, WriterOptions};
