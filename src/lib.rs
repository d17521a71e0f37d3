//! Purpose: Library crate for `fq`, an append-only file queue with an offset index.
//! Exports: `api` (writer, reader, storage handles, errors).
//! Role: Backs the `fq` CLI and tests; `api` is the public surface.
//! Invariants: A queue is two files, `<name>` (log) and `<name>.index` (index).
//! Invariants: Records are only appended; sequence numbers are write positions.
mod core;

pub mod api;
