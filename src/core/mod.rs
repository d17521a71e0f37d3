// Core modules: storage collaborator, framing codec, writer, reader, errors.
pub mod error;
pub mod frame;
pub mod reader;
pub mod storage;
pub mod writer;
