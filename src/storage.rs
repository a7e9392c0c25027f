//! Persistence collaborators: the sink trait with its per-file and chunked
//! JSON implementations, plus checkpoint stores.

pub mod checkpoint;
pub mod chunked;
pub mod files;
pub mod sink;
