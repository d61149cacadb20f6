//! The compression module codes whole streams and wraps them as single-file containers.
//!
//! A stream is split into chunks (1 MiB by default). Each chunk is coded on its own and the
//! coded blocks are written back to back. Decoding reads blocks until the stream ends.
//!
//! A single-file container puts a short header in front of the coded stream: the original
//! file extension and an optional password hash. Decompression checks the header and the
//! password before it decodes any data.
//!

pub mod chunked;
pub mod compress;
pub mod decompress;
