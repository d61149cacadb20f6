//! Huffman and Shannon-Fano file compressor and archiver.
//!
//! Version 0.1.0
//!
//! Compresses single files into containers that remember the original file extension, and
//! many files (or a whole folder) into archives whose index allows extracting one entry
//! without touching the others. Either entropy coder can be used. Containers and archives
//! can be protected with a password, which gates extraction but does not encrypt.
//!
//! Long operations report progress, can be paused and can be cancelled through a
//! [`tools::control::Control`].
//!
//! Basic usage to compress a file is as follows:
//!
//! `$> mhar compress report.txt`
//!
//! This will create report.txt.huff next to the original.
//!
//! From code:
//!
//! ```
//! use mhar::{compress, decompress, Algorithm, CompressOptions, Control, DecompressOptions};
//!
//! let ctl = Control::default();
//! let packed = compress(b"abracadabra", &CompressOptions::new(Algorithm::ShannonFano), &ctl)?;
//! let restored = decompress(&packed, &DecompressOptions::new(Algorithm::ShannonFano), &ctl)?;
//! assert_eq!(restored, b"abracadabra");
//! # Ok::<(), mhar::Error>(())
//! ```
//!
pub mod bitstream;
pub mod compression;
pub mod container;
pub mod error;
pub mod huffman_coding;
pub mod tools;

pub use compression::compress::{compress, compress_file, compression_ratio};
pub use compression::decompress::{decompress, decompress_file};
pub use container::archive::{
    create_archive, create_archive_bytes, create_archive_file, extract_entry, list_entries,
    ArchiveReader, ArchiveSource,
};
pub use container::folder::{create_folder_archive, write_folder_stream_file};
pub use error::{Error, Result};
pub use tools::cli::{Algorithm, CodecOptions, CompressOptions, DecompressOptions};
pub use tools::control::{CancelToken, Control, PauseGate, ProgressSink};
