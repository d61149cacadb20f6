//! The container module holds the multi-file formats and the password gate they share.
//!
//! - archive: Indexed archive with random access to single entries.
//! - folder: Archives of a whole directory tree, indexed or as a sequential stream.
//! - password: SHA-256 password check. Data is not encrypted.
//!

pub mod archive;
pub mod folder;
pub mod password;
