//! The bitstream module is the bit-level I/O layer for coded blocks.
//!
//! Code words are packed most significant bit first. The last byte of a payload is
//! padded with zero bits, and the packer reports how many, so the block header can
//! record the pad count.
//!
//! - bitpacker: Packs code words into a byte buffer.
//! - bitreader: Reads a byte source back one bit at a time.
//!
pub mod bitpacker;
pub mod bitreader;
