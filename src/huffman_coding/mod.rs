//! The huffman_coding module turns byte frequencies into prefix codes and codes blocks
//! with them.
//!
//! Two coders are available. Huffman builds an optimal tree by repeatedly merging the two
//! lightest nodes. Shannon-Fano sorts symbols by frequency and splits the list where the
//! running total first reaches half, which is simpler but not always optimal.
//!
//! Both coders are deterministic: ties are broken by the order in which symbols first
//! appear in the block, so the decoder rebuilds exactly the same codes from the stored
//! frequency table.
//!
//! Every block carries its own frequency table. Nothing is shared between blocks.
//!

pub mod block;
pub mod code;
pub mod huffman;
pub mod shannon_fano;
