//! One coded block: a frequency table, a pad bit count and the packed payload.
//!
//! Wire layout, all integers little-endian:
//!
//! `[tag byte, Shannon-Fano only] int32 symbolCount, symbolCount x (u8 symbol, int32 count),
//! int32 padBits, payload`
//!
//! The payload length is not stored. It follows from the table: rebuild the codes, sum
//! count x code length and round up to whole bytes. The pad count derived the same way
//! must match the stored one.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::trace;

use super::code::{CodeTable, FrequencyTable};
use super::huffman::HuffmanTree;
use super::shannon_fano::{sf_codes, DecodeTrie};
use crate::bitstream::bitpacker::BitPacker;
use crate::bitstream::bitreader::BitReader;
use crate::error::{truncated, Error, Result};
use crate::tools::cli::Algorithm;
use crate::tools::control::{Control, CHECKPOINT_INTERVAL};
use crate::tools::freq_count::freqs;

/// Result of following one bit from a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Still inside the tree, at this node.
    Node(usize),
    /// Reached a leaf.
    Symbol(u8),
}

/// A binary decode tree walked one bit at a time.
pub trait PrefixTree {
    fn root(&self) -> usize;
    /// Follow `bit` from `node`. None means no code continues that way.
    fn step(&self, node: usize, bit: bool) -> Option<Step>;
}

/// The codes for one block, plus the structure that decodes them.
enum Coder {
    Huffman(HuffmanTree, CodeTable),
    ShannonFano(DecodeTrie, CodeTable),
}

impl Coder {
    fn build(algorithm: Algorithm, freqs: &FrequencyTable) -> Result<Self> {
        Ok(match algorithm {
            Algorithm::Huffman => {
                let tree = HuffmanTree::build(freqs)?;
                let codes = tree.codes();
                Coder::Huffman(tree, codes)
            }
            Algorithm::ShannonFano => {
                let codes = sf_codes(freqs)?;
                Coder::ShannonFano(DecodeTrie::from_codes(&codes)?, codes)
            }
        })
    }

    fn codes(&self) -> &CodeTable {
        match self {
            Coder::Huffman(_, codes) | Coder::ShannonFano(_, codes) => codes,
        }
    }

    fn tree(&self) -> &dyn PrefixTree {
        match self {
            Coder::Huffman(tree, _) => tree,
            Coder::ShannonFano(trie, _) => trie,
        }
    }

    /// Payload size in bytes and pad bits for data with these frequencies.
    fn payload_size(&self, freqs: &FrequencyTable) -> Result<(u64, u8)> {
        let bits = self
            .codes()
            .encoded_bits(freqs)
            .ok_or_else(|| Error::corrupt("symbol without a code"))?;
        Ok(((bits + 7) / 8, ((8 - bits % 8) % 8) as u8))
    }
}

/// A self-contained coded chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodedBlock {
    pub freqs: FrequencyTable,
    pub pad: u8,
    pub payload: Vec<u8>,
}

impl CodedBlock {
    /// Encode one chunk. Fails with [`Error::EmptyInput`] on an empty chunk.
    pub fn encode(data: &[u8], algorithm: Algorithm, ctl: &Control) -> Result<Self> {
        let freqs = freqs(data)?;
        ctl.checkpoint()?;
        let coder = Coder::build(algorithm, &freqs)?;
        let codes = coder.codes();
        let (size, _) = coder.payload_size(&freqs)?;

        let mut packer = BitPacker::new(size as usize);
        for (i, &byte) in data.iter().enumerate() {
            if i % CHECKPOINT_INTERVAL == 0 {
                ctl.checkpoint()?;
            }
            let code = codes
                .get(byte)
                .ok_or_else(|| Error::corrupt(format!("no code for byte {}", byte)))?;
            packer.out_code(code);
        }
        trace!("Packed {} bytes into {} bits.", data.len(), packer.loc());
        let pad = packer.flush();

        Ok(Self {
            freqs,
            pad,
            payload: packer.output,
        })
    }

    /// Decode the payload back to the original chunk.
    pub fn decode(&self, algorithm: Algorithm, ctl: &Control) -> Result<Vec<u8>> {
        let coder = Coder::build(algorithm, &self.freqs)?;
        let tree = coder.tree();
        let total = self.freqs.total();

        let mut out = Vec::with_capacity(total.min(self.payload.len() as u64 * 8) as usize);
        let mut reader = BitReader::new(self.payload.as_slice());
        let mut node = tree.root();
        // Stop at the symbol count, so the pad bits are never interpreted.
        while (out.len() as u64) < total {
            let bit = reader
                .bool_bit()?
                .ok_or_else(|| Error::corrupt("payload ended before the last symbol"))?;
            match tree.step(node, bit) {
                Some(Step::Node(next)) => node = next,
                Some(Step::Symbol(sym)) => {
                    out.push(sym);
                    node = tree.root();
                    if out.len() % CHECKPOINT_INTERVAL == 0 {
                        ctl.checkpoint()?;
                    }
                }
                None => {
                    return Err(Error::corrupt(format!(
                        "no code matches the bits at {}",
                        reader.loc()
                    )))
                }
            }
        }
        Ok(out)
    }

    /// Serialized size in bytes.
    pub fn wire_len(&self, algorithm: Algorithm) -> u64 {
        let tag = match algorithm {
            Algorithm::Huffman => 0,
            Algorithm::ShannonFano => 1,
        };
        tag + 4 + 5 * self.freqs.len() as u64 + 4 + self.payload.len() as u64
    }

    /// Write the block. Returns the number of bytes written.
    pub fn write_to<W: Write>(&self, w: &mut W, algorithm: Algorithm) -> Result<u64> {
        if let Algorithm::ShannonFano = algorithm {
            w.write_u8(algorithm.tag())?;
        }
        w.write_i32::<LittleEndian>(self.freqs.len() as i32)?;
        for &(sym, count) in self.freqs.entries() {
            let count = i32::try_from(count).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "symbol count exceeds int32")
            })?;
            w.write_u8(sym)?;
            w.write_i32::<LittleEndian>(count)?;
        }
        w.write_i32::<LittleEndian>(self.pad as i32)?;
        w.write_all(&self.payload)?;
        Ok(self.wire_len(algorithm))
    }

    /// Read the next block. Returns Ok(None) if the source is already at its end.
    pub fn read_from<R: Read>(r: &mut R, algorithm: Algorithm) -> Result<Option<Self>> {
        let first = match read_first_byte(r)? {
            Some(byte) => byte,
            None => return Ok(None),
        };
        let count = match algorithm {
            Algorithm::Huffman => {
                let mut rest = [0_u8; 3];
                r.read_exact(&mut rest).map_err(truncated("block header"))?;
                i32::from_le_bytes([first, rest[0], rest[1], rest[2]])
            }
            Algorithm::ShannonFano => {
                if first != algorithm.tag() {
                    return Err(Error::corrupt(format!(
                        "expected shannon-fano block tag, found {:#04x}",
                        first
                    )));
                }
                r.read_i32::<LittleEndian>()
                    .map_err(truncated("block header"))?
            }
        };
        if !(1..=256).contains(&count) {
            return Err(Error::corrupt(format!("invalid symbol count {}", count)));
        }

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let sym = r.read_u8().map_err(truncated("symbol table"))?;
            let freq = r
                .read_i32::<LittleEndian>()
                .map_err(truncated("symbol table"))?;
            if freq <= 0 {
                return Err(Error::corrupt(format!("invalid count {} for symbol {}", freq, sym)));
            }
            entries.push((sym, freq as u32));
        }
        let freqs = FrequencyTable::from_entries(entries)?;

        let pad = r
            .read_i32::<LittleEndian>()
            .map_err(truncated("block header"))?;
        if !(0..=7).contains(&pad) {
            return Err(Error::corrupt(format!("invalid pad count {}", pad)));
        }

        let (size, expected_pad) = Coder::build(algorithm, &freqs)?.payload_size(&freqs)?;
        if pad as u8 != expected_pad {
            return Err(Error::corrupt(format!(
                "pad count {} does not match the symbol table (expected {})",
                pad, expected_pad
            )));
        }

        let mut payload = Vec::new();
        r.take(size).read_to_end(&mut payload)?;
        if (payload.len() as u64) < size {
            return Err(Error::corrupt("truncated block payload"));
        }
        Ok(Some(Self {
            freqs,
            pad: pad as u8,
            payload,
        }))
    }
}

/// Read one byte, or None at a clean end of stream.
fn read_first_byte<R: Read>(r: &mut R) -> io::Result<Option<u8>> {
    let mut byte = [0_u8; 1];
    loop {
        match r.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const BOTH: [Algorithm; 2] = [Algorithm::Huffman, Algorithm::ShannonFano];

    fn round_trip(data: &[u8], algorithm: Algorithm) -> Vec<u8> {
        let ctl = Control::default();
        let block = CodedBlock::encode(data, algorithm, &ctl).unwrap();
        let mut wire = Vec::new();
        let written = block.write_to(&mut wire, algorithm).unwrap();
        assert_eq!(written, wire.len() as u64);
        let back = CodedBlock::read_from(&mut wire.as_slice(), algorithm)
            .unwrap()
            .unwrap();
        assert_eq!(back, block);
        back.decode(algorithm, &ctl).unwrap()
    }

    #[test]
    fn round_trip_test() {
        let text = b"It was the best of times, it was the worst of times.";
        for algorithm in BOTH {
            assert_eq!(round_trip(text, algorithm), text);
            assert_eq!(round_trip(b"x", algorithm), b"x");
        }
    }

    #[test]
    fn repeated_byte_layout_test() {
        let data = vec![0x41_u8; 10_000];
        let block = CodedBlock::encode(&data, Algorithm::Huffman, &Control::default()).unwrap();
        assert_eq!(block.payload.len(), 1250);
        assert_eq!(block.pad, 0);

        let mut wire = Vec::new();
        block.write_to(&mut wire, Algorithm::Huffman).unwrap();
        // count, one (symbol, count) pair, pad, payload
        assert_eq!(wire.len(), 4 + 5 + 4 + 1250);
        assert_eq!(&wire[..4], &1_i32.to_le_bytes());
        assert_eq!(wire[4], 0x41);
        assert_eq!(&wire[5..9], &10_000_i32.to_le_bytes());
        assert_eq!(&wire[9..13], &0_i32.to_le_bytes());
        assert!(wire[13..].iter().all(|&b| b == 0));
        assert_eq!(round_trip(&data, Algorithm::Huffman), data);
    }

    #[test]
    fn pad_bits_are_not_decoded_test() {
        // Three one-bit codes leave 5 pad bits that would decode as more symbols
        for algorithm in BOTH {
            let block = CodedBlock::encode(b"aaa", algorithm, &Control::default()).unwrap();
            assert_eq!(block.pad, 5);
            assert_eq!(round_trip(b"aaa", algorithm), b"aaa");
        }
    }

    #[test]
    fn all_byte_values_test() {
        let data: Vec<u8> = (0..=255).collect();
        for algorithm in BOTH {
            assert_eq!(round_trip(&data, algorithm), data);
        }
    }

    #[test]
    fn shannon_fano_tag_test() {
        let block = CodedBlock::encode(b"tag", Algorithm::ShannonFano, &Control::default()).unwrap();
        let mut wire = Vec::new();
        block.write_to(&mut wire, Algorithm::ShannonFano).unwrap();
        assert_eq!(wire[0], Algorithm::ShannonFano.tag());
        assert_eq!(&wire[1..5], &3_i32.to_le_bytes());
        // Reading it as a huffman block fails instead of decoding garbage
        assert!(matches!(
            CodedBlock::read_from(&mut wire.as_slice(), Algorithm::Huffman),
            Err(Error::CorruptFormat(_))
        ));
    }

    #[test]
    fn empty_source_reads_none_test() {
        let mut empty: &[u8] = &[];
        assert!(CodedBlock::read_from(&mut empty, Algorithm::Huffman)
            .unwrap()
            .is_none());
    }

    #[test]
    fn truncated_block_test() {
        let block = CodedBlock::encode(b"truncate me", Algorithm::Huffman, &Control::default()).unwrap();
        let mut wire = Vec::new();
        block.write_to(&mut wire, Algorithm::Huffman).unwrap();
        for cut in [2, 7, wire.len() - 1] {
            let res = CodedBlock::read_from(&mut &wire[..cut], Algorithm::Huffman);
            assert!(matches!(res, Err(Error::CorruptFormat(_))), "cut at {}", cut);
        }
    }

    #[test]
    fn wrong_pad_is_rejected_test() {
        let block = CodedBlock::encode(b"aaa", Algorithm::Huffman, &Control::default()).unwrap();
        let mut wire = Vec::new();
        block.write_to(&mut wire, Algorithm::Huffman).unwrap();
        wire[9] = 2;
        assert!(matches!(
            CodedBlock::read_from(&mut wire.as_slice(), Algorithm::Huffman),
            Err(Error::CorruptFormat(_))
        ));
    }

    #[test]
    fn cancelled_encode_test() {
        let ctl = Control::default();
        ctl.cancel_token().cancel();
        assert!(matches!(
            CodedBlock::encode(b"never", Algorithm::Huffman, &ctl),
            Err(Error::Cancelled)
        ));
    }
}
