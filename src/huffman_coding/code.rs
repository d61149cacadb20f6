//! Frequency tables, bit codes and code tables shared by both coders.

use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

/// Byte histogram, kept in the order each byte was first seen. That order is what gets
/// written to the block header and what breaks frequency ties when codes are built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    entries: Vec<(u8, u32)>,
}

impl FrequencyTable {
    /// Build a table from (symbol, count) pairs, e.g. as read back from a block header.
    /// Rejects empty tables, zero counts and repeated symbols.
    pub fn from_entries(entries: Vec<(u8, u32)>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::corrupt("empty symbol table"));
        }
        let mut seen = [false; 256];
        for &(sym, count) in &entries {
            if count == 0 {
                return Err(Error::corrupt(format!("symbol {} has a zero count", sym)));
            }
            if seen[sym as usize] {
                return Err(Error::corrupt(format!("symbol {} listed twice", sym)));
            }
            seen[sym as usize] = true;
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(u8, u32)] {
        &self.entries
    }

    /// Number of distinct symbols.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all counts, i.e. the length of the data the table describes.
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|&(_, c)| c as u64).sum()
    }

    pub fn get(&self, symbol: u8) -> Option<u32> {
        self.entries
            .iter()
            .find(|&&(s, _)| s == symbol)
            .map(|&(_, c)| c)
    }
}

/// A code word of up to 256 bits, stored most significant bit first.
///
/// No binary tree over 256 leaves is deeper than 255, so every code either coder can
/// produce fits.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Code {
    words: [u64; 4],
    len: u16,
}

impl Code {
    pub const MAX_LEN: usize = 256;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append one bit.
    pub fn push(&mut self, bit: bool) {
        let i = self.len as usize;
        debug_assert!(i < Self::MAX_LEN, "code longer than {} bits", Self::MAX_LEN);
        if bit {
            self.words[i / 64] |= 1 << (63 - i % 64);
        }
        self.len += 1;
    }

    /// A copy of this code with one more bit on the end.
    pub fn with(&self, bit: bool) -> Self {
        let mut next = *self;
        next.push(bit);
        next
    }

    /// The bit at position `i` (0 is the first bit sent).
    pub fn bit(&self, i: usize) -> bool {
        (self.words[i / 64] >> (63 - i % 64)) & 1 == 1
    }

    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len()).map(move |i| self.bit(i))
    }

    /// The code as right aligned pieces of at most 32 bits, each with its bit count.
    pub fn pieces(&self) -> impl Iterator<Item = (u32, u8)> + '_ {
        let len = self.len();
        (0..(len + 31) / 32).map(move |k| {
            let word = self.words[k / 2];
            let piece = if k % 2 == 0 { (word >> 32) as u32 } else { word as u32 };
            let bits = (len - k * 32).min(32) as u8;
            (piece >> (32 - bits as u32), bits)
        })
    }

    pub fn is_prefix_of(&self, other: &Code) -> bool {
        self.len <= other.len && (0..self.len()).all(|i| self.bit(i) == other.bit(i))
    }
}

impl Display for Code {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for bit in self.bits() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl Debug for Code {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Code({})", self)
    }
}

impl FromStr for Code {
    type Err = Error;

    /// Parse a string of '0' and '1' characters.
    fn from_str(s: &str) -> Result<Self> {
        if s.len() > Self::MAX_LEN {
            return Err(Error::corrupt("code too long"));
        }
        let mut code = Code::new();
        for c in s.chars() {
            match c {
                '0' => code.push(false),
                '1' => code.push(true),
                other => return Err(Error::corrupt(format!("bad code character {:?}", other))),
            }
        }
        Ok(code)
    }
}

/// Mapping from byte to code word.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeTable {
    codes: FxHashMap<u8, Code>,
}

impl CodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: u8, code: Code) {
        self.codes.insert(symbol, code);
    }

    pub fn get(&self, symbol: u8) -> Option<&Code> {
        self.codes.get(&symbol)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &Code)> + '_ {
        self.codes.iter().map(|(&s, c)| (s, c))
    }

    /// True if no code is a prefix of another. A one entry table is trivially prefix-free.
    pub fn is_prefix_free(&self) -> bool {
        let codes: Vec<&Code> = self.codes.values().collect();
        for (i, a) in codes.iter().enumerate() {
            for b in codes.iter().skip(i + 1) {
                if a.is_prefix_of(b) || b.is_prefix_of(a) {
                    return false;
                }
            }
        }
        true
    }

    /// Number of bits needed to code data with these frequencies, or None if a symbol in
    /// `freqs` has no code.
    pub fn encoded_bits(&self, freqs: &FrequencyTable) -> Option<u64> {
        freqs.entries().iter().try_fold(0_u64, |acc, &(sym, count)| {
            self.get(sym).map(|code| acc + count as u64 * code.len() as u64)
        })
    }
}
