//! Shannon-Fano coding: codes come from recursively splitting the frequency-sorted symbol
//! list where the running total first reaches half of the list's total. The result is
//! deterministic but not always optimal.

use log::trace;

use super::block::{PrefixTree, Step};
use super::code::{Code, CodeTable, FrequencyTable};
use crate::error::{Error, Result};

/// Build the Shannon-Fano code table for a frequency table.
pub fn sf_codes(freqs: &FrequencyTable) -> Result<CodeTable> {
    if freqs.is_empty() {
        return Err(Error::EmptyInput);
    }
    // Stable sort, so equal counts keep their table (first seen) order.
    let mut symbols = freqs.entries().to_vec();
    symbols.sort_by(|a, b| b.1.cmp(&a.1));

    let mut table = CodeTable::new();
    let mut stack = vec![(0, symbols.len(), Code::new())];
    while let Some((start, end, prefix)) = stack.pop() {
        let part = &symbols[start..end];
        if part.len() == 1 {
            // A one symbol alphabet still needs a one bit code.
            let code = if prefix.is_empty() {
                Code::new().with(false)
            } else {
                prefix
            };
            table.insert(part[0].0, code);
            continue;
        }

        let half = part.iter().map(|&(_, c)| c as u64).sum::<u64>() / 2;
        let mut acc = 0_u64;
        let mut split = 0;
        for (i, &(_, count)) in part.iter().enumerate() {
            acc += count as u64;
            if acc >= half {
                split = i;
                break;
            }
        }
        // The smallest count is never more than half, so the second half is never empty.
        let split = start + split.min(part.len() - 2) + 1;
        stack.push((split, end, prefix.with(true)));
        stack.push((start, split, prefix.with(false)));
    }
    trace!("Built {} shannon-fano codes.", table.len());
    Ok(table)
}

#[derive(Debug, Clone, Default)]
struct TrieNode {
    kids: [Option<usize>; 2],
    symbol: Option<u8>,
}

/// Binary trie over a code table, used to decode Shannon-Fano payloads.
#[derive(Debug, Clone)]
pub struct DecodeTrie {
    nodes: Vec<TrieNode>,
}

impl DecodeTrie {
    /// Insert every code. Fails if the table is not prefix-free.
    pub fn from_codes(codes: &CodeTable) -> Result<Self> {
        let mut nodes = vec![TrieNode::default()];
        for (sym, code) in codes.iter() {
            if code.is_empty() {
                return Err(Error::corrupt(format!("empty code for symbol {}", sym)));
            }
            let mut node = 0;
            for bit in code.bits() {
                if nodes[node].symbol.is_some() {
                    return Err(Error::corrupt("code table is not prefix-free"));
                }
                node = match nodes[node].kids[bit as usize] {
                    Some(next) => next,
                    None => {
                        nodes.push(TrieNode::default());
                        let next = nodes.len() - 1;
                        nodes[node].kids[bit as usize] = Some(next);
                        next
                    }
                };
            }
            if nodes[node].symbol.is_some() || nodes[node].kids.iter().any(Option::is_some) {
                return Err(Error::corrupt("code table is not prefix-free"));
            }
            nodes[node].symbol = Some(sym);
        }
        Ok(Self { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl PrefixTree for DecodeTrie {
    fn root(&self) -> usize {
        0
    }

    fn step(&self, node: usize, bit: bool) -> Option<Step> {
        let next = self.nodes.get(node)?.kids[bit as usize]?;
        Some(match self.nodes[next].symbol {
            Some(sym) => Step::Symbol(sym),
            None => Step::Node(next),
        })
    }
}
