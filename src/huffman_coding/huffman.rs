use std::collections::BTreeMap;

use log::trace;

use super::block::{PrefixTree, Step};
use super::code::{Code, CodeTable, FrequencyTable};
use crate::error::{Error, Result};

/// What a node holds: either two children (indices into the tree's node list) or a symbol.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum NodeData {
    Kids(usize, usize),
    Leaf(u8),
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Node {
    pub weight: u64,
    pub node_data: NodeData,
}

impl Node {
    /// Create a new node
    pub fn new(weight: u64, node_data: NodeData) -> Node {
        Node { weight, node_data }
    }
}

/// A Huffman tree stored as an arena. Children are always created before their parent,
/// so the root is the last node pushed.
#[derive(Debug, Clone)]
pub struct HuffmanTree {
    nodes: Vec<Node>,
    root: usize,
}

impl HuffmanTree {
    /// Build the tree for a frequency table.
    ///
    /// Pending nodes are kept ordered by (weight, sequence number). The sequence number is
    /// handed out in insertion order, first to the leaves in table order and then to each
    /// merged node, so equal weights leave the queue first-in first-out. The first node
    /// taken becomes the left child.
    pub fn build(freqs: &FrequencyTable) -> Result<Self> {
        if freqs.is_empty() {
            return Err(Error::EmptyInput);
        }
        let mut nodes = Vec::with_capacity(freqs.len() * 2 - 1);
        let mut pending: BTreeMap<(u64, u64), usize> = BTreeMap::new();
        let mut seq = 0_u64;

        for &(sym, count) in freqs.entries() {
            nodes.push(Node::new(count as u64, NodeData::Leaf(sym)));
            pending.insert((count as u64, seq), nodes.len() - 1);
            seq += 1;
        }

        // Pare the queue down to one single node with child nodes.
        let mut root = 0;
        while let Some(((left_weight, _), left)) = pending.pop_first() {
            let ((right_weight, _), right) = match pending.pop_first() {
                Some(entry) => entry,
                None => {
                    root = left;
                    break;
                }
            };
            let weight = left_weight + right_weight;
            nodes.push(Node::new(weight, NodeData::Kids(left, right)));
            pending.insert((weight, seq), nodes.len() - 1);
            seq += 1;
        }

        trace!(
            "Built huffman tree with {} nodes over {} symbols.",
            nodes.len(),
            freqs.len()
        );
        Ok(Self { nodes, root })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn root_node(&self) -> &Node {
        &self.nodes[self.root]
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.node_data, NodeData::Leaf(_)))
            .count()
    }

    pub fn internal_count(&self) -> usize {
        self.nodes.len() - self.leaf_count()
    }

    /// Walk the tree and return the code for every leaf: "0" for a left edge, "1" for a
    /// right edge. A tree with a single leaf gets the one bit code "0".
    pub fn codes(&self) -> CodeTable {
        let mut table = CodeTable::new();
        if let NodeData::Leaf(sym) = self.root_node().node_data {
            table.insert(sym, Code::new().with(false));
            return table;
        }
        // Explicit stack rather than recursion. Push right first so left is visited first.
        let mut stack = vec![(self.root, Code::new())];
        while let Some((idx, code)) = stack.pop() {
            match self.nodes[idx].node_data {
                NodeData::Kids(left, right) => {
                    stack.push((right, code.with(true)));
                    stack.push((left, code.with(false)));
                }
                NodeData::Leaf(sym) => table.insert(sym, code),
            }
        }
        table
    }
}

impl PrefixTree for HuffmanTree {
    fn root(&self) -> usize {
        self.root
    }

    fn step(&self, node: usize, bit: bool) -> Option<Step> {
        match self.nodes.get(node)?.node_data {
            // Only a single-leaf tree has a leaf at the root; its code is "0".
            NodeData::Leaf(sym) if !bit => Some(Step::Symbol(sym)),
            NodeData::Leaf(_) => None,
            NodeData::Kids(left, right) => {
                let child = if bit { right } else { left };
                Some(match self.nodes[child].node_data {
                    NodeData::Leaf(sym) => Step::Symbol(sym),
                    NodeData::Kids(..) => Step::Node(child),
                })
            }
        }
    }
}
