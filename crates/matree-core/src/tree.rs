//! Decision tree representation.
//!
//! A tree is a contiguous node array with the root at index 0. Internal
//! nodes test one property against a threshold and route strictly-greater
//! values to the right child; leaves carry a predictor, an offset, and a
//! power-of-two multiplier applied to decoded residuals.

use crate::predictor::Predictor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard upper bound on serialized tree size.
pub const MAX_TREE_SIZE: usize = 1 << 22;

/// Errors surfaced by tree validation and (de)serialization.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("tree has {0} nodes, limit is {MAX_TREE_SIZE}")]
    TooLarge(usize),

    #[error("leaf carries synthetic predictor {0:?}")]
    InvalidLeafPredictor(Predictor),

    #[error("malformed tree: {0}")]
    Malformed(String),
}

/// A single node, internal (`property >= 0`) or leaf (`property == -1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Property id tested by this node, `-1` for leaves.
    pub property: i32,

    /// Split threshold in raw property space; right child iff value is
    /// strictly greater.
    pub splitval: i32,

    /// Left child index (values `<= splitval`); unused on leaves.
    pub lchild: u32,

    /// Right child index (values `> splitval`); unused on leaves.
    pub rchild: u32,

    /// Leaf predictor.
    pub predictor: Predictor,

    /// Offset added to the leaf prediction.
    pub predictor_offset: i64,

    /// Power-of-two residual multiplier.
    pub multiplier: u32,
}

impl TreeNode {
    pub fn leaf(predictor: Predictor) -> TreeNode {
        TreeNode {
            property: -1,
            splitval: 0,
            lchild: 0,
            rchild: 0,
            predictor,
            predictor_offset: 0,
            multiplier: 1,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.property < 0
    }
}

/// A full decision tree (node 0 is the root).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    pub fn new() -> Tree {
        Tree { nodes: Vec::new() }
    }

    /// A one-node tree: the root is a leaf with the given predictor.
    pub fn single_leaf(predictor: Predictor) -> Tree {
        Tree {
            nodes: vec![TreeNode::leaf(predictor)],
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Structural validation: child indices strictly above their parent (so
    /// the tree is acyclic), leaves decodable, size within budget.
    pub fn validate(&self) -> Result<(), TreeError> {
        if self.nodes.is_empty() {
            return Err(TreeError::Malformed("tree has no nodes".into()));
        }
        if self.nodes.len() > MAX_TREE_SIZE {
            return Err(TreeError::TooLarge(self.nodes.len()));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                if node.predictor.is_synthetic() {
                    return Err(TreeError::InvalidLeafPredictor(node.predictor));
                }
                if node.multiplier == 0 || !node.multiplier.is_power_of_two() {
                    return Err(TreeError::Malformed(format!(
                        "leaf {i} multiplier {} is not a power of two",
                        node.multiplier
                    )));
                }
            } else {
                for child in [node.lchild, node.rchild] {
                    if child as usize <= i || child as usize >= self.nodes.len() {
                        return Err(TreeError::Malformed(format!(
                            "node {i} has out-of-order child {child}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Walk the tree for one property vector (indexed by property id) and
    /// return the selected leaf. Missing properties read as zero.
    pub fn lookup(&self, properties: &[i32]) -> &TreeNode {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            if node.is_leaf() {
                return node;
            }
            let value = properties.get(node.property as usize).copied().unwrap_or(0);
            idx = if value > node.splitval {
                node.rchild as usize
            } else {
                node.lchild as usize
            };
        }
    }
}
