//! Core model types for the meta-adaptive predictor-selection tree.
//!
//! This crate holds everything the decoder side of the codec needs to agree
//! on: the closed set of pixel predictors, signed packing and the hybrid-uint
//! residual tokenization, the decision-tree representation with validation
//! and lookup, breadth-first tree (de)tokenization, and canonical-JSON model
//! hashing for reproducibility checks. The learner itself lives in
//! `matree-trainer`.

pub mod canon;
pub mod predictor;
pub mod ser;
pub mod token;
pub mod tree;

pub use canon::{to_canonical_json, tree_hash, tree_hash_hex};
pub use predictor::{Predictor, NUM_MODULAR_PREDICTORS};
pub use ser::{detokenize_tree, tokenize_tree};
pub use token::{
    pack_signed, unpack_signed, HybridUintConfig, ResidualToken, Token, TreeContext, ANS_TAB_SIZE,
};
pub use tree::{Tree, TreeError, TreeNode, MAX_TREE_SIZE};
