//! Breadth-first tree (de)tokenization.
//!
//! The wire format interleaves six token contexts. Each visited node emits
//! `property + 1` (so leaves read as 0); leaves follow with predictor,
//! packed offset and the multiplier split into a power-of-two log and the
//! remaining bits, internal nodes with the packed split value. Child
//! indices are not transmitted: both sides derive them from the traversal
//! order.

use crate::predictor::Predictor;
use crate::token::{pack_signed, unpack_signed, Token, TreeContext};
use crate::tree::{Tree, TreeError, TreeNode, MAX_TREE_SIZE};
use std::collections::VecDeque;

/// Tokenize `tree` breadth-first. Returns the token stream together with
/// the BFS-renumbered tree the decoder will reconstruct.
pub fn tokenize_tree(tree: &Tree) -> Result<(Vec<Token>, Tree), TreeError> {
    if tree.len() > MAX_TREE_SIZE {
        return Err(TreeError::TooLarge(tree.len()));
    }
    let mut tokens = Vec::with_capacity(tree.len() * 3);
    let mut decoder = Tree::new();
    let mut queue = VecDeque::new();
    queue.push_back(0usize);
    while let Some(cur) = queue.pop_front() {
        let node = &tree.nodes[cur];
        tokens.push(Token::new(TreeContext::Property, (node.property + 1) as u64));
        if node.is_leaf() {
            if node.predictor.is_synthetic() {
                return Err(TreeError::InvalidLeafPredictor(node.predictor));
            }
            if node.multiplier == 0 {
                return Err(TreeError::Malformed("leaf multiplier is zero".into()));
            }
            let mul_log = node.multiplier.trailing_zeros();
            let mul_bits = (node.multiplier >> mul_log) - 1;
            tokens.push(Token::new(
                TreeContext::Predictor,
                node.predictor.index() as u64,
            ));
            tokens.push(Token::new(
                TreeContext::Offset,
                pack_signed(node.predictor_offset),
            ));
            tokens.push(Token::new(TreeContext::MultiplierLog, mul_log as u64));
            tokens.push(Token::new(TreeContext::MultiplierBits, mul_bits as u64));
            decoder.nodes.push(TreeNode {
                property: -1,
                splitval: 0,
                lchild: 0,
                rchild: 0,
                predictor: node.predictor,
                predictor_offset: node.predictor_offset,
                multiplier: node.multiplier,
            });
            continue;
        }
        let lchild = (decoder.len() + queue.len() + 1) as u32;
        decoder.nodes.push(TreeNode {
            property: node.property,
            splitval: node.splitval,
            lchild,
            rchild: lchild + 1,
            predictor: Predictor::Zero,
            predictor_offset: 0,
            multiplier: 1,
        });
        queue.push_back(node.lchild as usize);
        queue.push_back(node.rchild as usize);
        tokens.push(Token::new(
            TreeContext::SplitVal,
            pack_signed(node.splitval as i64),
        ));
    }
    Ok((tokens, decoder))
}

/// Rebuild the decoder tree from a token stream produced by
/// [`tokenize_tree`].
pub fn detokenize_tree(tokens: &[Token]) -> Result<Tree, TreeError> {
    let mut iter = tokens.iter();
    let mut next = |context: TreeContext| -> Result<u64, TreeError> {
        match iter.next() {
            Some(token) if token.context == context => Ok(token.value),
            Some(token) => Err(TreeError::Malformed(format!(
                "expected {:?} token, found {:?}",
                context, token.context
            ))),
            None => Err(TreeError::Malformed("token stream truncated".into())),
        }
    };

    let mut tree = Tree::new();
    // Nodes scheduled so far; grows by two per internal node.
    let mut scheduled = 1usize;
    while tree.len() < scheduled {
        let property = next(TreeContext::Property)? as i64 - 1;
        if property < 0 {
            let predictor = Predictor::from_index(next(TreeContext::Predictor)? as usize)
                .ok_or_else(|| TreeError::Malformed("predictor id out of range".into()))?;
            if predictor.is_synthetic() {
                return Err(TreeError::InvalidLeafPredictor(predictor));
            }
            let predictor_offset = unpack_signed(next(TreeContext::Offset)?);
            let mul_log = next(TreeContext::MultiplierLog)?;
            let mul_bits = next(TreeContext::MultiplierBits)?;
            if mul_log >= 32 || mul_bits > (u32::MAX >> mul_log) as u64 - 1 {
                return Err(TreeError::Malformed("multiplier out of range".into()));
            }
            tree.nodes.push(TreeNode {
                property: -1,
                splitval: 0,
                lchild: 0,
                rchild: 0,
                predictor,
                predictor_offset,
                multiplier: ((mul_bits + 1) as u32) << mul_log,
            });
            continue;
        }
        let splitval = unpack_signed(next(TreeContext::SplitVal)?);
        let lchild = scheduled as u32;
        scheduled += 2;
        if scheduled > MAX_TREE_SIZE {
            return Err(TreeError::TooLarge(scheduled));
        }
        tree.nodes.push(TreeNode {
            property: property as i32,
            splitval: splitval as i32,
            lchild,
            rchild: lchild + 1,
            predictor: Predictor::Zero,
            predictor_offset: 0,
            multiplier: 1,
        });
    }
    if iter.next().is_some() {
        return Err(TreeError::Malformed("trailing tokens after tree".into()));
    }
    Ok(tree)
}
