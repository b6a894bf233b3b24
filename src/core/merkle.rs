use crate::core::Transaction;
use crate::error::Result;
use crate::utils::sha256_digest;

/// Binary hash tree committing to an ordered transaction list.
///
/// Leaves are sha256 of each serialized transaction; an odd transaction
/// count repeats the last transaction, and any odd level above the leaves
/// repeats its last node.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    root: MerkleNode,
    leaf_count: usize,
}

#[derive(Debug, Clone)]
pub struct MerkleNode {
    hash: [u8; 32],
    left: Option<Box<MerkleNode>>,
    right: Option<Box<MerkleNode>>,
}

impl MerkleNode {
    fn leaf(hash: [u8; 32]) -> MerkleNode {
        MerkleNode {
            hash,
            left: None,
            right: None,
        }
    }

    fn parent(left: MerkleNode, right: MerkleNode) -> MerkleNode {
        MerkleNode {
            hash: hash_pair(&left.hash, &right.hash),
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }

    pub fn get_hash(&self) -> &[u8; 32] {
        &self.hash
    }

    pub fn get_left(&self) -> Option<&MerkleNode> {
        self.left.as_deref()
    }

    pub fn get_right(&self) -> Option<&MerkleNode> {
        self.right.as_deref()
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

impl MerkleTree {
    /// Build the tree; an empty list has no tree.
    pub fn build_from_transactions(transactions: &[Transaction]) -> Result<Option<MerkleTree>> {
        let Some(last) = transactions.last() else {
            return Ok(None);
        };

        let mut level = transactions
            .iter()
            .map(|tx| Ok(MerkleNode::leaf(sha256_digest(&tx.serialize()?))))
            .collect::<Result<Vec<_>>>()?;
        if transactions.len() % 2 == 1 {
            level.push(MerkleNode::leaf(sha256_digest(&last.serialize()?)));
        }
        let leaf_count = level.len();

        while level.len() > 1 {
            if level.len() % 2 == 1 {
                if let Some(tail) = level.last().cloned() {
                    level.push(tail);
                }
            }

            let mut next = Vec::with_capacity(level.len() / 2);
            let mut nodes = level.into_iter();
            while let (Some(left), Some(right)) = (nodes.next(), nodes.next()) {
                next.push(MerkleNode::parent(left, right));
            }
            level = next;
        }

        Ok(level
            .pop()
            .map(|root| MerkleTree { root, leaf_count }))
    }

    /// Root hash of `transactions`, or `None` for an empty list.
    pub fn compute_root(transactions: &[Transaction]) -> Result<Option<[u8; 32]>> {
        Ok(Self::build_from_transactions(transactions)?.map(|tree| *tree.root_hash()))
    }

    pub fn root_hash(&self) -> &[u8; 32] {
        &self.root.hash
    }

    pub fn root(&self) -> &MerkleNode {
        &self.root
    }

    /// Number of leaves after padding an odd transaction count.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }
}

fn hash_pair(left: &[u8], right: &[u8]) -> [u8; 32] {
    let mut combined = Vec::with_capacity(left.len() + right.len());
    combined.extend_from_slice(left);
    combined.extend_from_slice(right);
    sha256_digest(&sha256_digest(&combined))
}
