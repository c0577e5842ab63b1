//! SHA-256 tree hash and linear hash.
//!
//! The tree hash splits the payload in 1 MiB blocks, hashes each block and
//! then hashes concatenated digest pairs level by level until a single root
//! is left. An odd digest at the end of a level moves up unchanged.

use sha2::{Digest, Sha256};

/// Block size of the tree hash leaves.
pub const TREE_HASH_BLOCK: usize = 1024 * 1024;

/// Streaming tree hash. Data may be fed at any boundary.
#[derive(Clone, Default)]
pub struct TreeHasher {
    block: Sha256,
    block_len: usize,
    leaves: Vec<[u8; 32]>,
}

impl TreeHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let take = (TREE_HASH_BLOCK - self.block_len).min(data.len());
            self.block.update(&data[..take]);
            self.block_len += take;
            data = &data[take..];

            if self.block_len == TREE_HASH_BLOCK {
                self.leaves.push(self.block.finalize_reset().into());
                self.block_len = 0;
            }
        }
    }

    pub fn finalize(mut self) -> [u8; 32] {
        if self.block_len > 0 || self.leaves.is_empty() {
            self.leaves.push(self.block.finalize().into());
        }

        let mut level = self.leaves;
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => {
                        let mut hasher = Sha256::new();
                        hasher.update(left);
                        hasher.update(right);
                        hasher.finalize().into()
                    }
                    [single] => *single,
                    _ => unreachable!("chunks(2) yields one or two digests"),
                })
                .collect();
        }
        level[0]
    }

    /// Hex-encoded root digest.
    pub fn finalize_hex(self) -> String {
        hex::encode(self.finalize())
    }
}

/// Hex-encoded tree hash of `data`.
pub fn tree_hash(data: &[u8]) -> String {
    let mut hasher = TreeHasher::new();
    hasher.update(data);
    hasher.finalize_hex()
}

/// Hex-encoded SHA-256 of the whole payload.
pub fn linear_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    fn pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let mut joined = left.to_vec();
        joined.extend_from_slice(right);
        sha(&joined)
    }

    #[test]
    fn test_small_payload_tree_hash_is_plain_sha256() {
        let data = b"Important information for the test backup";
        assert_eq!(
            tree_hash(data),
            "cb63324d2c35cdfcb4521e15ca4518bd0ed9dc2364a9f47de75151b3f9b4b705"
        );
        assert_eq!(tree_hash(data), linear_hash(data));
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(tree_hash(&[]), linear_hash(&[]));
    }

    #[test]
    fn test_three_blocks() {
        let data: Vec<u8> = (0..3 * TREE_HASH_BLOCK + 10).map(|i| (i % 251) as u8).collect();
        let blocks: Vec<[u8; 32]> = data.chunks(TREE_HASH_BLOCK).map(sha).collect();
        assert_eq!(blocks.len(), 4);

        let expected = pair(&pair(&blocks[0], &blocks[1]), &pair(&blocks[2], &blocks[3]));
        assert_eq!(tree_hash(&data), hex::encode(expected));
        assert_ne!(tree_hash(&data), linear_hash(&data));
    }

    #[test]
    fn test_odd_leaf_is_promoted() {
        let data: Vec<u8> = (0..2 * TREE_HASH_BLOCK + 1).map(|i| (i % 7) as u8).collect();
        let blocks: Vec<[u8; 32]> = data.chunks(TREE_HASH_BLOCK).map(sha).collect();

        let expected = pair(&pair(&blocks[0], &blocks[1]), &blocks[2]);
        assert_eq!(tree_hash(&data), hex::encode(expected));
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let data: Vec<u8> = (0..TREE_HASH_BLOCK * 2 + 12345).map(|i| (i * 31 % 256) as u8).collect();

        let mut hasher = TreeHasher::new();
        for piece in data.chunks(100_003) {
            hasher.update(piece);
        }
        assert_eq!(hasher.finalize_hex(), tree_hash(&data));
    }
}
