//! Tree hashing
//!
//! The archive service verifies uploads with a tree hash: the data is cut into
//! fixed 1 MiB chunks, each chunk gets a sha256 leaf, and the leaves are reduced
//! pairwise into a single root.
//!
//! ```text
//!   d0   d1   d2   d3   d4
//!    \   /     \   /    |
//!     P01       P23     d4      <- odd leaf is carried up as it is
//!        \     /        |
//!        P0123          d4
//!            \         /
//!              root
//! ```
//!
//! The chunk size is fixed by the protocol and has nothing to do with the part
//! size used for the upload, so a part's leaves are always a contiguous slice of
//! the archive's leaves.
use crate::hash::Hash;

#[allow(clippy::identity_op)]
pub const HASH_CHUNK_SIZE: usize = 1 * 1024 * 1024;

/// Hashes `data` in `HASH_CHUNK_SIZE` chunks and appends one leaf per chunk,
/// in order. The final chunk may be short, empty `data` appends nothing.
pub fn chunk_digests(data: &[u8], leaves: &mut Vec<Hash>) {
    leaves.extend(data.chunks(HASH_CHUNK_SIZE).map(Hash::digest));
}

/// Reduces the leaves down to the root, `None` if there are no leaves.
pub fn tree_hash(leaves: &[Hash]) -> Option<Hash> {
    match leaves {
        [] => None,
        [root] => Some(*root),
        _ => {
            let mut level: Vec<Hash> = leaves.to_vec();

            while level.len() > 1 {
                let mut next = Vec::with_capacity((level.len() + 1) / 2);

                for pair in level.chunks(2) {
                    match pair {
                        [left, right] => next.push(Hash::pair(left, right)),
                        [odd] => next.push(*odd),
                        _ => unreachable!("chunks(2) yields one or two"),
                    }
                }
                level = next;
            }

            level.pop()
        }
    }
}

/// Tree hash of a whole buffer. An empty buffer hashes to `sha256("")`
pub fn tree_hash_bytes(data: &[u8]) -> Hash {
    let mut leaves = Vec::new();
    chunk_digests(data, &mut leaves);
    tree_hash(&leaves).unwrap_or_else(|| Hash::digest(&[]))
}
