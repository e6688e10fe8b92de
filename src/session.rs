use pcore::hash::Hash;
use pcore::tree;

// State of one archive upload. Owned by the uploader for the whole run and only
// ever grows: leaves are appended in stream order and never touched again.
#[derive(Debug)]
pub struct UploadSession {
    upload_id: String,
    part_size: usize,
    archive_size: u64,
    leaves: Vec<Hash>,
    checksum: Option<Hash>,
}

impl UploadSession {
    pub fn new(upload_id: String, part_size: usize) -> Self {
        UploadSession {
            upload_id,
            part_size,
            archive_size: 0,
            leaves: Vec::new(),
            checksum: None,
        }
    }

    /// Hashes one part worth of data into the session and returns the part's
    /// own tree hash, which only covers the leaves of this part.
    pub fn hash_part(&mut self, data: &[u8]) -> Hash {
        let first = self.leaves.len();

        self.archive_size += data.len() as u64;
        tree::chunk_digests(data, &mut self.leaves);

        tree::tree_hash(&self.leaves[first..]).unwrap_or_else(|| Hash::digest(&[]))
    }

    /// Archive tree hash over every leaf seen so far. Computed on the first
    /// call, later calls hand back the same value. `None` if nothing was read.
    pub fn seal(&mut self) -> Option<Hash> {
        if self.checksum.is_none() {
            self.checksum = tree::tree_hash(&self.leaves);
        }
        self.checksum
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    pub fn archive_size(&self) -> u64 {
        self.archive_size
    }

    pub fn leaves(&self) -> &[Hash] {
        &self.leaves
    }

    pub fn checksum(&self) -> Option<Hash> {
        self.checksum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcore::tree::HASH_CHUNK_SIZE;

    #[test]
    fn part_hash_covers_only_that_part() {
        let mut session = UploadSession::new("id".to_string(), 2 * HASH_CHUNK_SIZE);

        let first = vec![1u8; 2 * HASH_CHUNK_SIZE];
        let second = vec![2u8; 10];

        assert_eq!(session.hash_part(&first), tree::tree_hash_bytes(&first));
        assert_eq!(session.hash_part(&second), tree::tree_hash_bytes(&second));

        assert_eq!(session.leaves().len(), 3);
        assert_eq!(session.archive_size(), 2 * HASH_CHUNK_SIZE as u64 + 10);
    }

    #[test]
    fn leaf_count_follows_size() {
        let mut session = UploadSession::new("id".to_string(), HASH_CHUNK_SIZE);

        for len in [HASH_CHUNK_SIZE, HASH_CHUNK_SIZE, 1] {
            session.hash_part(&vec![0u8; len]);

            let expect = session.archive_size().div_ceil(HASH_CHUNK_SIZE as u64);
            assert_eq!(session.leaves().len() as u64, expect);
        }
    }

    #[test]
    fn seal_is_stable() {
        let mut session = UploadSession::new("id".to_string(), HASH_CHUNK_SIZE);
        assert_eq!(session.checksum(), None);

        session.hash_part(b"abc");
        let sealed = session.seal();
        assert_eq!(sealed, Some(Hash::digest(b"abc")));
        assert_eq!(session.seal(), sealed);
        assert_eq!(session.checksum(), sealed);
    }

    #[test]
    fn seal_empty() {
        let mut session = UploadSession::new("id".to_string(), HASH_CHUNK_SIZE);
        assert_eq!(session.seal(), None);
    }
}
