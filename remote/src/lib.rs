#[cfg(feature = "sql")]
pub mod sql;

#[cfg(feature = "glacier")]
pub mod glacier;

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    /// The service refused the call, a checksum mismatch lands here too
    #[error("remote rejected the request: {0}")]
    Rejected(String),
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[cfg(feature = "sql")]
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
}

/// Inclusive span of absolute archive offsets covered by one part
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Range of part `part` holding `len` bytes. Only the last part may be
    /// short so the end is clamped to what was actually read.
    pub fn for_part(part: u64, part_size: usize, len: usize) -> Self {
        let start = part * part_size as u64;
        let len = len.min(part_size) as u64;

        ByteRange {
            start,
            end: start + len.saturating_sub(1),
        }
    }

    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }
}

// Total archive size is not known while uploading, hence the `*`
impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}/*", self.start, self.end)
    }
}

/// What the service hands back once an archive is assembled
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveReceipt {
    pub archive_id: String,
    pub location: Option<String>,
    pub checksum: Option<String>,
}

impl fmt::Display for ArchiveReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "archiveId: {}", self.archive_id)?;
        if let Some(location) = &self.location {
            writeln!(f, "location: {}", location)?;
        }
        if let Some(checksum) = &self.checksum {
            writeln!(f, "checksum: {}", checksum)?;
        }
        Ok(())
    }
}

// Multipart archive upload, one session per archive.
// Calls are blocking, the scheduler never has more than one in flight.
pub trait Remote {
    fn begin_session(
        &self,
        vault: &str,
        description: Option<&str>,
        part_size: usize,
    ) -> Result<String, RemoteError>;

    fn submit_part(
        &self,
        upload_id: &str,
        vault: &str,
        range: &ByteRange,
        body: &[u8],
        checksum: &str,
    ) -> Result<(), RemoteError>;

    fn finalize_session(
        &self,
        upload_id: &str,
        vault: &str,
        archive_size: u64,
        checksum: &str,
    ) -> Result<ArchiveReceipt, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    #[test]
    fn full_parts() {
        assert_eq!(ByteRange::for_part(0, MIB, MIB).to_string(), "bytes 0-1048575/*");
        assert_eq!(
            ByteRange::for_part(1, MIB, MIB).to_string(),
            "bytes 1048576-2097151/*"
        );
        assert_eq!(
            ByteRange::for_part(2, MIB, MIB).to_string(),
            "bytes 2097152-3145727/*"
        );
    }

    #[test]
    fn short_last_part() {
        let range = ByteRange::for_part(3, 4 * MIB, 10);

        assert_eq!(range.start, 12 * MIB as u64);
        assert_eq!(range.end, 12 * MIB as u64 + 9);
        assert_eq!(range.size(), 10);
    }

    #[test]
    fn clamped_to_part_size() {
        let range = ByteRange::for_part(1, 4, 10);
        assert_eq!(range, ByteRange { start: 4, end: 7 });
    }

    #[test]
    fn receipt_display() {
        let receipt = ArchiveReceipt {
            archive_id: "abc".to_string(),
            location: None,
            checksum: Some("ff".to_string()),
        };
        assert_eq!(receipt.to_string(), "archiveId: abc\nchecksum: ff\n");
    }
}
