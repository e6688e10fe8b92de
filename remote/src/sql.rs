use iter_read::IterRead;
use log::debug;
use rusqlite as rs;
use rusqlite::{Connection, OptionalExtension};

// Single threaded but we are on one thread here for now
use std::rc::Rc;

use pcore::buf::fill_buf;
use pcore::hash;
use pcore::hash::Hash;
use pcore::tree;

use crate::{ArchiveReceipt, ByteRange, Remote, RemoteError};

#[allow(clippy::identity_op)]
const MIN_PART_SIZE: u64 = 1 * 1024 * 1024;
const MAX_PART_SIZE: u64 = 4 * 1024 * 1024 * 1024;

// Stand-in for the archive service. Keeps the parts in sqlite and checks every
// call the way the service would: part sizes, ranges, part tree hashes, and on
// completion the whole archive tree hash recomputed from the stored bytes.
pub struct MemoryVault {
    conn: Rc<Connection>,
}

struct Upload {
    id: i64,
    part_size: u64,
}

impl MemoryVault {
    pub fn new(filename: Option<&str>) -> Result<Self, RemoteError> {
        let conn = match filename {
            None => Connection::open_in_memory()?,
            Some(f) => Connection::open(f)?,
        };

        // Setup the db
        conn.execute_batch(
            "BEGIN;
             CREATE TABLE IF NOT EXISTS vault (
                name VARCHAR NOT NULL,
                UNIQUE(name)
             );
             CREATE TABLE IF NOT EXISTS upload (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                vault VARCHAR NOT NULL,
                description VARCHAR,
                part_size INTEGER NOT NULL,
                archive VARCHAR
             );
             CREATE TABLE IF NOT EXISTS part (
                upload INTEGER NOT NULL,
                range_start INTEGER NOT NULL,
                range_end INTEGER NOT NULL,
                content BLOB NOT NULL,
                UNIQUE(upload, range_start)
             );
             COMMIT;",
        )?;

        Ok(MemoryVault {
            conn: Rc::new(conn),
        })
    }

    pub fn create_vault(&self, name: &str) -> Result<(), RemoteError> {
        self.conn
            .prepare_cached("INSERT OR IGNORE INTO vault (name) VALUES (?)")?
            .execute(rs::params![name])?;
        Ok(())
    }

    /// Number of parts currently held for an upload
    pub fn part_count(&self, upload_id: &str) -> Result<usize, RemoteError> {
        let id = parse_upload_id(upload_id)?;
        let count: i64 = self
            .conn
            .prepare_cached("SELECT COUNT(*) FROM part WHERE upload = ?")?
            .query_row(rs::params![id], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn open_upload(&self, upload_id: &str, vault: &str) -> Result<Upload, RemoteError> {
        let id = parse_upload_id(upload_id)?;
        let row: Option<(i64, Option<String>)> = self
            .conn
            .prepare_cached(
                "SELECT part_size, archive
                 FROM upload
                 WHERE id = ?
                 AND vault = ?",
            )?
            .query_row(rs::params![id, vault], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        match row {
            None => Err(rejected(format!("no upload {} in vault {}", upload_id, vault))),
            Some((_, Some(archive))) => Err(rejected(format!(
                "upload {} already completed as {}",
                upload_id, archive
            ))),
            Some((part_size, None)) => Ok(Upload {
                id,
                part_size: part_size as u64,
            }),
        }
    }

    // Walks the stored parts in order, they must tile the archive from 0
    fn check_layout(&self, upload: &Upload, archive_size: u64) -> Result<(), RemoteError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT range_start, range_end
             FROM part
             WHERE upload = ?
             ORDER BY range_start ASC",
        )?;
        let ranges = stmt
            .query_map(rs::params![upload.id], |row| {
                let start: i64 = row.get(0)?;
                let end: i64 = row.get(1)?;
                Ok(ByteRange {
                    start: start as u64,
                    end: end as u64,
                })
            })?
            .collect::<Result<Vec<ByteRange>, rs::Error>>()?;

        let mut expect = 0;
        for (idx, range) in ranges.iter().enumerate() {
            if range.start != expect {
                return Err(rejected(format!("missing data at offset {}", expect)));
            }
            if idx + 1 < ranges.len() && range.size() != upload.part_size {
                return Err(rejected(format!("short part inside archive: {}", range)));
            }
            expect = range.end + 1;
        }

        if expect != archive_size {
            return Err(rejected(format!(
                "archive size {} does not match uploaded {} bytes",
                archive_size, expect
            )));
        }
        Ok(())
    }

    // Streams the stored parts back out to rebuild the archive tree hash
    fn archive_tree_hash(&self, upload: &Upload) -> Result<Option<Hash>, RemoteError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT content
             FROM part
             WHERE upload = ?
             ORDER BY range_start ASC",
        )?;
        let rows = stmt.query_map(rs::params![upload.id], |row| row.get::<_, Vec<u8>>(0))?;
        let mut reader = IterRead::new(rows.map(|row| row.map_err(std::io::Error::other)));

        let mut leaves = Vec::new();
        let mut in_buf = vec![0u8; tree::HASH_CHUNK_SIZE];
        loop {
            match fill_buf(&mut reader, &mut in_buf)? {
                (_, 0) => break,
                (_, len) => leaves.push(Hash::digest(&in_buf[..len])),
            }
        }

        Ok(tree::tree_hash(&leaves))
    }
}

impl Remote for MemoryVault {
    fn begin_session(
        &self,
        vault: &str,
        description: Option<&str>,
        part_size: usize,
    ) -> Result<String, RemoteError> {
        let known: Option<String> = self
            .conn
            .prepare_cached("SELECT name FROM vault WHERE name = ?")?
            .query_row(rs::params![vault], |row| row.get(0))
            .optional()?;
        if known.is_none() {
            return Err(rejected(format!("vault not found: {}", vault)));
        }

        // 1 MiB doubled up to 4 GiB
        let size = part_size as u64;
        if !size.is_power_of_two() || !(MIN_PART_SIZE..=MAX_PART_SIZE).contains(&size) {
            return Err(rejected(format!("invalid part size: {}", part_size)));
        }

        self.conn
            .prepare_cached(
                "INSERT INTO upload
                 (vault, description, part_size)
                 VALUES
                 (?, ?, ?)",
            )?
            .execute(rs::params![vault, description, size as i64])?;

        let upload_id = format!("upload-{}", self.conn.last_insert_rowid());
        debug!("begin {} in {}", upload_id, vault);
        Ok(upload_id)
    }

    fn submit_part(
        &self,
        upload_id: &str,
        vault: &str,
        range: &ByteRange,
        body: &[u8],
        checksum: &str,
    ) -> Result<(), RemoteError> {
        let upload = self.open_upload(upload_id, vault)?;

        if body.len() as u64 != range.size() {
            return Err(rejected(format!(
                "body of {} bytes does not fit {}",
                body.len(),
                range
            )));
        }
        if range.start % upload.part_size != 0 || range.size() > upload.part_size {
            return Err(rejected(format!("range conflict: {}", range)));
        }

        let given = hash::from_hex(checksum)
            .map_err(|e| rejected(format!("malformed checksum {}: {}", checksum, e)))?;
        let actual = tree::tree_hash_bytes(body);
        if actual != given {
            return Err(rejected(format!(
                "checksum mismatch for {}: computed {}, given {}",
                range,
                hash::to_hex(&actual),
                checksum
            )));
        }

        // Re-sending a range replaces it
        self.conn
            .prepare_cached(
                "INSERT OR REPLACE INTO part
                 (upload, range_start, range_end, content)
                 VALUES
                 (?, ?, ?, ?)",
            )?
            .execute(rs::params![
                upload.id,
                range.start as i64,
                range.end as i64,
                body
            ])?;

        debug!("stored {} for {}", range, upload_id);
        Ok(())
    }

    fn finalize_session(
        &self,
        upload_id: &str,
        vault: &str,
        archive_size: u64,
        checksum: &str,
    ) -> Result<ArchiveReceipt, RemoteError> {
        let upload = self.open_upload(upload_id, vault)?;
        self.check_layout(&upload, archive_size)?;

        let actual = match self.archive_tree_hash(&upload)? {
            None => return Err(rejected("no parts uploaded".to_string())),
            Some(root) => hash::to_hex(&root),
        };
        if actual != checksum {
            return Err(rejected(format!(
                "archive checksum mismatch: computed {}, given {}",
                actual, checksum
            )));
        }

        let archive_id = hash::to_hex(&Hash::digest(
            format!("{}:{}", upload_id, checksum).as_bytes(),
        ));

        self.conn
            .prepare_cached("UPDATE upload SET archive = ? WHERE id = ?")?
            .execute(rs::params![archive_id, upload.id])?;

        Ok(ArchiveReceipt {
            location: Some(format!("/-/vaults/{}/archives/{}", vault, archive_id)),
            checksum: Some(actual),
            archive_id,
        })
    }
}

fn parse_upload_id(upload_id: &str) -> Result<i64, RemoteError> {
    upload_id
        .strip_prefix("upload-")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| rejected(format!("malformed upload id: {}", upload_id)))
}

fn rejected(reason: String) -> RemoteError {
    RemoteError::Rejected(reason)
}
