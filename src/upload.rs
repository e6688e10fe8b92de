use log::{debug, info, warn};
use thiserror::Error;

use pcore::hash;

use remote::{ArchiveReceipt, ByteRange, Remote, RemoteError};

use crate::session::UploadSession;
use crate::source::ByteSource;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("could not begin upload session")]
    Begin(#[source] RemoteError),
    #[error("failed reading part {part} from the source")]
    SourceRead {
        part: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("part {part} was rejected by the remote")]
    PartRejected {
        part: u64,
        #[source]
        source: RemoteError,
    },
    #[error("source was empty, nothing to archive")]
    EmptyArchive,
    #[error("could not finalize upload {upload_id}")]
    Finalize {
        upload_id: String,
        #[source]
        source: RemoteError,
    },
}

impl UploadError {
    /// Index of the part the upload died on, if it died on one
    pub fn part(&self) -> Option<u64> {
        match self {
            UploadError::SourceRead { part, .. } => Some(*part),
            UploadError::PartRejected { part, .. } => Some(*part),
            _ => None,
        }
    }
}

pub struct UploadOptions {
    pub vault: String,
    pub description: Option<String>,
    pub part_size: usize,

    // Parts below this index are read and hashed but never sent
    pub skip_parts: Option<u64>,
}

#[derive(Debug)]
pub struct Completed {
    pub receipt: ArchiveReceipt,
    pub session: UploadSession,
}

// One archive, strictly one step at a time:
//  1. begin a session on the remote
//  2. per part: read -> hash into the session -> submit (or skip)
//  3. once the source is drained: tree hash all leaves -> finalize
//
// Each part is fully hashed before it is sent, and every byte is hashed before
// finalize goes out. Any failure ends the run, nothing is retried or undone.
pub fn upload<B: Remote, S: ByteSource>(
    remote: &B,
    source: &mut S,
    opts: &UploadOptions,
) -> Result<Completed, UploadError> {
    let upload_id = remote
        .begin_session(&opts.vault, opts.description.as_deref(), opts.part_size)
        .map_err(UploadError::Begin)?;
    info!("Upload id: {}", upload_id);

    let mut session = UploadSession::new(upload_id, opts.part_size);

    let mut part: u64 = 0;
    loop {
        info!("Processing part {}...", part);
        let data = match source.read_next(session.part_size()) {
            Ok(Some(data)) => data,
            Ok(None) => break,
            Err(err) => {
                warn!("Read failed on part {}", part);
                return Err(UploadError::SourceRead { part, source: err });
            }
        };

        submit_part(remote, &mut session, opts, part, &data)?;
        part += 1;
    }

    let checksum = match session.seal() {
        Some(root) => hash::to_hex(&root),
        None => return Err(UploadError::EmptyArchive),
    };
    debug!(
        "archive: {} bytes, {} leaves, checksum {}",
        session.archive_size(),
        session.leaves().len(),
        checksum
    );

    let receipt = remote
        .finalize_session(
            session.upload_id(),
            &opts.vault,
            session.archive_size(),
            &checksum,
        )
        .map_err(|source| UploadError::Finalize {
            upload_id: session.upload_id().to_string(),
            source,
        })?;

    Ok(Completed { receipt, session })
}

fn submit_part<B: Remote>(
    remote: &B,
    session: &mut UploadSession,
    opts: &UploadOptions,
    part: u64,
    data: &[u8],
) -> Result<(), UploadError> {
    // Always hash, skipped parts still belong to the archive tree hash
    let part_hash = session.hash_part(data);
    let range = ByteRange::for_part(part, session.part_size(), data.len());

    if opts.skip_parts.is_some_and(|skip| part < skip) {
        info!("Skipping part {}", part);
        return Ok(());
    }

    let checksum = hash::to_hex(&part_hash);
    debug!("{} checksum {}", range, checksum);

    remote
        .submit_part(session.upload_id(), &opts.vault, &range, data, &checksum)
        .map_err(|source| {
            warn!("Part {} failed", part);
            UploadError::PartRejected { part, source }
        })?;

    info!("Successfully uploaded part {}", part);
    Ok(())
}
