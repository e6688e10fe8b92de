use std::io::{ErrorKind, Read};

// Keeps reading till the buffer is full or the reader hits EOF, pipes and stdin
// tend to hand back short reads well before they are drained.
pub fn fill_buf<R: Read>(data: &mut R, buf: &mut [u8]) -> std::io::Result<(bool, usize)> {
    let mut buf_read = 0;

    while buf_read < buf.len() {
        match data.read(&mut buf[buf_read..]) {
            Ok(0) => return Ok((true, buf_read)),
            Ok(x) => buf_read += x,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
    }
    Ok((false, buf_read))
}

/// Reads the next `max` bytes off the reader, the last chunk may be shorter.
/// Returns `None` once the reader is drained, never an empty chunk.
pub fn read_chunk<R: Read>(data: &mut R, max: usize) -> std::io::Result<Option<Vec<u8>>> {
    let mut buf = vec![0u8; max];

    match fill_buf(data, &mut buf)? {
        (_, 0) => Ok(None),
        (_, len) => {
            buf.truncate(len);
            Ok(Some(buf))
        }
    }
}
