//! SHA-256 content hashing, only used when a destination name collides.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{io_err, SortError};

const CHUNK: usize = 64 * 1024;

/// Lower-case hex SHA-256 of the file at `path`, streamed in 64 KiB chunks.
pub fn hash_file(path: &Path) -> Result<String, SortError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut reader = BufReader::with_capacity(CHUNK, file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = reader.read(&mut buf).map_err(|e| io_err(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
