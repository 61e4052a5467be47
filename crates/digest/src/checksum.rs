use crate::error::{ErrorKind, Result};
use blake3::Hasher;
use exn::ResultExt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read size used while streaming content into the hasher.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Hash everything `reader` yields without holding more than one chunk.
pub fn hash_reader(mut reader: impl Read) -> std::io::Result<blake3::Hash> {
    let mut hasher = Hasher::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize())
}

/// Hex-encoded BLAKE3 checksum of a file's full content.
pub fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| ErrorKind::from_io(e, path))?;
    let hash = hash_reader(file).or_raise(|| ErrorKind::Checksum(path.to_path_buf()))?;
    Ok(hash.to_hex().to_string())
}
