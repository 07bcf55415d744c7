use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::trace;

pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Streams `file` through BLAKE3 in fixed-size chunks and returns the
/// lowercase hex digest. Errors are returned, never swallowed.
pub fn hash_file(file: &Path) -> io::Result<String> {
    let f = File::open(file)?;
    let digest = hash_reader(f)?;
    trace!("Hashed {} -> {}", file.display(), digest);
    Ok(digest)
}

pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}
