mod content;

pub use content::{hash_file, hash_reader, HASH_CHUNK_SIZE};
