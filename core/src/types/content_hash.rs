use nutype::nutype;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Hex length of a SHA-256 digest.
pub const CONTENT_HASH_LENGTH: usize = 64;

/// Lowercase hex SHA-256 of a file's bytes.
#[nutype(
    new_unchecked,
    sanitize(trim, lowercase),
    validate(
        len_char_min = CONTENT_HASH_LENGTH,
        len_char_max = CONTENT_HASH_LENGTH,
        predicate = |s: &str| s.bytes().all(|b| b.is_ascii_hexdigit())
    ),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        TryFrom,
        Display,
        Serialize,
        Deserialize,
    )
)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of_bytes(data: &[u8]) -> Self {
        Self::from_digest(Sha256::digest(data).as_slice())
    }

    /// Streams the file through SHA-256 without loading it into memory.
    pub fn of_file(path: &Path) -> std::io::Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(Self::from_digest(hasher.finalize().as_slice()))
    }

    fn from_digest(digest: &[u8]) -> Self {
        // SAFETY: hex::encode of a 32-byte digest is 64 lowercase hex characters.
        unsafe { Self::new_unchecked(hex::encode(digest)) }
    }
}
