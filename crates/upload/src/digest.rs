use sha2::{Digest, Sha256};

/// Width of the payload digest in bytes.
pub const DIGEST_SIZE: usize = 32;

/// Incremental SHA-256 over the payload bytes, in arrival order.
pub struct PayloadDigest {
    hasher: Sha256,
}

impl PayloadDigest {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub fn finalize(self) -> [u8; DIGEST_SIZE] {
        self.hasher.finalize().into()
    }
}

impl Default for PayloadDigest {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the digest of `data` in one shot.
pub fn digest_bytes(data: &[u8]) -> [u8; DIGEST_SIZE] {
    let mut d = PayloadDigest::new();
    d.update(data);
    d.finalize()
}
