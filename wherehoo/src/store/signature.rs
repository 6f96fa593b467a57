//! Payload signatures and record id generation.
//!
//! Clients sign a payload with SHA-1 over the payload bytes followed by
//! their shared secret, and send the 20-byte digest right after the payload.
//! Record ids are SHA-256 digests rendered as lowercase hex.

use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Size in bytes of the signature block that follows a `DAT` payload.
pub const SIGNATURE_LEN: usize = 20;

/// Computes the signature a client with `secret` would send for `payload`.
pub fn sign_payload(payload: &[u8], secret: &[u8]) -> [u8; SIGNATURE_LEN] {
    let mut hasher = Sha1::new();
    hasher.update(payload);
    hasher.update(secret);
    hasher.finalize().into()
}

/// Verifies `signature` against `payload` and `secret`.
///
/// The comparison takes the same time wherever the first mismatch is.
pub fn verify_signature(payload: &[u8], secret: &[u8], signature: &[u8]) -> bool {
    let expected = sign_payload(payload, secret);
    if signature.len() != expected.len() {
        return false;
    }
    expected
        .iter()
        .zip(signature)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

/// Inputs mixed into a record id.
#[derive(Debug, Clone)]
pub struct RecordIdSource<'a> {
    pub server_addr: &'a str,
    pub client_addr: &'a str,
    pub payload: &'a [u8],
    pub timestamp_millis: i64,
}

/// Generates a fresh record id.
///
/// A random nonce is mixed in, so two inserts of the same payload from the
/// same client in the same millisecond still get distinct ids.
pub fn generate_record_id(source: &RecordIdSource<'_>) -> String {
    let nonce: u64 = rand::random();

    let mut hasher = Sha256::new();
    hasher.update(source.server_addr.as_bytes());
    hasher.update(source.client_addr.as_bytes());
    hasher.update(source.payload);
    hasher.update(nonce.to_le_bytes());
    hasher.update(source.timestamp_millis.to_string().as_bytes());

    format!("{:x}", hasher.finalize())
}
