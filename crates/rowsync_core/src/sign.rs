//! HMAC signing of push envelopes.
//!
//! Push messages are signed with the node's shared secret over the
//! canonical byte form of the envelope. Signatures travel base64-encoded.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs `bytes` with `secret`, returning the base64 signature.
pub fn sign(secret: &str, bytes: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any size");
    mac.update(bytes);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Verifies a base64 signature over `bytes` in constant time.
pub fn verify(secret: &str, bytes: &[u8], signature: &str) -> bool {
    let Ok(decoded) = BASE64.decode(signature) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any size");
    mac.update(bytes);
    mac.verify_slice(&decoded).is_ok()
}
