//! HMAC signature checks for inbound webhook bodies

use hex::decode as hex_decode;
use hmac::{Hmac, Mac, digest::KeyInit};
use sha1::Sha1;
use sha2::Sha256;
use tracing::debug;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

pub const SHA1_PREFIX: &str = "sha1=";
pub const SHA256_PREFIX: &str = "sha256=";

/// Outcome of checking a request signature against the configured secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationResult {
    Valid,
    Invalid,
    /// No secret configured, every request passes.
    NotRequired,
}

impl VerificationResult {
    pub fn is_accepted(self) -> bool {
        !matches!(self, VerificationResult::Invalid)
    }
}

/// Verifies an `X-Hub-Signature` header (`sha1=<hex>`) against the raw body.
pub fn verify(secret: Option<&str>, signature_header: &str, raw_body: &[u8]) -> VerificationResult {
    verify_with::<HmacSha1>(SHA1_PREFIX, secret, signature_header, raw_body)
}

/// Same contract as [`verify`] for the `X-Hub-Signature-256` header (`sha256=<hex>`).
pub fn verify_sha256(
    secret: Option<&str>,
    signature_header: &str,
    raw_body: &[u8],
) -> VerificationResult {
    verify_with::<HmacSha256>(SHA256_PREFIX, secret, signature_header, raw_body)
}

fn verify_with<M>(
    prefix: &str,
    secret: Option<&str>,
    signature_header: &str,
    raw_body: &[u8],
) -> VerificationResult
where
    M: Mac + KeyInit,
{
    let Some(secret) = secret else {
        return VerificationResult::NotRequired;
    };
    let Some(hex_signature) = signature_header.strip_prefix(prefix) else {
        debug!("Signature header is missing the '{}' prefix", prefix);
        return VerificationResult::Invalid;
    };

    let mut mac = match <M as KeyInit>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return VerificationResult::Invalid,
    };
    mac.update(raw_body);

    match hex_decode(hex_signature) {
        // verify_slice compares in constant time
        Ok(expected) => match mac.verify_slice(&expected) {
            Ok(()) => VerificationResult::Valid,
            Err(_) => VerificationResult::Invalid,
        },
        Err(_) => {
            debug!("Signature is not valid hex");
            VerificationResult::Invalid
        }
    }
}

/// Hex-encoded HMAC-SHA1 of `body`, prefixed the way GitHub sends it.
pub fn sign_sha1(secret: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha1 as KeyInit>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    format!("{}{}", SHA1_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
pub(crate) fn sign_sha256(secret: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as KeyInit>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("{}{}", SHA256_PREFIX, hex::encode(mac.finalize().into_bytes()))
}
