//! Webhook signature verification: HMAC-SHA256 over the raw request body,
//! hex-encoded in the `x-webhook-signature` header (an optional `sha256=`
//! prefix is tolerated). Comparison is constant-time via `Mac::verify_slice`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature is not valid hex")]
    Malformed,
    #[error("signature does not match body")]
    Mismatch,
}

pub fn verify(secret: &str, body: &[u8], signature: &str) -> Result<(), SignatureError> {
    let hex_sig = signature.strip_prefix("sha256=").unwrap_or(signature);
    let expected = hex::decode(hex_sig.trim()).map_err(|_| SignatureError::Malformed)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}

/// Hex signature for a body, as the vendor would compute it.
#[cfg(test)]
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
