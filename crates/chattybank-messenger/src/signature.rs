//! `X-Hub-Signature` / `X-Hub-Signature-256` request verification.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

pub const SIGNATURE_HEADER: &str = "x-hub-signature";
pub const SIGNATURE_256_HEADER: &str = "x-hub-signature-256";

/// Checks a `<method>=<hex digest>` header value against the HMAC of `body`
/// keyed with the app secret. Supports `sha1` and `sha256`; comparison is
/// constant-time.
pub fn verify_signature(app_secret: &str, body: &[u8], header_value: &str) -> bool {
    let Some((method, hex_sig)) = header_value.trim().split_once('=') else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };

    match method {
        "sha1" => {
            let Ok(mut mac) = Hmac::<Sha1>::new_from_slice(app_secret.as_bytes()) else {
                return false;
            };
            mac.update(body);
            mac.verify_slice(&expected).is_ok()
        }
        "sha256" => {
            let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
                return false;
            };
            mac.update(body);
            mac.verify_slice(&expected).is_ok()
        }
        _ => false,
    }
}

#[cfg(test)]
pub(crate) fn sign_sha1(app_secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(app_secret.as_bytes()).expect("hmac key");
    mac.update(body);
    format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
pub(crate) fn sign_sha256(app_secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()).expect("hmac key");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
