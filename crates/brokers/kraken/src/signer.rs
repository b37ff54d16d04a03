use crate::nonce::Nonce;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use krakenwatch_core::SourceError;
use secrecy::{ExposeSecret, SecretSlice};
use sha2::{Digest, Sha256, Sha512};

type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("Invalid private key: {0}")]
    InvalidKey(String),
}

impl From<SignError> for SourceError {
    fn from(e: SignError) -> Self {
        SourceError::Sign(e.to_string())
    }
}

/// A decoded Kraken API private key.
///
/// Kraken hands the secret out base64-encoded; it is decoded once, up front,
/// so a bad key is caught before any request is built.
#[derive(Debug)]
pub struct PrivateKey(SecretSlice<u8>);

impl PrivateKey {
    pub fn from_base64(encoded: &str) -> Result<Self, SignError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| SignError::InvalidKey(format!("not valid base64: {}", e)))?;
        if bytes.is_empty() {
            return Err(SignError::InvalidKey("key is empty".to_string()));
        }
        Ok(Self(SecretSlice::from(bytes)))
    }

    fn expose(&self) -> &[u8] {
        self.0.expose_secret()
    }
}

/// Compute the `Api-Sign` header for a private endpoint call.
///
/// `HMAC-SHA512(key, path || SHA256(nonce || form_body))`, base64 encoded
/// without line wrapping.
pub fn sign(
    path: &str,
    nonce: Nonce,
    form_body: &str,
    key: &PrivateKey,
) -> Result<String, SignError> {
    let digest = Sha256::new()
        .chain_update(nonce.to_string())
        .chain_update(form_body)
        .finalize();

    let mut mac = HmacSha512::new_from_slice(key.expose())
        .map_err(|e| SignError::InvalidKey(e.to_string()))?;
    mac.update(path.as_bytes());
    mac.update(&digest);

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
