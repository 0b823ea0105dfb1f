//! Anonymous sealed-box encryption of secret values.
//!
//! GitHub only accepts repository secrets encrypted against the repository public key with a
//! libsodium sealed box (X25519 + XSalsa20-Poly1305). Every call uses a fresh ephemeral key, so
//! sealing the same value twice yields different ciphertexts.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use crypto_box::PublicKey;
use crypto_box::aead::OsRng;
use thiserror::Error;

const PUBLIC_KEY_LENGTH: usize = 32;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SealError {
    #[error("invalid base64 in recipient public key: `{0}`")]
    InvalidBase64(String),
    #[error("invalid recipient public key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("sealing the secret value failed")]
    SealFailed,
}

/// Seals `plaintext` for the holder of the private half of `recipient_public_key_b64` and returns
/// the base64 encoded ciphertext.
pub fn seal(plaintext: &str, recipient_public_key_b64: &str) -> Result<String, SealError> {
    let public_key = decode_public_key(recipient_public_key_b64)?;

    let ciphertext = public_key
        .seal(&mut OsRng, plaintext.as_bytes())
        .map_err(|_| SealError::SealFailed)?;

    Ok(BASE64.encode(ciphertext))
}

fn decode_public_key(public_key_b64: &str) -> Result<PublicKey, SealError> {
    let bytes = BASE64
        .decode(public_key_b64.trim())
        .map_err(|e| SealError::InvalidBase64(e.to_string()))?;

    let key: [u8; PUBLIC_KEY_LENGTH] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| SealError::InvalidKeyLength(bytes.len()))?;

    Ok(PublicKey::from(key))
}
