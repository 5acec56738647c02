//! Symmetric transit cipher for vendor credentials.
//!
//! Credentials travel between the surrounding system and the engine as
//! base64 tokens encrypted with a single static shared secret
//! (`[transit] secret` in the config). The keystream is HMAC-SHA256 over
//! a random per-token nonce and a block counter, XORed with the plaintext.
//!
//! This is transport **obfuscation**, not a security boundary: there is no
//! authentication tag, no key rotation, and the secret is shared statically.
//! It exists so raw API keys don't sit in config files or request bodies in
//! the clear. Do not treat tokens produced here as secure storage, and never
//! persist the decrypted credential; it is used per request and dropped.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 16;
const BLOCK_LEN: usize = 32;

/// Symmetric credential cipher keyed by a static shared secret.
pub struct KeyCipher {
    mac: HmacSha256,
}

impl KeyCipher {
    pub fn new(secret: &[u8]) -> Self {
        let mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
        Self { mac }
    }

    /// Encrypt a credential for transit. Each call produces a distinct
    /// token for the same input (random nonce).
    pub fn encrypt_for_transit(&self, plain: &str) -> String {
        let nonce = *uuid::Uuid::new_v4().as_bytes();
        let mut body = plain.as_bytes().to_vec();
        self.apply_keystream(&nonce, &mut body);

        let mut token = Vec::with_capacity(NONCE_LEN + body.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&body);
        BASE64.encode(token)
    }

    /// Decrypt a transit token back to the credential string.
    pub fn decrypt(&self, token: &str) -> Result<String> {
        let raw = BASE64
            .decode(token.trim())
            .context("transit token is not valid base64")?;
        if raw.len() < NONCE_LEN {
            bail!("transit token too short");
        }
        let (nonce, body) = raw.split_at(NONCE_LEN);
        let nonce: [u8; NONCE_LEN] = nonce.try_into().expect("split_at yields NONCE_LEN bytes");

        let mut plain = body.to_vec();
        self.apply_keystream(&nonce, &mut plain);
        String::from_utf8(plain).context("decrypted credential is not valid UTF-8")
    }

    /// XOR `data` with HMAC-SHA256(secret, nonce || counter) blocks.
    /// Symmetric: applying it twice restores the input.
    fn apply_keystream(&self, nonce: &[u8; NONCE_LEN], data: &mut [u8]) {
        for (block_idx, chunk) in data.chunks_mut(BLOCK_LEN).enumerate() {
            let mut mac = self.mac.clone();
            mac.update(nonce);
            mac.update(&(block_idx as u32).to_le_bytes());
            let block = mac.finalize().into_bytes();
            for (byte, key) in chunk.iter_mut().zip(block.iter()) {
                *byte ^= key;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let cipher = KeyCipher::new(b"shared-secret");
        for plain in ["sk-abc123", "", "key with spaces", "ключ-🔑"] {
            let token = cipher.encrypt_for_transit(plain);
            assert_eq!(cipher.decrypt(&token).unwrap(), plain);
        }
    }

    #[test]
    fn roundtrip_longer_than_one_block() {
        let cipher = KeyCipher::new(b"shared-secret");
        let plain = "x".repeat(1000);
        let token = cipher.encrypt_for_transit(&plain);
        assert_eq!(cipher.decrypt(&token).unwrap(), plain);
    }

    #[test]
    fn tokens_differ_per_call() {
        let cipher = KeyCipher::new(b"shared-secret");
        let a = cipher.encrypt_for_transit("sk-abc123");
        let b = cipher.encrypt_for_transit("sk-abc123");
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_short_token() {
        let cipher = KeyCipher::new(b"shared-secret");
        assert!(cipher.decrypt("AAAA").is_err());
    }

    #[test]
    fn rejects_garbage_base64() {
        let cipher = KeyCipher::new(b"shared-secret");
        assert!(cipher.decrypt("not base64 at all!!!").is_err());
    }
}
