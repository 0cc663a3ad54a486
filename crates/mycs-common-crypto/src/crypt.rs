// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! AES-256-GCM transport cipher for an authenticated session.
//!
//! The cipher is keyed directly by the 32-byte ECDH shared secret. Each
//! encryption draws a fresh random 96-bit nonce which is prepended to the
//! ciphertext; the base64 helpers frame the whole value for HTTP headers
//! and JSON fields.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;

pub struct Crypt {
	cipher: Aes256Gcm,
}

impl Crypt {
	/// Builds a cipher from a 32-byte key, normally an ECDH shared secret.
	pub fn new(key: &[u8]) -> Result<Self> {
		if key.len() != KEY_SIZE {
			return Err(CryptoError::InvalidKey(format!(
				"expected a {} byte key, got {}",
				KEY_SIZE,
				key.len()
			)));
		}
		let key = Key::<Aes256Gcm>::from_slice(key);
		Ok(Self {
			cipher: Aes256Gcm::new(key),
		})
	}

	/// Encrypts `plaintext`, returning `nonce || ciphertext`.
	pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
		let mut nonce_bytes = [0u8; NONCE_SIZE];
		OsRng.fill_bytes(&mut nonce_bytes);
		let nonce = Nonce::from_slice(&nonce_bytes);

		let ciphertext = self
			.cipher
			.encrypt(nonce, plaintext)
			.map_err(|e| CryptoError::Encrypt(e.to_string()))?;

		let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
		out.extend_from_slice(&nonce_bytes);
		out.extend_from_slice(&ciphertext);
		Ok(out)
	}

	/// Decrypts a `nonce || ciphertext` value.
	pub fn decrypt(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
		if data.len() < NONCE_SIZE {
			return Err(CryptoError::Decrypt(
				"value too short to carry a nonce".to_string(),
			));
		}
		let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
		let nonce = Nonce::from_slice(nonce_bytes);

		let plaintext = self
			.cipher
			.decrypt(nonce, ciphertext)
			.map_err(|e| CryptoError::Decrypt(e.to_string()))?;
		Ok(Zeroizing::new(plaintext))
	}

	pub fn encrypt_b64(&self, plaintext: &str) -> Result<String> {
		Ok(BASE64.encode(self.encrypt(plaintext.as_bytes())?))
	}

	pub fn decrypt_b64(&self, data: &str) -> Result<String> {
		let raw = BASE64.decode(data)?;
		let plaintext = self.decrypt(&raw)?;
		String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::NotUtf8)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn test_crypt() -> Crypt {
		let mut key = [0u8; KEY_SIZE];
		OsRng.fill_bytes(&mut key);
		Crypt::new(&key).unwrap()
	}

	#[test]
	fn rejects_wrong_key_size() {
		assert!(Crypt::new(&[0u8; 16]).is_err());
		assert!(Crypt::new(&[0u8; 33]).is_err());
	}

	#[test]
	fn b64_roundtrip() {
		let crypt = test_crypt();
		let ciphertext = crypt.encrypt_b64("plain text test").unwrap();
		assert_eq!(crypt.decrypt_b64(&ciphertext).unwrap(), "plain text test");
	}

	#[test]
	fn distinct_nonces_per_encryption() {
		let crypt = test_crypt();
		let a = crypt.encrypt(b"same input").unwrap();
		let b = crypt.encrypt(b"same input").unwrap();
		assert_ne!(a, b);
	}

	#[test]
	fn tampered_ciphertext_fails() {
		let crypt = test_crypt();
		let mut data = crypt.encrypt(b"payload").unwrap();
		let last = data.len() - 1;
		data[last] ^= 0xff;
		assert!(crypt.decrypt(&data).is_err());
	}

	#[test]
	fn other_key_cannot_decrypt() {
		let a = test_crypt();
		let b = test_crypt();
		let data = a.encrypt(b"payload").unwrap();
		assert!(b.decrypt(&data).is_err());
	}

	#[test]
	fn short_value_fails() {
		let crypt = test_crypt();
		assert!(crypt.decrypt(&[0u8; 4]).is_err());
	}

	proptest! {
		#[test]
		fn prop_roundtrip(plaintext in proptest::collection::vec(any::<u8>(), 0..4096)) {
			let crypt = test_crypt();
			let encrypted = crypt.encrypt(&plaintext).unwrap();
			let decrypted = crypt.decrypt(&encrypted).unwrap();
			prop_assert_eq!(plaintext, decrypted.to_vec());
		}
	}
}
