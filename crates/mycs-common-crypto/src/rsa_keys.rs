// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! RSA-OAEP key wrapping with base64 framing.
//!
//! The node handshake exchanges small JSON key blobs wrapped with the
//! recipient's RSA public key. Payloads longer than one OAEP block are
//! split across blocks; the wire value is the base64 of the concatenated
//! ciphertext blocks.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::Oaep;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

// SHA-256 digest length dictates the OAEP payload overhead per block.
const OAEP_OVERHEAD: usize = 2 * 32 + 2;

/// An RSA private key and its derived public half.
pub struct RsaKey {
	inner: rsa::RsaPrivateKey,
}

/// An RSA public key used to wrap payloads for its holder.
#[derive(Clone)]
pub struct RsaPublicKey {
	inner: rsa::RsaPublicKey,
}

impl RsaKey {
	/// Loads a private key from PKCS#8 or PKCS#1 PEM.
	pub fn from_pem(pem: &str) -> Result<Self> {
		let inner = rsa::RsaPrivateKey::from_pkcs8_pem(pem)
			.or_else(|_| rsa::RsaPrivateKey::from_pkcs1_pem(pem))
			.map_err(|e| CryptoError::InvalidPem(e.to_string()))?;
		Ok(Self { inner })
	}

	pub fn public_key(&self) -> RsaPublicKey {
		RsaPublicKey {
			inner: self.inner.to_public_key(),
		}
	}

	/// Unwraps a base64 value produced by [`RsaPublicKey::encrypt_base64`]
	/// for this key.
	pub fn decrypt_base64(&self, data: &str) -> Result<Zeroizing<Vec<u8>>> {
		let ciphertext = BASE64.decode(data)?;
		let block_len = self.inner.size();
		if ciphertext.is_empty() || ciphertext.len() % block_len != 0 {
			return Err(CryptoError::Decrypt(format!(
				"ciphertext length {} is not a multiple of the {} byte modulus",
				ciphertext.len(),
				block_len
			)));
		}

		let mut plaintext = Zeroizing::new(Vec::with_capacity(ciphertext.len()));
		for block in ciphertext.chunks(block_len) {
			let decrypted = self
				.inner
				.decrypt(Oaep::new::<Sha256>(), block)
				.map_err(|e| CryptoError::Decrypt(e.to_string()))?;
			plaintext.extend_from_slice(&decrypted);
		}
		Ok(plaintext)
	}
}

impl RsaPublicKey {
	/// Loads a public key from SPKI or PKCS#1 PEM.
	pub fn from_pem(pem: &str) -> Result<Self> {
		let inner = rsa::RsaPublicKey::from_public_key_pem(pem)
			.or_else(|_| rsa::RsaPublicKey::from_pkcs1_pem(pem))
			.map_err(|e| CryptoError::InvalidPem(e.to_string()))?;
		Ok(Self { inner })
	}

	/// Wraps `data` with OAEP-SHA256, splitting across blocks as needed,
	/// and returns the base64 of the concatenated blocks.
	pub fn encrypt_base64(&self, data: &[u8]) -> Result<String> {
		let chunk_len = self
			.inner
			.size()
			.checked_sub(OAEP_OVERHEAD)
			.ok_or_else(|| CryptoError::InvalidKey("modulus too small for OAEP".to_string()))?;

		let mut rng = rand::thread_rng();
		let mut ciphertext = Vec::new();
		for chunk in data.chunks(chunk_len) {
			let block = self
				.inner
				.encrypt(&mut rng, Oaep::new::<Sha256>(), chunk)
				.map_err(|e| CryptoError::Encrypt(e.to_string()))?;
			ciphertext.extend_from_slice(&block);
		}
		Ok(BASE64.encode(ciphertext))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

	fn test_key() -> (RsaKey, RsaPublicKey) {
		let mut rng = rand::thread_rng();
		let private = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
		let private_pem = private.to_pkcs8_pem(LineEnding::LF).unwrap();
		let public_pem = private
			.to_public_key()
			.to_public_key_pem(LineEnding::LF)
			.unwrap();

		let key = RsaKey::from_pem(&private_pem).unwrap();
		let public = RsaPublicKey::from_pem(&public_pem).unwrap();
		(key, public)
	}

	#[test]
	fn wrap_unwrap_roundtrip() {
		let (key, public) = test_key();

		let wrapped = public.encrypt_base64(b"auth request key payload").unwrap();
		let unwrapped = key.decrypt_base64(&wrapped).unwrap();

		assert_eq!(unwrapped.as_slice(), b"auth request key payload");
	}

	#[test]
	fn wrap_unwrap_multi_block() {
		let (key, public) = test_key();
		let payload: Vec<u8> = (0..600).map(|i| (i % 251) as u8).collect();

		let wrapped = public.encrypt_base64(&payload).unwrap();
		let unwrapped = key.decrypt_base64(&wrapped).unwrap();

		assert_eq!(unwrapped.as_slice(), payload.as_slice());
	}

	#[test]
	fn unwrap_with_wrong_key_fails() {
		let (_, public) = test_key();
		let (other_key, _) = test_key();

		let wrapped = public.encrypt_base64(b"payload").unwrap();
		assert!(other_key.decrypt_base64(&wrapped).is_err());
	}

	#[test]
	fn unwrap_rejects_truncated_ciphertext() {
		let (key, public) = test_key();

		let wrapped = public.encrypt_base64(b"payload").unwrap();
		let mut raw = BASE64.decode(&wrapped).unwrap();
		raw.truncate(raw.len() - 1);

		assert!(key.decrypt_base64(&BASE64.encode(raw)).is_err());
	}

	#[test]
	fn rejects_garbage_pem() {
		assert!(RsaKey::from_pem("not a key").is_err());
		assert!(RsaPublicKey::from_pem("not a key").is_err());
	}
}
