// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ephemeral X25519 key agreement.
//!
//! Each authentication round generates a fresh keypair; the public half
//! travels inside the RSA-wrapped request blob as base64. The derived
//! shared secret keys the session's transport cipher.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

pub struct EcdhKey {
	secret: StaticSecret,
	public: PublicKey,
}

impl EcdhKey {
	pub fn generate() -> Self {
		let secret = StaticSecret::random_from_rng(OsRng);
		let public = PublicKey::from(&secret);
		Self { secret, public }
	}

	/// The public half as base64, as sent to the node.
	pub fn public_key(&self) -> String {
		BASE64.encode(self.public.as_bytes())
	}

	/// Derives the shared secret against a peer's base64 public key.
	pub fn shared_secret(&self, peer_public: &str) -> Result<Zeroizing<[u8; 32]>> {
		let raw = BASE64.decode(peer_public)?;
		let bytes: [u8; 32] = raw
			.try_into()
			.map_err(|_| CryptoError::InvalidKey("peer public key is not 32 bytes".to_string()))?;

		let shared = self.secret.diffie_hellman(&PublicKey::from(bytes));
		Ok(Zeroizing::new(*shared.as_bytes()))
	}
}
