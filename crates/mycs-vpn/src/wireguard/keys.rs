// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt::Write as _;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::{Result, VpnError};

/// A 32-byte wireguard curve key, carried as base64 in config text and as
/// hex on the IPC surface.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct WgKey([u8; 32]);

impl WgKey {
	pub fn from_base64(s: &str) -> Result<Self> {
		let raw = BASE64
			.decode(s.trim())
			.map_err(|e| VpnError::BadConfig(format!("invalid wireguard key: {e}")))?;
		let bytes: [u8; 32] = raw
			.try_into()
			.map_err(|_| VpnError::BadConfig("wireguard key is not 32 bytes".to_string()))?;
		Ok(Self(bytes))
	}

	pub fn to_base64(&self) -> String {
		BASE64.encode(self.0)
	}

	pub fn to_hex(&self) -> String {
		let mut out = String::with_capacity(64);
		for byte in self.0 {
			let _ = write!(out, "{byte:02x}");
		}
		out
	}

	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}
}

impl std::fmt::Debug for WgKey {
	// keys never land in logs in the clear
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "WgKey(..)")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn base64_roundtrip() {
		let key = WgKey::from_base64(&BASE64.encode([7u8; 32])).unwrap();
		assert_eq!(key.as_bytes(), &[7u8; 32]);
		assert_eq!(key.to_base64(), BASE64.encode([7u8; 32]));
	}

	#[test]
	fn hex_encoding() {
		let key = WgKey::from_base64(&BASE64.encode([0xabu8; 32])).unwrap();
		assert_eq!(key.to_hex(), "ab".repeat(32));
	}

	#[test]
	fn rejects_wrong_length() {
		assert!(WgKey::from_base64(&BASE64.encode([1u8; 16])).is_err());
		assert!(WgKey::from_base64("no").is_err());
	}

	#[test]
	fn debug_does_not_leak_key_material() {
		let key = WgKey::from_base64(&BASE64.encode([9u8; 32])).unwrap();
		assert_eq!(format!("{key:?}"), "WgKey(..)");
	}
}
