// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
	#[error("invalid PEM key material: {0}")]
	InvalidPem(String),

	#[error("invalid key: {0}")]
	InvalidKey(String),

	#[error("encryption failed: {0}")]
	Encrypt(String),

	#[error("decryption failed: {0}")]
	Decrypt(String),

	#[error("invalid base64 payload: {0}")]
	Base64(#[from] base64::DecodeError),

	#[error("ciphertext is not valid UTF-8 after decryption")]
	NotUtf8,
}

pub type Result<T> = std::result::Result<T, CryptoError>;
