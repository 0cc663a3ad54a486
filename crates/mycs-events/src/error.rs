// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
	#[error("event is not valid JSON: {0}")]
	Json(#[from] serde_json::Error),

	#[error("payload is not valid base64: {0}")]
	Base64(#[from] base64::DecodeError),

	#[error("payload is not valid zlib data: {0}")]
	Compression(#[from] std::io::Error),

	#[error("payload is marked uncompressed; only compressed payloads are supported")]
	NotCompressed,
}

pub type Result<T> = std::result::Result<T, EventError>;
