// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
	#[error("invalid auth response")]
	AuthMismatch,

	#[error("client not authenticated with the space node")]
	NotAuthenticated,

	#[error("auth request failed ({status}): {message}")]
	AuthHttp { status: u16, message: String },

	#[error("HTTP request failed: {0}")]
	Http(#[from] reqwest::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("crypto error: {0}")]
	Crypto(#[from] mycs_common_crypto::CryptoError),

	#[error("URL parse error: {0}")]
	UrlParse(#[from] url::ParseError),

	#[error("invalid header value: {0}")]
	InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

pub type Result<T> = std::result::Result<T, NodeError>;
