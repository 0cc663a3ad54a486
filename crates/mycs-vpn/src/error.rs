// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VpnError {
	#[error("invalid VPN configuration: {0}")]
	BadConfig(String),

	#[error("{0}")]
	BadState(String),

	#[error("{0}")]
	BadMetadata(String),

	#[error("VPN type \"{0}\" is not supported")]
	UnsupportedVpn(String),

	#[error("tunnel setup failed: {0}")]
	TunnelIo(String),

	#[error("error retrieving vpn config from bastion instance: {0}")]
	ConfigFetch(u16),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("HTTP request failed: {0}")]
	Http(#[from] reqwest::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("QR code rendering failed: {0}")]
	Qr(String),
}

pub type Result<T> = std::result::Result<T, VpnError>;
